//! Storage backends for keys, principals and persisted state.

pub mod memory;
pub mod postgres;
