pub mod pipeline;
pub mod policy;
pub mod request;

pub use pipeline::{AuthenticationPipeline, DenyReason};
pub use request::ApiKeyRequest;
