//! # Sentinel (API key authentication)
//!
//! `sentinel` authenticates inbound HTTP requests with per-principal API keys.
//! A key is presented through a configurable header (default `X-API-KEY`) or the
//! `api_key` query parameter and runs through an ordered set of gates before a
//! principal is resolved.
//!
//! ## Key storage
//!
//! Raw keys are never persisted. Each record stores two values derived from the
//! raw key:
//!
//! - **Hashed key:** `SHA-256` hex digest, the only lookup index.
//! - **Encrypted payload:** `base64(IV || AES-256-CBC(raw))` under the master
//!   secret, so the owner can recover the key on demand.
//!
//! Changing the master secret (or the encryption mode) invalidates every payload,
//! so the rotation watcher regenerates all keys when it notices the change.
//!
//! ## Authentication gates
//!
//! Network policy (blacklist, whitelist) and path policy run before any
//! cryptographic or storage work. Lookup, status (enabled, blocked, expired) and
//! throttling follow, then the owning principal must exist and be active. Every
//! denial is audited server-side while the HTTP surface answers a uniform
//! `Unauthorized`.
//!
//! ## Throttling
//!
//! Usage and failures are both counted in trailing timestamp windows that the
//! cache prunes and appends atomically. Reaching the failure limit blocks the
//! key until an administrator unblocks it.

pub mod api;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod keys;
pub mod maintenance;
pub mod notify;
pub mod principal;
pub mod rate_limit;
pub mod store;
pub mod vault;

pub use error::{Error, Result};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
