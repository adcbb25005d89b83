//! Error taxonomy shared by the library.
//!
//! Policy denials are not errors: the authentication pipeline reports them as a
//! `DenyReason`. Everything here is surfaced to callers of lifecycle operations.

use uuid::Uuid;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Neither an external nor a configuration-stored master secret is available.
    #[error("no master secret configured")]
    NoSecretConfigured,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Key material could not be produced because the vault has no secret.
    #[error("cryptography unavailable: master secret cannot be resolved")]
    CryptoUnavailable,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("not found")]
    NotFound,

    /// Another record already belongs to this owner.
    #[error("owner {0} already has an API key")]
    OwnerConflict(Uuid),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("cache error: {0}")]
    Cache(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlx_errors_map_to_storage() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn owner_conflict_names_the_owner() {
        let owner = Uuid::nil();
        assert_eq!(
            Error::OwnerConflict(owner).to_string(),
            format!("owner {owner} already has an API key")
        );
    }
}
