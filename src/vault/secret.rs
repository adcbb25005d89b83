use crate::{
    config::{EncryptionMode, Settings},
    Error, Result,
};
use base64ct::{Base64, Encoding};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

/// Candidate master secrets and the rule for choosing between them.
#[derive(Clone, Debug, Default)]
pub struct MasterSecretSource {
    /// Supplied from outside the configuration, normally `SENTINEL_ENCRYPTION_KEY`.
    pub external: Option<SecretString>,
    /// Stored alongside the settings (or bootstrapped into the state store).
    pub configured: Option<SecretString>,
    pub mode: EncryptionMode,
}

impl MasterSecretSource {
    #[must_use]
    pub fn new(
        external: Option<SecretString>,
        configured: Option<SecretString>,
        mode: EncryptionMode,
    ) -> Self {
        Self {
            external: external.filter(|s| !s.expose_secret().is_empty()),
            configured: configured.filter(|s| !s.expose_secret().is_empty()),
            mode,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &Settings, external: Option<SecretString>) -> Self {
        Self::new(
            external,
            settings.encryption_key.clone(),
            settings.encryption_mode,
        )
    }

    /// The external secret wins; `env` mode never falls back to the configured one.
    ///
    /// # Errors
    /// Returns `Error::NoSecretConfigured` if no usable secret exists for the mode.
    pub fn resolve(&self) -> Result<&SecretString> {
        let candidate = match self.mode {
            EncryptionMode::Env => self.external.as_ref(),
            EncryptionMode::Config => self.external.as_ref().or(self.configured.as_ref()),
        };
        candidate.ok_or(Error::NoSecretConfigured)
    }

    /// True when `resolve` would have to fall back to a bootstrapped secret.
    #[must_use]
    pub fn needs_bootstrap(&self) -> bool {
        self.mode == EncryptionMode::Config && self.external.is_none() && self.configured.is_none()
    }
}

/// SHA-256 hex of the master secret, stored to detect secret changes.
#[must_use]
pub fn fingerprint(secret: &SecretString) -> String {
    format!("{:x}", Sha256::digest(secret.expose_secret().as_bytes()))
}

/// A fresh random secret for config-mode bootstrap.
#[must_use]
pub fn generate_master_secret() -> SecretString {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    SecretString::from(Base64::encode_string(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(value: &str) -> Option<SecretString> {
        Some(SecretString::from(value.to_string()))
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn external_secret_preferred() {
        let source = MasterSecretSource::new(secret("env"), secret("cfg"), EncryptionMode::Config);
        assert_eq!(source.resolve().unwrap().expose_secret(), "env");
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn config_mode_falls_back_to_configured() {
        let source = MasterSecretSource::new(None, secret("cfg"), EncryptionMode::Config);
        assert_eq!(source.resolve().unwrap().expose_secret(), "cfg");
        assert!(!source.needs_bootstrap());
    }

    #[test]
    fn env_mode_ignores_configured() {
        let source = MasterSecretSource::new(None, secret("cfg"), EncryptionMode::Env);
        assert!(matches!(source.resolve(), Err(Error::NoSecretConfigured)));
    }

    #[test]
    fn empty_secrets_are_absent() {
        let source = MasterSecretSource::new(secret(""), secret(""), EncryptionMode::Config);
        assert!(matches!(source.resolve(), Err(Error::NoSecretConfigured)));
        assert!(source.needs_bootstrap());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn fingerprint_is_stable() {
        let a = secret("same").unwrap();
        let b = secret("same").unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 64);
        assert_ne!(
            generate_master_secret().expose_secret(),
            generate_master_secret().expose_secret()
        );
    }
}
