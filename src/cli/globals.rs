use secrecy::SecretString;

/// Secrets taken from the command line or environment, shared by every action.
#[derive(Clone, Default)]
pub struct GlobalArgs {
    pub encryption_key: Option<SecretString>,
    pub admin_token: Option<SecretString>,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(encryption_key: Option<SecretString>, admin_token: Option<SecretString>) -> Self {
        Self {
            encryption_key,
            admin_token,
        }
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |value: &Option<SecretString>| if value.is_some() { "***" } else { "none" };
        f.debug_struct("GlobalArgs")
            .field("encryption_key", &redact(&self.encryption_key))
            .field("admin_token", &redact(&self.admin_token))
            .finish()
    }
}
