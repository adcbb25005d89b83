use crate::cli::globals::GlobalArgs;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_ENCRYPTION_KEY: &str = "encryption-key";
pub const ARG_ADMIN_TOKEN: &str = "admin-token";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ENCRYPTION_KEY)
                .long(ARG_ENCRYPTION_KEY)
                .help("Master secret used to encrypt stored API keys")
                .long_help(
                    "Master secret used to encrypt stored API keys. Required when the settings select the `env` encryption mode; otherwise it takes precedence over the configured secret.",
                )
                .env("SENTINEL_ENCRYPTION_KEY")
                .hide_env_values(true)
                .global(true),
        )
        .arg(
            Arg::new(ARG_ADMIN_TOKEN)
                .long(ARG_ADMIN_TOKEN)
                .help("Bearer token for the /admin routes (routes are disabled without it)")
                .env("SENTINEL_ADMIN_TOKEN")
                .hide_env_values(true),
        )
}

/// Collect the secrets into `GlobalArgs`; empty values count as absent.
#[must_use]
pub fn parse(matches: &ArgMatches) -> GlobalArgs {
    let secret = |id: &str| {
        matches
            .try_get_one::<String>(id)
            .ok()
            .flatten()
            .filter(|value| !value.trim().is_empty())
            .map(|value| SecretString::from(value.clone()))
    };

    GlobalArgs::new(secret(ARG_ENCRYPTION_KEY), secret(ARG_ADMIN_TOKEN))
}
