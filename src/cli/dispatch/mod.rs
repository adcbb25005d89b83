//! Map parsed arguments to the action the binary runs.

use crate::cli::actions::{regenerate, server, setup::Options, Action};
use crate::cli::commands::{secrets, ARG_CONFIG, ARG_DSN, ARG_PORT, CMD_REGENERATE};
use anyhow::{Context, Result};
use clap::ArgMatches;
use std::path::PathBuf;

fn options(matches: &ArgMatches) -> Result<Options> {
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let config = matches.get_one::<PathBuf>(ARG_CONFIG).cloned();

    Ok(Options { dsn, config })
}

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    if let Some((CMD_REGENERATE, sub)) = matches.subcommand() {
        return Ok(Action::Regenerate(regenerate::Args {
            options: options(sub)?,
            globals: secrets::parse(sub),
        }));
    }

    Ok(Action::Server(server::Args {
        port: matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080),
        options: options(matches)?,
        globals: secrets::parse(matches),
    }))
}
