use super::setup::{Components, Options};
use crate::cli::globals::GlobalArgs;
use anyhow::{Context, Result};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub options: Options,
    pub globals: GlobalArgs,
}

/// Re-encrypt every stored key under the active master secret.
///
/// The rotation state is updated first, so a server started afterwards does
/// not regenerate a second time.
/// # Errors
/// Returns an error if setup fails or no master secret is available.
pub async fn execute(args: Args) -> Result<()> {
    let components = Components::build(&args.options, &args.globals).await?;

    let regenerated = match components
        .watcher()
        .check()
        .await
        .context("Master secret check failed")?
    {
        Some(regenerated) => regenerated,
        None => components
            .service
            .force_regenerate_all()
            .await
            .context("Failed to regenerate API keys")?,
    };

    info!(regenerated, "Regeneration finished");
    println!("Regenerated {regenerated} API key(s)");

    Ok(())
}
