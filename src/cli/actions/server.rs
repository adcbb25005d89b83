use super::setup::{Components, Options};
use crate::{
    api::{self, AppState},
    auth::AuthenticationPipeline,
    cache::MemoryCache,
    cli::globals::GlobalArgs,
    maintenance::spawn_maintenance,
    principal::PrincipalDirectory,
    rate_limit::RateLimitCounter,
    store::postgres::PgDirectory,
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing::{error, info};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub options: Options,
    pub globals: GlobalArgs,
}

/// Execute the server action.
/// # Errors
/// Returns an error if setup fails or the server cannot start.
pub async fn execute(args: Args) -> Result<()> {
    let components = Components::build(&args.options, &args.globals).await?;
    if let Some(regenerated) = components
        .watcher()
        .check()
        .await
        .context("Master secret check failed")?
    {
        info!(regenerated, "API keys re-encrypted under the active master secret");
    }

    let Components {
        pool,
        settings,
        clock,
        keys,
        notifier,
        service,
        ..
    } = components;

    let cache = Arc::new(MemoryCache::new(clock.clone()));
    let counter = Arc::new(RateLimitCounter::new(
        cache.clone(),
        keys.clone(),
        clock.clone(),
    ));
    let principals: Arc<dyn PrincipalDirectory> = Arc::new(PgDirectory::new(pool.clone()));

    let pipeline = Arc::new(
        AuthenticationPipeline::new(&settings, keys, principals, counter, notifier, clock)
            .context("Invalid authentication settings")?,
    );

    let maintenance = spawn_maintenance(
        cache,
        service.clone(),
        settings.expired_key_retention.as_duration(),
        MAINTENANCE_INTERVAL,
    );

    if args.globals.admin_token.is_none() {
        info!("No admin token configured, admin routes disabled");
    }

    let state = Arc::new(
        AppState::new(
            pipeline,
            service,
            args.globals.admin_token,
            settings.trust_forwarded_for,
        )
        .with_pool(pool),
    );

    let result = api::serve(args.port, state, shutdown_signal()).await;
    maintenance.abort();
    result
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
    }
    info!("Gracefully shutdown");
}
