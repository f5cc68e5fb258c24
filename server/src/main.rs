use std::sync::Arc;

use anyhow::{Context, Result};
use arena_server::store::seed_teams;
use arena_server::{Arena, ArenaConfig, Collaborators, SessionReaper, serve};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,arena_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ArenaConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to load configuration from environment: {e}");
            tracing::info!("Using default configuration");
            ArenaConfig::default()
        }
    };

    let stores = Collaborators::in_memory();
    if let Some(path) = &config.teams_file {
        let document = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read team seed file {}", path.display()))?;
        let seeded = seed_teams(stores.teams.as_ref(), &document).await?;
        tracing::info!(count = seeded.len(), file = %path.display(), "Seeded teams");
    }

    let arena = Arc::new(Arena::new(stores, &config));
    tokio::spawn(SessionReaper::new(Arc::clone(&arena), config.reaper_interval).run());

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "Arena server listening");

    tokio::select! {
        result = serve(arena, listener) => result?,
        _ = shutdown_signal() => {}
    }

    tracing::info!("Arena server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
