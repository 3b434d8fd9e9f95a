//! Pictura daemon: loads configuration, opens the document store, and runs
//! every worker pool, the library scheduler and the reconciler until
//! SIGINT/SIGTERM.

use pictura_core::Core;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let data_dir = match std::env::var("PICTURA_DATA_DIR") {
        Ok(path) => PathBuf::from(path),
        Err(_) => pictura_core::config::default_data_dir()?,
    };

    let core = Core::new_with_config(data_dir).await?;
    let handles = core.spawn_all();

    tracing::info!("picturad running - press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    core.shutdown().await?;

    let grace_period = std::time::Duration::from_secs(30);
    if tokio::time::timeout(grace_period, futures::future::join_all(handles))
        .await
        .is_err()
    {
        tracing::warn!("shutdown grace period elapsed with tasks still draining");
    }

    Ok(())
}
