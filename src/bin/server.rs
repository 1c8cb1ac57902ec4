//! Self-play coordination server
//!
//! Usage: `mortal-server [config.toml]`
//!
//! Configuration comes from the optional TOML file (or `MORTAL_CONFIG`)
//! and `MORTAL_*` environment variables; see `ServerConfig`. Both log
//! directories are emptied on startup.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use mortal_server::observability::init_tracing;
use mortal_server::storage::LocalLogStore;
use mortal_server::{CoordinatorServer, ServerConfig, ServerState};
use std::path::PathBuf;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = ServerConfig::load(config_path.as_deref())?;
    init_tracing(config.log_format);

    let store = LocalLogStore::recreate(&config.buffer_dir, &config.drain_dir)?;
    info!(
        "buffer_dir={}, drain_dir={}",
        store.buffer_dir().display(),
        store.drain_dir().display()
    );
    info!(
        "sample_reuse_rate={}, sample_reuse_threshold={}, capacity={}, max_connections={}",
        config.sample_reuse_rate,
        config.sample_reuse_threshold,
        config.capacity,
        config.max_connections
    );

    let state = ServerState::new(store, config.runtime());
    let listener = CoordinatorServer::bind(&config).await?;
    let server = CoordinatorServer::new(state, &config);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };
    server.run_until(listener, shutdown).await?;

    Ok(())
}
