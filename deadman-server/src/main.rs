//! Deadman server binary
//!
//! Runs the worker pool, the cron scheduler and the probe scheduler against
//! the in-memory store, or PostgresSQL when `DEADMAN_DATABASE_URL` is set and
//! the `postgres` feature is enabled.

mod config;

use config::ServerSettings;
use deadman::{CronScheduler, LogMessenger, MemoryStore, ProbeScheduler, Store, WorkerPool};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialize logging
  tracing_subscriber::registry()
    .with(fmt::layer())
    .with(EnvFilter::from_default_env().add_directive("deadman=info".parse()?))
    .init();

  info!(version = deadman::base::constants::VERSION, "Starting deadman-server");
  let settings = ServerSettings::from_env()?;

  match settings.database_url.clone() {
    #[cfg(feature = "postgres")]
    Some(url) => {
      info!("Using PostgresSQL store");
      let store = deadman::PostgresStore::new(&url).await?;
      run(Arc::new(store), settings).await
    }
    #[cfg(not(feature = "postgres"))]
    Some(_) => Err(anyhow::anyhow!(
      "DEADMAN_DATABASE_URL is set but deadman-server was built without the postgres feature"
    )),
    None => {
      info!("Using in-memory store, jobs will not survive a restart");
      run(Arc::new(MemoryStore::new()), settings).await
    }
  }
}

async fn run<S: Store + 'static>(store: Arc<S>, settings: ServerSettings) -> anyhow::Result<()> {
  let pool = Arc::new(WorkerPool::new(store.clone(), settings.pool_config())?);
  let cron = Arc::new(CronScheduler::new(pool.client()));
  let probes = ProbeScheduler::new(
    store,
    pool.clone(),
    cron.clone(),
    Arc::new(LogMessenger),
    settings.probe_config(),
  )?;
  probes.register_handlers()?;

  let users = probes.bootstrap().await?;
  pool.start().await;
  cron.start().await;
  info!(
    pool = %pool.pool_id(),
    users,
    concurrency = settings.concurrency,
    "deadman-server running, press Ctrl+C to stop"
  );

  tokio::signal::ctrl_c().await?;
  info!("Shutdown signal received");

  cron.stop().await;
  pool.stop().await;
  info!("deadman-server stopped");
  Ok(())
}
