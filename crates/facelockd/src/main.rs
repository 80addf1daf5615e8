use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use config::Config;
use dbus_interface::ManagerService;
use engine::SpoolFrameSource;
use facelock_store::TemplateStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facelockd starting");

    let config = Config::from_env();

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    std::fs::create_dir_all(&config.spool_dir)
        .with_context(|| format!("creating spool directory {}", config.spool_dir.display()))?;

    let store = TemplateStore::open(&config.db_path)
        .with_context(|| format!("opening template store at {}", config.db_path.display()))?;

    tracing::info!(
        spool = %config.spool_dir.display(),
        threshold = config.match_threshold,
        "engine configuration"
    );

    let source = SpoolFrameSource::new(config.spool_dir.clone());
    let system_bus = config.system_bus;
    let match_threshold = config.match_threshold;
    let handle = engine::spawn_engine(config, store, Box::new(source));

    let service = ManagerService::new(handle, match_threshold);
    let builder = if system_bus {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    let _connection = builder
        .name("org.facelock.Manager1")?
        .serve_at("/org/facelock/Manager1", service)?
        .build()
        .await
        .context("registering on D-Bus")?;

    tracing::info!("facelockd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facelockd shutting down");

    Ok(())
}
