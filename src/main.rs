use clap::Parser;
use he_level_monitor::api::{self, ApiState};
use he_level_monitor::config::{self, Config};
use he_level_monitor::monitor::{Monitor, MonitorSettings};
use he_level_monitor::remote::RpcClient;
use he_level_monitor::sensor::remote::RemoteLevelMeter;
use he_level_monitor::sink::{MySqlStatusStore, RemoteDataVault, StatusStore};
use he_level_monitor::state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "he-level-monitor")]
#[command(about = "Liquid helium level monitor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = config::load_from_path(&cli.config)?;
    init_tracing(&config.logging.level);
    tracing::info!(
        config_path = %cli.config.display(),
        app = %config.app.name,
        "he-level-monitor starting"
    );

    let state = Arc::new(RwLock::new(AppState::new()));
    let geometry = config.geometry();
    let settings = MonitorSettings::from_config(&config)?;

    let meter_rpc = RpcClient::new(config.hardware.endpoint.clone(), config.rpc_timeout())?;
    let meter = RemoteLevelMeter::new(meter_rpc, config.meter_server());
    let vault_rpc = RpcClient::new(config.datavault_endpoint(), config.rpc_timeout())?;
    let datalog = RemoteDataVault::new(vault_rpc, config.datavault_server());
    let store = status_store(&config)?;

    let monitor = Monitor::new(
        Box::new(meter),
        Box::new(datalog),
        store,
        geometry.clone(),
        settings,
        Arc::clone(&state),
    )?;
    let (stop_tx, stop_rx) = watch::channel(false);
    let (handle, monitor_task) = monitor.spawn(stop_rx);

    let app = api::router(ApiState {
        state: Arc::clone(&state),
        monitor: handle,
        geometry: Arc::new(geometry),
    });
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = stop_tx.send(true);
    if let Err(err) = monitor_task.await {
        tracing::warn!(error = %err, "Monitor task ended abnormally");
    }

    Ok(())
}

fn status_store(config: &Config) -> Result<Option<Box<dyn StatusStore>>, Box<dyn std::error::Error>> {
    let Some(section) = config.database.as_ref() else {
        tracing::info!("No [database] section, status rows will not be uploaded");
        return Ok(None);
    };
    let password = match section.password() {
        Ok(password) => password,
        Err(err) => {
            tracing::warn!(error = %err, "Status database disabled");
            return Ok(None);
        }
    };
    let store = MySqlStatusStore::new(section, password)?;
    Ok(Some(Box::new(store)))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_toml() -> Result<(), Box<dyn std::error::Error>> {
        let _config = config::load_default()?;
        Ok(())
    }

    #[tokio::test]
    async fn bundled_config_builds_status_store() -> Result<(), Box<dyn std::error::Error>> {
        let config = config::load_default()?;

        let store = status_store(&config)?;

        assert!(store.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_password_file_disables_status_store()
    -> Result<(), Box<dyn std::error::Error>> {
        let mut config = config::load_default()?;
        if let Some(section) = config.database.as_mut() {
            section.password_file = Some(PathBuf::from("config/no-such-password.txt"));
        }

        let store = status_store(&config)?;

        assert!(store.is_none());
        Ok(())
    }

    #[test]
    fn cli_defaults_to_bundled_config() {
        let cli = Cli::try_parse_from(["he-level-monitor"]).expect("parse cli");
        assert_eq!(cli.config, PathBuf::from(config::DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn cli_accepts_config_override() {
        let cli = Cli::try_parse_from(["he-level-monitor", "--config", "other.toml"])
            .expect("parse cli");
        assert_eq!(cli.config, PathBuf::from("other.toml"));
    }
}
