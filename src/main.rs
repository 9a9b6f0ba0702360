mod driver;

use anyhow::Result;
use arpose_config::AppConfig;
use arpose_net::PoseClient;
use arpose_scene::DebugScene;
use driver::Driver;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arpose_app=info,arpose_net=info,arpose_scene=info".into()),
        )
        .init();

    info!("arpose starting");

    let (config, save_path) = match arpose_config::config_path() {
        Ok(path) => startup_config(path),
        Err(e) => {
            warn!(?e, "No config location, using defaults");
            (AppConfig::default(), None)
        }
    };
    info!(server = %config.net.addr(), interval_ms = config.update.interval_ms, "Config loaded");

    let client = PoseClient::new(config.net.clone(), Handle::current());
    let scene = DebugScene::new(&config.scene);
    let mut driver = Driver::new(&config, client, Box::new(scene));

    let mut ticker = tokio::time::interval(Duration::from_millis(config.update.interval_ms.max(1)));
    // A slow tick pushes the schedule back instead of bursting to catch up.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = driver.tick() {
                    error!(?e, "Update loop stopped");
                    break Err(e);
                }
            }
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    warn!(?e, "Ctrl-C handler failed");
                }
                info!("Shutting down");
                break Ok(());
            }
        }
    };

    if let Some(path) = &save_path {
        save_on_exit(path, &config);
    }

    result
}

/// Load the config at `path`. The path is handed back for saving on exit only
/// when the load succeeded, so a file that failed to parse is never replaced.
fn startup_config(path: PathBuf) -> (AppConfig, Option<PathBuf>) {
    match arpose_config::load_from(&path) {
        Ok(config) => (config, Some(path)),
        Err(e) => {
            warn!(?e, "Failed to load config, using defaults");
            (AppConfig::default(), None)
        }
    }
}

fn save_on_exit(path: &Path, config: &AppConfig) {
    if let Err(e) = arpose_config::save_to(path, config) {
        error!(?e, "Failed to save config");
    }
}
