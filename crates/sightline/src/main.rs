//! Sightline server entry point.
//!
//! Parses the command line, loads and validates the TOML configuration, sets
//! up logging, loads the world seed and runs one shard until a termination
//! signal arrives.

mod cli;
mod config;
mod signals;

use anyhow::{Context, Result};
use cli::CliArgs;
use config::{AppConfig, LoggingSettings};
use game_server::GameServer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use world_core::WorldSeed;

/// How long the server gets to tear down sessions after a signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Initializes the global subscriber: console output, human-readable or
/// JSON, plus an optional plain log file. `RUST_LOG` wins over the
/// configured level.
fn setup_logging(config: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console = if config.json_format {
        fmt::layer()
            .json()
            .with_file(false)
            .with_line_number(false)
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    } else {
        fmt::layer()
            .with_ansi(true)
            .with_file(false)
            .with_line_number(false)
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    };

    let file = match &config.file_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_thread_ids(true)
                    .with_writer(std::sync::Mutex::new(file))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("installing the tracing subscriber")?;

    info!("🔧 Logging initialized with level: {}", config.level);
    Ok(())
}

/// Command-line values take precedence over the file.
fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(bind_address) = &args.bind_address {
        config.server.bind_address = bind_address.clone();
    }
    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    if let Some(seed_path) = &args.seed_path {
        config.world.seed_path = Some(seed_path.to_string_lossy().to_string());
    }
}

pub struct Application {
    config: AppConfig,
    server: Arc<GameServer>,
}

impl Application {
    pub async fn new(args: CliArgs) -> Result<Self> {
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        apply_overrides(&mut config, &args);
        config.validate().context("Configuration validation failed")?;

        setup_logging(&config.logging)?;
        display_banner();
        info!("📂 Config: {}", args.config_path.display());

        Self::from_config(config).await
    }

    /// Loads the world seed and builds the server. Logging must already be
    /// set up.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let seed = match config.seed_path() {
            Some(path) => WorldSeed::load(&path)
                .await
                .with_context(|| format!("loading world seed {}", path.display()))?,
            None => {
                warn!("No world seed configured, starting with an empty world");
                WorldSeed::default()
            }
        };

        let server_config = config.to_server_config()?;
        let server = Arc::new(GameServer::new(server_config, seed));
        Ok(Self { config, server })
    }

    pub async fn run(self) -> Result<()> {
        info!("🌟 Starting Sightline shard {}", self.config.server.server_id);
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!(
            "  🗺️ Shard: {} of {}",
            self.config.server.server_id, self.config.server.shard_count
        );
        info!("  👁️ Perception radius: {}", self.config.world.tuning.perception_radius);
        info!("  👥 Max connections: {}", self.config.server.max_connections);
        info!("  ⏱️ Connection timeout: {}s", self.config.server.connection_timeout);

        let mut server_handle = {
            let server = self.server.clone();
            tokio::spawn(async move { server.start().await })
        };

        info!("🛑 Press Ctrl+C to gracefully shutdown");

        tokio::select! {
            signal = signals::wait_for_shutdown_signal() => {
                signal?;
                info!("🛑 Shutdown signal received, initiating graceful shutdown...");
            }
            finished = &mut server_handle => {
                // the server stopped without being asked to
                finished.context("server task panicked")??;
                return Ok(());
            }
        }

        self.server.shutdown().await?;
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, server_handle).await {
            Ok(joined) => joined.context("server task panicked")??,
            Err(_) => error!("❌ Server did not stop within {:?}", SHUTDOWN_TIMEOUT),
        }

        let stats = self.server.world().stats();
        info!(
            maps = stats.maps,
            characters = stats.characters,
            ais = stats.ais,
            "✅ Sightline shutdown complete"
        );
        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let app = match Application::new(args).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("❌ Failed to start application: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run().await {
        error!("❌ Application error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn display_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("╔══════════════════════════════════════════╗");
    info!("║            👁️  SIGHTLINE  👁️              ║");
    info!("║          World Server v{:<18}║", version);
    info!("╚══════════════════════════════════════════╝");
}
