//! Application configuration: loading, validation and conversion of the
//! TOML config file into the typed server and world configuration.

use anyhow::{bail, Context, Result};
use game_server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use world_core::{ServerId, WorldConfig};

fn default_shard_count() -> u16 {
    1
}

fn default_max_connections() -> usize {
    1000
}

pub fn default_connection_timeout() -> u64 {
    60
}

fn default_tick_interval() -> u64 {
    5000
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerSettings,
    #[serde(default)]
    pub world: WorldSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Network binding, shard identity and connection limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8080")
    pub bind_address: String,
    /// Shard served by this process
    #[serde(default)]
    pub server_id: ServerId,
    #[serde(default = "default_shard_count")]
    pub shard_count: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Idle timeout in seconds, `0` disables it
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// Whether to use SO_REUSEPORT for multi-threaded accept loops (Linux only)
    #[serde(default)]
    pub use_reuse_port: bool,
    /// Statistics tick interval in milliseconds (0 to disable)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            server_id: 0,
            shard_count: default_shard_count(),
            max_connections: default_max_connections(),
            connection_timeout: default_connection_timeout(),
            use_reuse_port: false,
            tick_interval_ms: default_tick_interval(),
        }
    }
}

/// Simulation tunables plus the location of the world seed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldSettings {
    #[serde(flatten)]
    pub tuning: WorldConfig,
    /// Without a seed the world starts empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_path: Option<String>,
}

/// Log output format, level and destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    #[serde(default)]
    pub json_format: bool,
    /// Also write logs to this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file_path: None,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration file is written at
    /// the path and the defaults are returned.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("writing default config to {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn seed_path(&self) -> Option<PathBuf> {
        self.world.seed_path.as_ref().map(PathBuf::from)
    }

    /// Converts the application configuration to the game server's typed
    /// configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig> {
        Ok(ServerConfig {
            bind_address: self
                .server
                .bind_address
                .parse()
                .with_context(|| format!("Invalid bind address: {}", self.server.bind_address))?,
            server_id: self.server.server_id,
            shard_count: self.server.shard_count,
            max_connections: self.server.max_connections,
            connection_timeout: self.server.connection_timeout,
            use_reuse_port: self.server.use_reuse_port,
            tick_interval_ms: self.server.tick_interval_ms,
            world: self.world.tuning.clone(),
        })
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            bail!("Invalid bind address: {}", self.server.bind_address);
        }

        if self.server.shard_count == 0 {
            bail!("shard_count must be at least 1");
        }
        if self.server.server_id >= self.server.shard_count {
            bail!(
                "server_id {} must be less than shard_count {}",
                self.server.server_id,
                self.server.shard_count
            );
        }
        if self.server.max_connections == 0 {
            bail!("max_connections must be at least 1");
        }

        let world = &self.world.tuning;
        if !(world.perception_radius.is_finite() && world.perception_radius > 0.0) {
            bail!("perception_radius must be positive");
        }
        if !(world.chase_leash.is_finite() && world.chase_leash > 0.0) {
            bail!("chase_leash must be positive");
        }
        for (name, value) in [
            ("reconcile_interval_ms", world.reconcile_interval_ms),
            ("ai_tick_ms", world.ai_tick_ms),
            ("attack_cooldown_ms", world.attack_cooldown_ms),
            ("drop_lifetime_secs", world.drop_lifetime_secs),
            ("map_capacity", u64::from(world.map_capacity)),
        ] {
            if value == 0 {
                bail!("{} must be positive", name);
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                self.logging.level
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, NamedTempFile};
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert_eq!(config.server.server_id, 0);
        assert_eq!(config.server.shard_count, 1);
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.server.connection_timeout, 60);
        assert!(!config.server.use_reuse_port);

        assert_eq!(config.world.tuning.perception_radius, 50.0);
        assert_eq!(config.world.tuning.reconcile_interval_ms, 1000);
        assert!(config.world.seed_path.is_none());

        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.logging.file_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert!(path.exists());

        // the written file loads back to the same settings
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.server.tick_interval_ms, config.server.tick_interval_ms);
        assert_eq!(reloaded.world.tuning.ai_tick_ms, config.world.tuning.ai_tick_ms);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[server]
bind_address = "0.0.0.0:3000"
server_id = 2
shard_count = 4
max_connections = 2000
connection_timeout = 90
use_reuse_port = true
tick_interval_ms = 0

[world]
perception_radius = 35.0
reconcile_interval_ms = 250
chase_leash = 80.0
seed_path = "worlds/main.toml"

[logging]
level = "debug"
json_format = true
file_path = "/tmp/sightline.log"
"#;

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(temp_file.path()).await.unwrap();

        assert_eq!(config.server.bind_address, "0.0.0.0:3000");
        assert_eq!(config.server.server_id, 2);
        assert_eq!(config.server.shard_count, 4);
        assert_eq!(config.server.max_connections, 2000);
        assert!(config.server.use_reuse_port);
        assert_eq!(config.server.tick_interval_ms, 0);

        assert_eq!(config.world.tuning.perception_radius, 35.0);
        assert_eq!(config.world.tuning.reconcile_interval_ms, 250);
        assert_eq!(config.world.tuning.chase_leash, 80.0);
        // unset tunables keep their defaults
        assert_eq!(config.world.tuning.ai_tick_ms, 500);
        assert_eq!(config.seed_path(), Some(PathBuf::from("worlds/main.toml")));

        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert_eq!(config.logging.file_path.as_deref(), Some("/tmp/sightline.log"));
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_rejects_broken_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[server\nbind_address = ").await.unwrap();
        assert!(AppConfig::load_from_file(temp_file.path()).await.is_err());
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
[server]
bind_address = "127.0.0.1:7000"
"#,
        )
        .unwrap();

        assert_eq!(config.server.shard_count, 1);
        assert_eq!(config.server.connection_timeout, 60);
        assert_eq!(config.world.tuning.attack_cooldown_ms, 1500);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_to_server_config_conversion() {
        let mut app_config = AppConfig::default();
        app_config.server.bind_address = "192.168.1.100:8080".to_string();
        app_config.server.server_id = 1;
        app_config.server.shard_count = 3;
        app_config.server.connection_timeout = 180;
        app_config.world.tuning.perception_radius = 20.0;

        let server_config = app_config.to_server_config().unwrap();

        assert_eq!(server_config.bind_address.to_string(), "192.168.1.100:8080");
        assert_eq!(server_config.server_id, 1);
        assert_eq!(server_config.shard_count, 3);
        assert_eq!(server_config.connection_timeout, 180);
        assert_eq!(server_config.world.perception_radius, 20.0);
    }

    #[test]
    fn test_validation_invalid_bind_address() {
        let mut config = AppConfig::default();
        config.server.bind_address = "invalid_address".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid bind address"));
        assert!(config.to_server_config().is_err());
    }

    #[test]
    fn test_validation_server_id_outside_shards() {
        let mut config = AppConfig::default();
        config.server.shard_count = 2;
        config.server.server_id = 2;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must be less than shard_count"));

        config.server.server_id = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_world_tunables() {
        let mut config = AppConfig::default();
        config.world.tuning.perception_radius = 0.0;
        assert!(config.validate().unwrap_err().to_string().contains("perception_radius"));

        let mut config = AppConfig::default();
        config.world.tuning.reconcile_interval_ms = 0;
        assert!(config.validate().unwrap_err().to_string().contains("reconcile_interval_ms"));

        let mut config = AppConfig::default();
        config.world.tuning.chase_leash = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.world.tuning.map_capacity = 0;
        assert!(config.validate().unwrap_err().to_string().contains("map_capacity"));
    }

    #[test]
    fn test_validation_log_levels() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            let mut config = AppConfig::default();
            config.logging.level = level.to_string();
            assert!(config.validate().is_ok(), "Level '{}' should be valid", level);
        }

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_zero_tick_and_timeout_disable_features() {
        let mut config = AppConfig::default();
        config.server.tick_interval_ms = 0;
        config.server.connection_timeout = 0;
        assert!(config.validate().is_ok());
    }
}
