//! Server configuration types and defaults.

use std::net::SocketAddr;
use world_core::{ServerId, WorldConfig};

/// Configuration structure for the game server.
///
/// Contains network settings, the shard identity of this process and the
/// tunables handed to the world simulation.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Shard served by this process
    pub server_id: ServerId,

    /// Number of shards sharing the broadcast bus
    pub shard_count: u16,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Idle read timeout in seconds, `0` disables it
    pub connection_timeout: u64,

    /// Whether to use SO_REUSEPORT for multi-threaded accept loops
    pub use_reuse_port: bool,

    /// Interval of the statistics tick, `0` disables it
    pub tick_interval_ms: u64,

    pub world: WorldConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            server_id: 0,
            shard_count: 1,
            max_connections: 1000,
            connection_timeout: 60,
            use_reuse_port: false,
            tick_interval_ms: 0,
            world: WorldConfig::default(),
        }
    }
}
