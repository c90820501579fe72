//! # Game Server
//!
//! Networking front of one Sightline shard. The server accepts TCP clients,
//! decodes their framed packets, routes them by opcode to the packet
//! handlers and delivers world events from the broadcast bus back to the
//! sockets that should see them.
//!
//! ## Message Flow
//!
//! 1. A client sends `AA 55 | len | opcode | payload | 55 AA`
//! 2. The connection task decodes frames and handles them one at a time
//! 3. The [`messaging::PacketRouter`] calls the handler for the opcode inside
//!    a recovery boundary
//! 4. A direct response goes back to the same socket; anything other players
//!    should see is published on the bus as an envelope
//! 5. The bus subscriber filters each envelope per local session (cast-near)
//!    and writes it through the [`connection::ConnectionManager`]
//!
//! Visibility packets (appear / disappear) do not go through the bus: each
//! character that entered the world has its own reconciliation task writing
//! straight to its socket.
//!
//! ## Thread Safety
//!
//! * Connection state lives in `DashMap`s; sends only enqueue onto a
//!   per-socket channel drained by a writer task
//! * No world lock is held while bytes are queued or written

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::GameServer;

pub mod config;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod messaging;
pub mod server;

use world_core::WorldSeed;

/// Creates a server with default configuration and an empty world.
pub fn create_server() -> GameServer {
    GameServer::new(ServerConfig::default(), WorldSeed::default())
}

/// Creates a server with the given configuration and world seed.
pub fn create_server_with_config(config: ServerConfig, seed: WorldSeed) -> GameServer {
    GameServer::new(config, seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_server_has_empty_world() {
        let server = create_server();
        let stats = server.world().stats();
        assert_eq!(stats.ais, 0);
        assert_eq!(stats.characters, 0);
        assert_eq!(server.connection_manager().connection_count(), 0);
    }

    #[tokio::test]
    async fn configuration_reaches_the_world() {
        let mut config = ServerConfig {
            server_id: 3,
            shard_count: 4,
            ..Default::default()
        };
        config.world.perception_radius = 25.0;

        let server = create_server_with_config(config, WorldSeed::default());
        assert_eq!(server.world().server_id(), 3);
        assert_eq!(server.world().config().perception_radius, 25.0);
    }

    #[test]
    fn every_client_opcode_has_a_handler() {
        let mut router = messaging::PacketRouter::new();
        handlers::register_all(&mut router);
        assert_eq!(router.handler_count(), 6);
    }
}
