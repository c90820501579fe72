//! Handlers for the client opcodes.
//!
//! Every handler starts by resolving the connection's character. A
//! connection without one, or a character that is dead or off-map, is a
//! silent no-op: those states are normal during login, death and teardown.

pub mod attack;
pub mod deal_damage;
pub mod enter_world;
pub mod movement;
pub mod respawn;

use crate::messaging::PacketRouter;
use std::sync::Arc;
use world_core::packets::{self, opcodes};

/// Furthest a character can hit from, in world units.
pub const PLAYER_ATTACK_RANGE: f64 = 10.0;

pub fn register_all(router: &mut PacketRouter) {
    router
        .register(opcodes::ENTER_WORLD, Arc::new(enter_world::EnterWorldHandler))
        .register(opcodes::MOVE, Arc::new(movement::MoveHandler))
        .register(opcodes::ATTACK_MOB, Arc::new(attack::AttackMobHandler))
        .register(opcodes::ATTACK_PLAYER, Arc::new(attack::AttackPlayerHandler))
        .register(opcodes::DEAL_DAMAGE, Arc::new(deal_damage::DealDamageHandler))
        .register(opcodes::RESPAWN, Arc::new(respawn::RespawnHandler));
}

/// A short message for the client's notice area.
fn notice(text: &str) -> Option<Vec<u8>> {
    Some(packets::notice(text))
}

#[cfg(test)]
pub(crate) mod testing {
    //! A world with one map and one connected character.

    use crate::connection::{ConnectionId, ConnectionManager};
    use crate::messaging::HandlerContext;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use world_core::wire::PacketBuilder;
    use world_core::{Character, LocalBus, MemoryPersistence, World, WorldConfig, WorldSeed};

    pub const SEED: &str = r#"
        [[maps]]
        id = 1
        spawn = { x = 0.0, y = 0.0 }

        [[mobs]]
        kind_id = 7
        name = "Training Dummy"
        max_hp = 30
        respawn_secs = 0
        stats = { level = 1, min_attack = 1, max_attack = 1, defense = 0, accuracy = 10, critical_rate = 0.0 }

        [[spawns]]
        kind_id = 7
        map = 1
        coordinate = { x = 3.0, y = 0.0 }
    "#;

    pub struct Harness {
        pub ctx: HandlerContext,
        pub outbound: mpsc::UnboundedReceiver<Vec<u8>>,
        pub connection_id: ConnectionId,
    }

    impl Harness {
        /// Seeds the world, without starting AI loops.
        pub async fn new() -> Self {
            Self::with_config(WorldConfig::default()).await
        }

        pub async fn with_config(config: WorldConfig) -> Self {
            let seed = WorldSeed::from_toml(SEED).unwrap();
            let world = World::new(
                0,
                config,
                seed.clone(),
                Arc::new(LocalBus::default()),
                Arc::new(MemoryPersistence::new()),
            );
            seed.populate(world.registry(), 0).await.unwrap();
            let connections = Arc::new(ConnectionManager::new());
            let (tx, outbound) = mpsc::unbounded_channel();
            let connection_id = connections.add_connection(SocketAddr::from(([127, 0, 0, 1], 5000)), tx);
            Self {
                ctx: HandlerContext::new(world, connections),
                outbound,
                connection_id,
            }
        }

        /// Connects a second socket.
        pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Vec<u8>>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (self.ctx.connections.add_connection(SocketAddr::from(([127, 0, 0, 1], 5001)), tx), rx)
        }

        pub fn enter_payload(id: i32, name: &str) -> Vec<u8> {
            let mut b = PacketBuilder::new(0);
            b.put_int(id as u64, 4, true).put_str(name);
            let framed = b.finish();
            framed[5..framed.len() - 2].to_vec()
        }

        pub async fn enter(&self, connection_id: ConnectionId, id: i32, name: &str) -> Arc<Character> {
            use crate::messaging::PacketHandler;
            super::enter_world::EnterWorldHandler
                .handle(&self.ctx, connection_id, &Self::enter_payload(id, name))
                .await
                .unwrap();
            self.ctx.character(connection_id).unwrap()
        }
    }
}
