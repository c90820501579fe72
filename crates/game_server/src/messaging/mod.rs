//! Inbound packet handling.
//!
//! A socket's frames are handled one at a time, in arrival order. Each frame
//! is routed by opcode to a [`PacketHandler`]; whatever the handler returns
//! is written back to the same socket.

pub mod router;

pub use router::PacketRouter;

use crate::connection::{ConnectionId, ConnectionManager};
use crate::error::ServerError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use world_core::visibility::Reconciler;
use world_core::{Character, World};

/// Everything a handler may touch.
#[derive(Debug)]
pub struct HandlerContext {
    pub world: Arc<World>,
    pub connections: Arc<ConnectionManager>,
    pub reconciler: Arc<Reconciler>,
    /// Reconciliation task of each connection that entered the world
    pub reconcile_tasks: DashMap<ConnectionId, JoinHandle<()>>,
}

impl HandlerContext {
    pub fn new(world: Arc<World>, connections: Arc<ConnectionManager>) -> Self {
        let reconciler = world.reconciler(connections.clone());
        Self {
            world,
            connections,
            reconciler,
            reconcile_tasks: DashMap::new(),
        }
    }

    /// The character playing on `connection_id`, if it entered the world.
    pub fn character(&self, connection_id: ConnectionId) -> Option<Arc<Character>> {
        self.connections.character(connection_id)
    }
}

/// Handles one client opcode.
///
/// `Ok(None)` means nothing is written back; that is also how stale or
/// racing requests are ignored.
#[async_trait]
pub trait PacketHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &HandlerContext, connection_id: ConnectionId, payload: &[u8]) -> Result<Option<Vec<u8>>, ServerError>;
}
