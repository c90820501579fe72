//! Opcode routing with a per-packet recovery boundary.

use super::{HandlerContext, PacketHandler};
use crate::connection::ConnectionId;
use crate::error::ServerError;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};
use world_core::wire::Frame;

/// Maps client opcodes to their handlers.
#[derive(Default)]
pub struct PacketRouter {
    handlers: HashMap<u8, Arc<dyn PacketHandler>>,
}

impl std::fmt::Debug for PacketRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut opcodes: Vec<_> = self.handlers.keys().copied().collect();
        opcodes.sort_unstable();
        f.debug_struct("PacketRouter").field("opcodes", &opcodes).finish()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ")
}

impl PacketRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, opcode: u8, handler: Arc<dyn PacketHandler>) -> &mut Self {
        if let Some(old) = self.handlers.insert(opcode, handler) {
            warn!("handler '{}' for opcode {:#04X} replaced", old.name(), opcode);
        }
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Runs the handler for `frame`.
    ///
    /// Handler errors and panics are logged with the packet bytes and end
    /// only this packet; the connection stays open.
    pub async fn route(&self, ctx: &HandlerContext, connection_id: ConnectionId, frame: &Frame) -> Option<Vec<u8>> {
        let Some(handler) = self.handlers.get(&frame.opcode) else {
            debug!(connection = connection_id, "no handler for opcode {:#04X}", frame.opcode);
            return None;
        };
        trace!(connection = connection_id, handler = handler.name(), len = frame.payload.len(), "routing packet");

        let result = AssertUnwindSafe(handler.handle(ctx, connection_id, &frame.payload))
            .catch_unwind()
            .await;
        match result {
            Ok(Ok(response)) => response,
            Ok(Err(ServerError::Protocol(msg))) => {
                debug!(connection = connection_id, handler = handler.name(), "malformed packet: {}", msg);
                None
            }
            Ok(Err(e)) => {
                warn!(connection = connection_id, handler = handler.name(), "handler failed: {}", e);
                None
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                let character = ctx.character(connection_id).map(|c| c.id);
                error!(
                    connection = connection_id,
                    character = ?character,
                    handler = handler.name(),
                    opcode = frame.opcode,
                    packet = %hex(&frame.payload),
                    "💥 Recovered from handler panic: {}",
                    reason
                );
                None
            }
        }
    }
}
