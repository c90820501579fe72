//! Enter world: binds a character to the connection and places it on its map.
//!
//! Payload: character ID (4 bytes, little endian), name (length prefixed).

use super::notice;
use crate::connection::ConnectionId;
use crate::error::ServerError;
use crate::messaging::{HandlerContext, PacketHandler};
use async_trait::async_trait;
use tracing::{info, warn};
use world_core::packets;
use world_core::wire::PacketReader;

pub struct EnterWorldHandler;

#[async_trait]
impl PacketHandler for EnterWorldHandler {
    fn name(&self) -> &'static str {
        "enter_world"
    }

    async fn handle(&self, ctx: &HandlerContext, connection_id: ConnectionId, payload: &[u8]) -> Result<Option<Vec<u8>>, ServerError> {
        let mut reader = PacketReader::new(payload);
        let character_id = reader.read_int(4, true)? as i32;
        let name = reader.read_str()?;

        if ctx.character(connection_id).is_some() {
            return Ok(None);
        }
        if ctx.connections.connection_of(character_id).is_some() {
            return Ok(notice("This character is already in the world"));
        }

        let character = ctx.world.load_character(character_id, &name).await?;
        if let Err(previous) = ctx.connections.bind_character(connection_id, character.clone()) {
            // lost a race with another login of the same character
            warn!(character = character_id, connection = connection_id, previous, "duplicate enter world");
            return Ok(notice("This character is already in the world"));
        }

        let pseudo_id = match ctx.world.enter(&character).await {
            Ok(pseudo_id) => pseudo_id,
            Err(e) => {
                ctx.connections.unbind_character(connection_id);
                warn!(character = character_id, connection = connection_id, "cannot enter world: {}", e);
                return Ok(notice("Unable to enter the world, try again later"));
            }
        };
        let task = ctx.reconciler.clone().spawn(character.clone());
        if let Some(old) = ctx.reconcile_tasks.insert(connection_id, task) {
            old.abort();
        }

        let status = character.status().await;
        info!("🎮 Connection {} playing {} (#{})", connection_id, character.name, character.id);
        Ok(Some(packets::player_appear(pseudo_id, character.id, &character.name, &status)))
    }
}
