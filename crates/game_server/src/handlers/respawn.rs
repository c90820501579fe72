//! Respawn after death. Empty payload.

use crate::connection::ConnectionId;
use crate::error::ServerError;
use crate::messaging::{HandlerContext, PacketHandler};
use async_trait::async_trait;
use tracing::info;
use world_core::packets;

pub struct RespawnHandler;

#[async_trait]
impl PacketHandler for RespawnHandler {
    fn name(&self) -> &'static str {
        "respawn"
    }

    async fn handle(&self, ctx: &HandlerContext, connection_id: ConnectionId, _payload: &[u8]) -> Result<Option<Vec<u8>>, ServerError> {
        let Some(character) = ctx.character(connection_id) else {
            return Ok(None);
        };
        if !character.status().await.is_dead {
            return Ok(None);
        }

        ctx.world.respawn(&character).await?;
        let status = character.status().await;
        info!("✨ {} respawned", character.name);
        Ok(Some(packets::hp_update(status.hp, status.max_hp, status.chi, status.max_chi)))
    }
}
