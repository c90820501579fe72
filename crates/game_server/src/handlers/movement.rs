//! Player movement.
//!
//! Payload: destination x and y (`f32`, little endian), running flag (1 byte).
//!
//! The move is announced at once and the position is committed when the
//! character would arrive. A newer move advances the character's movement
//! token, so the older commit never lands.

use crate::connection::ConnectionId;
use crate::error::ServerError;
use crate::messaging::{HandlerContext, PacketHandler};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{trace, warn};
use world_core::bus::{Anchor, Envelope, EnvelopeType};
use world_core::epoch::{schedule, Epoched};
use world_core::packets;
use world_core::wire::PacketReader;
use world_core::Coordinate;

pub const WALK_SPEED: f64 = 6.0;
pub const RUN_SPEED: f64 = 12.0;
/// Longest single move accepted; farther destinations are clamped.
pub const MAX_MOVE_DISTANCE: f64 = 40.0;

pub struct MoveHandler;

#[async_trait]
impl PacketHandler for MoveHandler {
    fn name(&self) -> &'static str {
        "move"
    }

    async fn handle(&self, ctx: &HandlerContext, connection_id: ConnectionId, payload: &[u8]) -> Result<Option<Vec<u8>>, ServerError> {
        let mut reader = PacketReader::new(payload);
        let x = reader.read_f32()? as f64;
        let y = reader.read_f32()? as f64;
        let running = reader.read_u8()? != 0;
        if !x.is_finite() || !y.is_finite() {
            return Err(ServerError::Protocol(format!("non-finite destination {}, {}", x, y)));
        }

        let Some(character) = ctx.character(connection_id) else {
            return Ok(None);
        };
        let (key, from) = {
            let status = character.lock_status().await;
            match status.map {
                Some(key) if !status.is_dead => (key, status.coordinate),
                _ => return Ok(None),
            }
        };

        let to = from.step_toward(&Coordinate::new(x, y), MAX_MOVE_DISTANCE);
        let distance = from.distance(&to);
        if distance <= f64::EPSILON {
            return Ok(None);
        }
        let speed = if running { RUN_SPEED } else { WALK_SPEED };
        let epoch = character.movement_token().advance();

        let payload = packets::player_move(character.pseudo_id(), &from, &to, running);
        let envelope = Envelope::near(ctx.world.server_id(), EnvelopeType::Movement, key, Anchor::Character(character.id), payload);
        if let Err(e) = ctx.world.bus().publish(envelope).await {
            warn!(character = character.id, "movement publish failed: {}", e);
        }

        let owner = character.clone();
        schedule(character.clone(), epoch, Duration::from_secs_f64(distance / speed), move || async move {
            let mut status = owner.lock_status().await;
            if owner.movement_token().is_current(epoch) && status.map == Some(key) && !status.is_dead {
                status.coordinate = to;
            }
        });
        trace!(character = character.id, epoch, x = to.x, y = to.y, "player move");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::Harness;
    use world_core::wire::PacketBuilder;

    fn move_payload(x: f32, y: f32, running: bool) -> Vec<u8> {
        let mut b = PacketBuilder::new(0);
        b.put_f32(x).put_f32(y).put_u8(running as u8);
        let framed = b.finish();
        framed[5..framed.len() - 2].to_vec()
    }

    #[tokio::test]
    async fn move_commits_after_travel_time() {
        let harness = Harness::new().await;
        let character = harness.enter(harness.connection_id, 1, "Walker").await;

        MoveHandler
            .handle(&harness.ctx, harness.connection_id, &move_payload(0.0, 1.2, true))
            .await
            .unwrap();
        assert_eq!(character.coordinate().await, Coordinate::new(0.0, 0.0));
        tokio::time::sleep(Duration::from_millis(300)).await;
        let at = character.coordinate().await;
        assert!((at.y - 1.2).abs() < 1e-4);
    }

    #[tokio::test]
    async fn newer_move_supersedes_pending_one() {
        let harness = Harness::new().await;
        let character = harness.enter(harness.connection_id, 1, "Walker").await;

        MoveHandler
            .handle(&harness.ctx, harness.connection_id, &move_payload(0.0, 12.0, false))
            .await
            .unwrap();
        MoveHandler
            .handle(&harness.ctx, harness.connection_id, &move_payload(0.6, 0.0, false))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let at = character.coordinate().await;
        assert!((at.x - 0.6).abs() < 1e-4);
        assert!(at.y.abs() < 1e-9);
    }

    #[tokio::test]
    async fn commit_waiting_on_status_lock_checks_token_again() {
        let harness = Harness::new().await;
        let character = harness.enter(harness.connection_id, 1, "Walker").await;

        MoveHandler
            .handle(&harness.ctx, harness.connection_id, &move_payload(0.0, 1.2, true))
            .await
            .unwrap();
        {
            let _guard = character.lock_status().await;
            tokio::time::sleep(Duration::from_millis(200)).await;
            character.movement_token().advance();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(character.coordinate().await, Coordinate::new(0.0, 0.0));
    }

    #[tokio::test]
    async fn move_without_character_is_ignored() {
        let harness = Harness::new().await;
        let response = MoveHandler
            .handle(&harness.ctx, harness.connection_id, &move_payload(1.0, 1.0, false))
            .await
            .unwrap();
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn short_payload_is_rejected() {
        let harness = Harness::new().await;
        assert!(MoveHandler.handle(&harness.ctx, harness.connection_id, &[0, 0]).await.is_err());
    }
}
