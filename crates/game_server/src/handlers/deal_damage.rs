//! Second half of the attack sequence: apply everything queued since the
//! last flush. Empty payload.

use crate::connection::ConnectionId;
use crate::error::ServerError;
use crate::messaging::{HandlerContext, PacketHandler};
use async_trait::async_trait;
use world_core::packets;

pub struct DealDamageHandler;

#[async_trait]
impl PacketHandler for DealDamageHandler {
    fn name(&self) -> &'static str {
        "deal_damage"
    }

    async fn handle(&self, ctx: &HandlerContext, connection_id: ConnectionId, _payload: &[u8]) -> Result<Option<Vec<u8>>, ServerError> {
        let Some(character) = ctx.character(connection_id) else {
            return Ok(None);
        };
        let report = ctx.world.combat().flush_attacks(&character).await;
        if report.applied == 0 {
            return Ok(None);
        }
        // refresh the attacker's own bars
        let status = character.status().await;
        Ok(Some(packets::hp_update(status.hp, status.max_hp, status.chi, status.max_chi)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::attack::AttackMobHandler;
    use crate::handlers::testing::Harness;
    use world_core::bus::EnvelopeType;
    use world_core::combat::Target;

    #[tokio::test]
    async fn flush_applies_and_empties_queue() {
        let harness = Harness::new().await;
        let mut bus = harness.ctx.world.bus().subscribe();
        let character = harness.enter(harness.connection_id, 1, "Archer").await;
        let ai = harness.ctx.world.registry().ais()[0].clone();

        let mut payload = ai.pseudo_id().to_be_bytes().to_vec();
        payload.push(0);
        AttackMobHandler.handle(&harness.ctx, harness.connection_id, &payload).await.unwrap();
        let response = DealDamageHandler
            .handle(&harness.ctx, harness.connection_id, &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response[4], packets::opcodes::HP_UPDATE);

        assert!(character.attack_queue().lock().await.is_empty());
        assert!(ai.status().await.hp < 30);
        let envelope = bus.recv().await.unwrap();
        assert_eq!(envelope.kind, EnvelopeType::Attack);
    }

    #[tokio::test]
    async fn duplicate_entries_apply_once() {
        let harness = Harness::new().await;
        let character = harness.enter(harness.connection_id, 1, "Archer").await;
        let ai = harness.ctx.world.registry().ais()[0].clone();
        {
            let mut queue = character.attack_queue().lock().await;
            for damage in [5, 7] {
                queue.push_target(Target {
                    damage,
                    ai: ai.clone(),
                    is_skill: false,
                });
            }
        }
        DealDamageHandler.handle(&harness.ctx, harness.connection_id, &[]).await.unwrap();
        assert_eq!(ai.status().await.hp, 25);
    }

    #[tokio::test]
    async fn empty_queue_sends_nothing() {
        let harness = Harness::new().await;
        harness.enter(harness.connection_id, 1, "Archer").await;
        let response = DealDamageHandler.handle(&harness.ctx, harness.connection_id, &[]).await.unwrap();
        assert!(response.is_none());
    }
}
