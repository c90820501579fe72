//! First half of the attack sequence: roll damage and queue it.
//!
//! Payload for both opcodes: target pseudo-ID (2 bytes, big endian), skill
//! flag (1 byte). Nothing is applied until the deal-damage packet arrives.

use super::{notice, PLAYER_ATTACK_RANGE};
use crate::connection::ConnectionId;
use crate::error::ServerError;
use crate::messaging::{HandlerContext, PacketHandler};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{trace, warn};
use world_core::combat::{calculate_damage, PlayerTarget, Target, TargetClass};
use world_core::entity::{Character, CharacterStatus, WorldEntity};
use world_core::wire::PacketReader;
use world_core::{CombatStats, Faction, MapKey, PseudoId};

struct AttackRequest {
    target: PseudoId,
    is_skill: bool,
}

impl AttackRequest {
    fn parse(payload: &[u8]) -> Result<Self, ServerError> {
        let mut reader = PacketReader::new(payload);
        Ok(Self {
            target: reader.read_int(2, false)? as PseudoId,
            is_skill: reader.read_u8()? != 0,
        })
    }
}

/// The attacker, if it is alive on a map.
async fn live_attacker(ctx: &HandlerContext, connection_id: ConnectionId) -> Option<(Arc<Character>, CharacterStatus, MapKey)> {
    let character = ctx.character(connection_id)?;
    let status = character.status().await;
    if status.is_dead || !status.is_active {
        return None;
    }
    let key = status.map?;
    Some((character, status, key))
}

/// Rolls damage; invalid attacker stats are logged and treated as no attack.
fn roll(attacker_id: i32, attacker: &CombatStats, defender: &CombatStats, class: TargetClass) -> Option<u64> {
    let mut rng = rand::thread_rng();
    match calculate_damage(attacker, defender, class, &mut rng) {
        Ok(roll) => Some(roll.damage),
        Err(e) => {
            warn!(character = attacker_id, "damage roll failed: {}", e);
            None
        }
    }
}

pub struct AttackMobHandler;

#[async_trait]
impl PacketHandler for AttackMobHandler {
    fn name(&self) -> &'static str {
        "attack_mob"
    }

    async fn handle(&self, ctx: &HandlerContext, connection_id: ConnectionId, payload: &[u8]) -> Result<Option<Vec<u8>>, ServerError> {
        let request = AttackRequest::parse(payload)?;
        let Some((character, status, key)) = live_attacker(ctx, connection_id).await else {
            return Ok(None);
        };

        let Some(WorldEntity::Mob(ai)) = ctx.world.registry().lookup(key, request.target).await else {
            trace!(character = character.id, pseudo_id = request.target, "attack on unknown mob");
            return Ok(None);
        };
        let target_at = {
            let ai_status = ai.lock_status().await;
            if ai_status.is_dead {
                return Ok(None);
            }
            ai_status.coordinate
        };
        if status.coordinate.distance(&target_at) > PLAYER_ATTACK_RANGE {
            return Ok(notice("Target is out of range"));
        }

        let class = if ai.is_war_stone() {
            if status.faction == Faction::Neutral || ai.faction().await == status.faction {
                return Ok(notice("You cannot attack this war stone"));
            }
            TargetClass::WarStone
        } else if ai.info.is_boss {
            TargetClass::Boss
        } else {
            TargetClass::Mob
        };

        let Some(damage) = roll(character.id, &status.stats, &ai.info.stats, class) else {
            return Ok(None);
        };
        character.attack_queue().lock().await.push_target(Target {
            damage,
            ai,
            is_skill: request.is_skill,
        });
        trace!(character = character.id, pseudo_id = request.target, damage, "mob attack queued");
        Ok(None)
    }
}

pub struct AttackPlayerHandler;

#[async_trait]
impl PacketHandler for AttackPlayerHandler {
    fn name(&self) -> &'static str {
        "attack_player"
    }

    async fn handle(&self, ctx: &HandlerContext, connection_id: ConnectionId, payload: &[u8]) -> Result<Option<Vec<u8>>, ServerError> {
        let request = AttackRequest::parse(payload)?;
        let Some((character, status, key)) = live_attacker(ctx, connection_id).await else {
            return Ok(None);
        };

        let Some(WorldEntity::Player(enemy)) = ctx.world.registry().lookup(key, request.target).await else {
            return Ok(None);
        };
        if enemy.id == character.id {
            return Ok(None);
        }
        let enemy_status = enemy.status().await;
        if enemy_status.is_dead || !enemy_status.is_active {
            return Ok(None);
        }
        if status.faction == Faction::Neutral || !status.faction.is_hostile_to(enemy_status.faction) {
            return Ok(notice("You cannot attack that player"));
        }
        if status.coordinate.distance(&enemy_status.coordinate) > PLAYER_ATTACK_RANGE {
            return Ok(notice("Target is out of range"));
        }

        let Some(damage) = roll(character.id, &status.stats, &enemy_status.stats, TargetClass::Player) else {
            return Ok(None);
        };
        character.attack_queue().lock().await.push_player_target(PlayerTarget {
            damage,
            enemy,
            is_skill: request.is_skill,
        });
        Ok(None)
    }
}
