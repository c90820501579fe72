//! # AI Behavior Loop
//!
//! One long-lived task per live AI, stepping a small state machine on a
//! fixed interval:
//!
//! ```text
//! Idle → Scanning → Chasing → Attacking → Dead → Respawning → Idle
//! ```
//!
//! Every step starts from a fresh copy of the AI's status, so deaths and
//! removals made by other tasks are seen on the next iteration. Pending
//! movement is cancelled by advancing the AI's movement token, never by
//! aborting tasks.

pub mod movement;
pub mod targeting;

use crate::bus::{Anchor, Envelope, EnvelopeType};
use crate::combat::{calculate_damage, Attacker, CombatResolver, DamageOutcome, TargetClass};
use crate::config::WorldConfig;
use crate::entity::{Ai, AiStatus, BehaviorState};
use crate::epoch::Epoched;
use crate::packets;
use crate::registry::WorldRegistry;
use crate::types::EntityKind;
use std::sync::Arc;
use std::time::Duration;
use targeting::Engagement;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Shared services handed to every behavior loop.
#[derive(Debug, Clone)]
pub struct AiContext {
    pub registry: Arc<WorldRegistry>,
    pub combat: Arc<CombatResolver>,
    pub config: WorldConfig,
}

/// Whether the loop keeps running after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Exit,
}

/// Spawns the behavior loop of `ai`. It ends when the AI is removed from the
/// world or `shutdown` fires.
pub fn spawn_behavior(ai: Arc<Ai>, ctx: Arc<AiContext>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ctx.config.ai_tick());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if step(&ai, &ctx).await == Step::Exit {
                        break;
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        debug!(ai = ai.id, "behavior loop stopped");
    })
}

/// One iteration of the state machine.
pub async fn step(ai: &Arc<Ai>, ctx: &AiContext) -> Step {
    if ai.is_removed() {
        return Step::Exit;
    }
    let status = ai.status().await;
    if status.is_dead {
        return step_dead(ai, ctx, &status).await;
    }
    if ai.is_war_stone() {
        step_war_stone(ai, ctx).await;
        return Step::Continue;
    }

    if targeting::past_leash(ai, ctx, &status) {
        give_up(ai, ctx, &status).await;
        return Step::Continue;
    }

    let engagement = match targeting::revalidate(ai, ctx, &status).await {
        Some(found) => Some(found),
        None => {
            if status.target_player_id.is_some() {
                disengage(ai).await;
            }
            set_state(ai, BehaviorState::Scanning).await;
            targeting::acquire(ai, ctx, &status).await
        }
    };

    let Some(engagement) = engagement else {
        return_home(ai, ctx, &status).await;
        return Step::Continue;
    };

    {
        let mut current = ai.lock_status().await;
        if current.is_dead {
            return Step::Continue;
        }
        current.target_player_id = Some(engagement.character.id);
    }

    if status.coordinate.distance(&engagement.at) <= ai.info.attack_range {
        attack(ai, ctx, &engagement).await;
    } else if !status.is_moving {
        let tick = ctx.config.ai_tick().as_secs_f64();
        let reach = status.coordinate.distance(&engagement.at) - ai.info.attack_range * 0.8;
        let max_step = (ai.info.running_speed * tick).min(reach.max(0.0));
        movement::issue_move(ai, ctx, status.coordinate, engagement.at, max_step, ai.info.running_speed, BehaviorState::Chasing).await;
    }
    Step::Continue
}

async fn set_state(ai: &Ai, state: BehaviorState) {
    let mut status = ai.lock_status().await;
    if !status.is_dead {
        status.state = state;
    }
}

async fn disengage(ai: &Ai) {
    movement::halt(ai).await;
    let mut status = ai.lock_status().await;
    status.target_player_id = None;
    if !status.is_dead {
        status.state = BehaviorState::Idle;
    }
}

/// Drops the target and the aggro table, then heads for the spawn point.
/// A walk home already under way is left running.
async fn give_up(ai: &Arc<Ai>, ctx: &AiContext, status: &AiStatus) {
    if status.target_player_id.is_some() {
        disengage(ai).await;
        debug!(ai = ai.id, "leash reached, giving up the chase");
    }
    ai.lock_status().await.aggro.clear();
    let current = ai.status().await;
    return_home(ai, ctx, &current).await;
}

async fn return_home(ai: &Arc<Ai>, ctx: &AiContext, status: &AiStatus) {
    if status.is_moving || status.coordinate.distance(&ai.spawn) <= ai.info.attack_range {
        set_state(ai, BehaviorState::Idle).await;
        return;
    }
    // walking home also forgets who hurt it
    ai.lock_status().await.aggro.clear();
    let tick = ctx.config.ai_tick().as_secs_f64();
    movement::issue_move(ai, ctx, status.coordinate, ai.spawn, ai.info.walking_speed * tick, ai.info.walking_speed, BehaviorState::Idle).await;
}

async fn attack(ai: &Arc<Ai>, ctx: &AiContext, engagement: &Engagement) {
    {
        let mut status = ai.lock_status().await;
        if status.is_dead || !status.can_attack {
            return;
        }
        status.can_attack = false;
        status.state = BehaviorState::Attacking;
    }
    if ai.status().await.is_moving {
        movement::halt(ai).await;
    }

    let cooldown = ctx.config.attack_cooldown();
    let owner = ai.clone();
    tokio::spawn(async move {
        tokio::time::sleep(cooldown).await;
        owner.lock_status().await.can_attack = true;
    });

    let defender = engagement.character.status().await.stats;
    let roll = {
        let mut rng = rand::thread_rng();
        calculate_damage(&ai.info.stats, &defender, TargetClass::Player, &mut rng)
    };
    let roll = match roll {
        Ok(roll) => roll,
        Err(e) => {
            warn!(ai = ai.id, kind = ai.info.kind_id, "cannot roll damage: {}", e);
            return;
        }
    };

    let target = &engagement.character;
    let target_pseudo = target.pseudo_id();
    let outcome = ctx
        .combat
        .deal_damage_to_character(target, Attacker::Mob(ai.id), roll.damage, false)
        .await;
    if outcome == DamageOutcome::Ignored {
        return;
    }

    let payload = packets::mob_attack(ai.pseudo_id(), target_pseudo, roll.damage, outcome.remaining_hp());
    let anchor = Anchor::Mob {
        id: ai.id,
        pseudo_id: ai.pseudo_id(),
    };
    if let Err(e) = ctx
        .combat
        .bus()
        .publish(Envelope::near(ctx.combat.server_id(), EnvelopeType::Attack, ai.key, anchor, payload))
        .await
    {
        warn!(ai = ai.id, "attack publish failed: {}", e);
    }

    if outcome == DamageOutcome::Killed {
        disengage(ai).await;
    }
}

async fn step_dead(ai: &Arc<Ai>, ctx: &AiContext, status: &AiStatus) -> Step {
    if ai.info.respawn_secs == 0 {
        ai.mark_removed();
        ctx.registry
            .unregister_entity(ai.key, ai.pseudo_id(), ai.id, EntityKind::Mob)
            .await;
        debug!(ai = ai.id, "mob removed after death");
        return Step::Exit;
    }

    if status.state == BehaviorState::Respawning {
        let mut current = ai.lock_status().await;
        if current.is_dead && current.state == BehaviorState::Respawning {
            current.is_dead = false;
            current.state = BehaviorState::Idle;
            info!(ai = ai.id, mob = %ai.info.name, map = %ai.key, "🔄 Mob respawned");
        }
        return Step::Continue;
    }

    let respawn_after = Duration::from_secs(ai.info.respawn_secs);
    if status.died_at.map_or(false, |at| at.elapsed() < respawn_after) {
        return Step::Continue;
    }

    // reset while still dead, so observers of the corpse see it leave
    // before observers of the spawn point see it appear
    ai.movement_token().advance();
    let mut current = ai.lock_status().await;
    if !current.is_dead {
        return Step::Continue;
    }
    current.state = BehaviorState::Respawning;
    current.hp = ai.info.max_hp;
    current.chi = ai.info.max_chi;
    current.coordinate = ai.spawn;
    current.target_location = ai.spawn;
    current.is_moving = false;
    current.can_attack = true;
    current.target_player_id = None;
    current.aggro.clear();
    current.died_at = None;
    Step::Continue
}

async fn step_war_stone(ai: &Arc<Ai>, ctx: &AiContext) {
    let Some(stone) = ai.war_stone() else {
        return;
    };
    let Some(owner) = stone.tick_conquest().await else {
        return;
    };

    info!(ai = ai.id, map = %ai.key, owner = ?owner, "🏳️ War stone captured");
    let server = ctx.combat.server_id();
    let status = ai.status().await;
    let snapshot = stone.snapshot().await;
    let envelopes = [
        Envelope::near(
            server,
            EnvelopeType::Conquest,
            ai.key,
            Anchor::Mob {
                id: ai.id,
                pseudo_id: ai.pseudo_id(),
            },
            packets::stone_appear(ai, &status, &snapshot),
        ),
        Envelope::near(
            server,
            EnvelopeType::Notice,
            ai.key,
            Anchor::None,
            packets::notice(&format!("{} has been captured by {:?}", ai.info.name, owner)),
        ),
    ];
    for envelope in envelopes {
        if let Err(e) = ctx.combat.bus().publish(envelope).await {
            warn!(ai = ai.id, "conquest publish failed: {}", e);
        }
    }
}
