//! Target validation and aggression scanning.

use super::AiContext;
use crate::entity::{Ai, AiStatus, Character};
use crate::types::{Coordinate, EntityId, MapKey};
use std::sync::Arc;

/// A character the AI may act on this iteration, with the position it was
/// read at.
#[derive(Debug, Clone)]
pub struct Engagement {
    pub character: Arc<Character>,
    pub at: Coordinate,
}

/// Looks `id` up and checks it is still a live, active character on `key`
/// within `max_distance` of `from`.
pub async fn resolve(ctx: &AiContext, id: EntityId, key: MapKey, from: &Coordinate, max_distance: f64) -> Option<Engagement> {
    let character = ctx.registry.character(id)?;
    let status = character.status().await;
    if !status.is_active || status.is_dead || status.is_invisible || status.map != Some(key) {
        return None;
    }
    if status.coordinate.distance(from) > max_distance {
        return None;
    }
    Some(Engagement {
        character,
        at: status.coordinate,
    })
}

/// Whether the AI has strayed farther from its spawn than it may chase.
pub fn past_leash(ai: &Ai, ctx: &AiContext, status: &AiStatus) -> bool {
    status.coordinate.distance(&ai.spawn) > ctx.config.chase_leash
}

/// Whether the current target is still worth pursuing.
pub async fn revalidate(ai: &Ai, ctx: &AiContext, status: &AiStatus) -> Option<Engagement> {
    let id = status.target_player_id?;
    if past_leash(ai, ctx, status) {
        return None;
    }
    if !ai.on_sight_players.read().await.contains(&id) {
        return None;
    }
    resolve(ctx, id, ai.key, &status.coordinate, ctx.config.perception_radius).await
}

/// Picks a new target.
///
/// Every mob retaliates against its top attacker. Aggressive mobs then scan
/// the characters that see them for the nearest hostile one within aggro
/// range that is not too far above the mob's level. Nothing is picked while
/// the AI is past its leash.
pub async fn acquire(ai: &Ai, ctx: &AiContext, status: &AiStatus) -> Option<Engagement> {
    if past_leash(ai, ctx, status) {
        return None;
    }
    let watchers: Vec<EntityId> = ai.on_sight_players.read().await.iter().copied().collect();

    if let Some(top) = status.top_attacker() {
        if watchers.contains(&top) {
            if let Some(found) = resolve(ctx, top, ai.key, &status.coordinate, ctx.config.perception_radius).await {
                return Some(found);
            }
        }
    }

    if !ai.info.aggressive {
        return None;
    }

    let faction = ai.faction().await;
    let level_cap = ai.info.level().saturating_add(ctx.config.max_aggro_level_gap);
    let mut best: Option<(f64, Engagement)> = None;
    for id in watchers {
        let Some(found) = resolve(ctx, id, ai.key, &status.coordinate, ai.info.aggro_range).await else {
            continue;
        };
        let candidate = found.character.status().await;
        if !faction.is_hostile_to(candidate.faction) || candidate.level() > level_cap {
            continue;
        }
        let distance = found.at.distance(&status.coordinate);
        if best.as_ref().map_or(true, |(d, _)| distance < *d) {
            best = Some((distance, found));
        }
    }
    best.map(|(_, found)| found)
}
