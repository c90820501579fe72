//! Epoch-guarded AI movement.

use super::AiContext;
use crate::bus::{Anchor, Envelope, EnvelopeType};
use crate::entity::{Ai, BehaviorState};
use crate::epoch::{schedule, Epoched};
use crate::packets;
use crate::types::Coordinate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// Starts a move from `from` toward `destination`, at most `max_step` units,
/// at `speed` units per second. The position is applied when the move
/// completes, unless a later move or death advanced the token first.
pub async fn issue_move(ai: &Arc<Ai>, ctx: &AiContext, from: Coordinate, destination: Coordinate, max_step: f64, speed: f64, state: BehaviorState) {
    let next = from.step_toward(&destination, max_step);
    let distance = from.distance(&next);
    if distance <= f64::EPSILON || speed <= 0.0 {
        return;
    }

    let epoch = ai.movement_token().advance();
    {
        let mut status = ai.lock_status().await;
        if status.is_dead {
            return;
        }
        status.target_location = next;
        status.is_moving = true;
        status.state = state;
    }

    let payload = packets::mob_move(ai.pseudo_id(), &from, &next, speed);
    let anchor = Anchor::Mob {
        id: ai.id,
        pseudo_id: ai.pseudo_id(),
    };
    if let Err(e) = ctx
        .combat
        .bus()
        .publish(Envelope::near(ctx.combat.server_id(), EnvelopeType::Movement, ai.key, anchor, payload))
        .await
    {
        warn!(ai = ai.id, "movement publish failed: {}", e);
    }

    let owner = ai.clone();
    let travel = Duration::from_secs_f64(distance / speed);
    schedule(ai.clone(), epoch, travel, move || async move {
        let mut status = owner.lock_status().await;
        if owner.movement_token().is_current(epoch) && !status.is_dead {
            status.coordinate = next;
            status.is_moving = false;
        }
    });
    trace!(ai = ai.id, epoch, x = next.x, y = next.y, "move issued");
}

/// Cancels any pending move, leaving the AI where it currently stands.
pub async fn halt(ai: &Ai) {
    ai.movement_token().advance();
    let mut status = ai.lock_status().await;
    status.is_moving = false;
    status.target_location = status.coordinate;
}
