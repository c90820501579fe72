use super::envelope::{Anchor, Envelope};
use crate::entity::Character;
use crate::types::EntityKind;
use async_trait::async_trait;

/// Decides whether an envelope reaches one local observer.
#[async_trait]
pub trait CastNearFilter: Send + Sync + std::fmt::Debug {
    async fn should_deliver(&self, envelope: &Envelope, observer: &Character) -> bool;
}

/// Delivery by on-sight membership.
///
/// Non cast-near envelopes always pass. Cast-near envelopes must match the
/// observer's current map, then:
///
/// - `Character(id)`: the observer is that character or has it in sight
/// - `Mob`/`Pet`/`Drop`/`BabyPet`: the matching on-sight set holds the ID
/// - `Location`: the observer stands within the radius
/// - `None`: everyone on the map
#[derive(Debug, Default, Clone, Copy)]
pub struct SightFilter;

#[async_trait]
impl CastNearFilter for SightFilter {
    async fn should_deliver(&self, envelope: &Envelope, observer: &Character) -> bool {
        if !envelope.cast_near {
            return true;
        }

        let status = observer.status().await;
        if !status.is_active {
            return false;
        }
        if let Some(scope) = envelope.scope {
            if status.map != Some(scope) {
                return false;
            }
        }

        match &envelope.anchor {
            Anchor::None => true,
            Anchor::Character(id) => *id == observer.id || observer.on_sight.contains(EntityKind::Player, *id).await,
            Anchor::Mob { id, .. } => observer.on_sight.contains(EntityKind::Mob, *id).await,
            Anchor::Pet(id) => observer.on_sight.contains(EntityKind::Pet, *id).await,
            Anchor::Drop(id) => observer.on_sight.contains(EntityKind::Drop, *id).await,
            Anchor::BabyPet(id) => observer.on_sight.contains(EntityKind::BabyPet, *id).await,
            Anchor::Location { coordinate, radius } => status.coordinate.distance(coordinate) <= *radius,
        }
    }
}
