//! Per-character record of what the client currently displays.
//!
//! Each category has its own lock. Visibility passes scan and mutate the
//! categories independently, and broadcast filtering reads them from other
//! tasks, so one lock per character would serialize unrelated work.

use crate::types::{EntityId, EntityKind, PseudoId};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// One category: persistent ID of the seen entity → pseudo-ID it was shown with.
pub type SightSet = RwLock<HashMap<EntityId, PseudoId>>;

/// The on-sight sets of a character.
///
/// An ID is present in a set exactly when an appear packet for it has been
/// sent to the owning client and no disappear packet has followed.
#[derive(Debug, Default)]
pub struct OnSight {
    pub players: SightSet,
    pub mobs: SightSet,
    pub npcs: SightSet,
    pub pets: SightSet,
    pub drops: SightSet,
    pub housing_items: SightSet,
    pub baby_pets: SightSet,
}

impl OnSight {
    pub fn new() -> Self {
        Self::default()
    }

    /// The set backing a category.
    pub fn set(&self, kind: EntityKind) -> &SightSet {
        match kind {
            EntityKind::Player => &self.players,
            EntityKind::Mob => &self.mobs,
            EntityKind::Npc => &self.npcs,
            EntityKind::Pet => &self.pets,
            EntityKind::Drop => &self.drops,
            EntityKind::HousingItem => &self.housing_items,
            EntityKind::BabyPet => &self.baby_pets,
        }
    }

    pub async fn contains(&self, kind: EntityKind, id: EntityId) -> bool {
        self.set(kind).read().await.contains_key(&id)
    }

    /// Records an entity as shown. Returns `false` if it was already present
    /// with the same pseudo-ID.
    pub async fn insert(&self, kind: EntityKind, id: EntityId, pseudo_id: PseudoId) -> bool {
        self.set(kind).write().await.insert(id, pseudo_id) != Some(pseudo_id)
    }

    pub async fn remove(&self, kind: EntityKind, id: EntityId) -> Option<PseudoId> {
        self.set(kind).write().await.remove(&id)
    }

    /// Copy of one category, taken under its read lock.
    pub async fn snapshot(&self, kind: EntityKind) -> HashMap<EntityId, PseudoId> {
        self.set(kind).read().await.clone()
    }

    pub async fn len(&self, kind: EntityKind) -> usize {
        self.set(kind).read().await.len()
    }

    /// Empties every category and returns the mob IDs that were in sight, so
    /// the caller can drop the reciprocal registrations.
    pub async fn clear(&self) -> Vec<EntityId> {
        let mut mobs = Vec::new();
        for kind in EntityKind::ALL {
            let mut set = self.set(kind).write().await;
            if kind == EntityKind::Mob {
                mobs.extend(set.keys().copied());
            }
            set.clear();
        }
        mobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn categories_are_independent() {
        let sight = OnSight::new();
        assert!(sight.insert(EntityKind::Mob, 7, 3).await);
        assert!(!sight.insert(EntityKind::Mob, 7, 3).await);
        assert!(sight.contains(EntityKind::Mob, 7).await);
        assert!(!sight.contains(EntityKind::Pet, 7).await);

        // a new pseudo-ID for the same entity counts as a change
        assert!(sight.insert(EntityKind::Mob, 7, 4).await);
        assert_eq!(sight.remove(EntityKind::Mob, 7).await, Some(4));
    }

    #[tokio::test]
    async fn clear_reports_mobs() {
        let sight = OnSight::new();
        sight.insert(EntityKind::Mob, 1, 10).await;
        sight.insert(EntityKind::Mob, 2, 11).await;
        sight.insert(EntityKind::Drop, 3, 12).await;

        let mut mobs = sight.clear().await;
        mobs.sort();
        assert_eq!(mobs, vec![1, 2]);
        for kind in EntityKind::ALL {
            assert_eq!(sight.len(kind).await, 0);
        }
    }
}
