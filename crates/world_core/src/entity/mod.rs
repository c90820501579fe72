//! # Entity State
//!
//! Mutable records for everything that lives on a map. Each record owns its
//! own locks; nothing here holds a registry lock.
//!
//! [`WorldEntity`] is the closed set of things a map partition can hold, and
//! the [`Entity`] trait is the common view the registry and visibility passes
//! use to read identity and position without matching on the variant.

pub mod ai;
pub mod character;
pub mod objects;
pub mod onsight;
pub mod warstone;

pub use ai::{Ai, AiStatus, BehaviorState, MobInfo};
pub use character::{Character, CharacterProfile, CharacterStatus};
pub use objects::{DroppedItem, HousingItem, HousingItemRecord, NpcPosition, NpcRecord, Pet, PetStatus};
pub use onsight::OnSight;
pub use warstone::{WarStone, WarStoneSnapshot};

use crate::types::{Coordinate, EntityId, EntityKind, PseudoId};
use async_trait::async_trait;
use std::sync::Arc;

/// Identity and position of a registered object.
#[async_trait]
pub trait Entity: Send + Sync {
    fn id(&self) -> EntityId;
    fn kind(&self) -> EntityKind;
    fn pseudo_id(&self) -> PseudoId;
    /// Called by the registry under the partition lock.
    fn assign_pseudo_id(&self, pseudo_id: PseudoId);
    async fn coordinate(&self) -> Coordinate;
}

#[async_trait]
impl Entity for Character {
    fn id(&self) -> EntityId {
        self.id
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Player
    }
    fn pseudo_id(&self) -> PseudoId {
        Character::pseudo_id(self)
    }
    fn assign_pseudo_id(&self, pseudo_id: PseudoId) {
        Character::assign_pseudo_id(self, pseudo_id)
    }
    async fn coordinate(&self) -> Coordinate {
        Character::coordinate(self).await
    }
}

#[async_trait]
impl Entity for Ai {
    fn id(&self) -> EntityId {
        self.id
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Mob
    }
    fn pseudo_id(&self) -> PseudoId {
        Ai::pseudo_id(self)
    }
    fn assign_pseudo_id(&self, pseudo_id: PseudoId) {
        Ai::assign_pseudo_id(self, pseudo_id)
    }
    async fn coordinate(&self) -> Coordinate {
        Ai::coordinate(self).await
    }
}

#[async_trait]
impl Entity for Pet {
    fn id(&self) -> EntityId {
        self.id
    }
    fn kind(&self) -> EntityKind {
        if self.is_baby {
            EntityKind::BabyPet
        } else {
            EntityKind::Pet
        }
    }
    fn pseudo_id(&self) -> PseudoId {
        Pet::pseudo_id(self)
    }
    fn assign_pseudo_id(&self, pseudo_id: PseudoId) {
        Pet::assign_pseudo_id(self, pseudo_id)
    }
    async fn coordinate(&self) -> Coordinate {
        self.status().await.coordinate
    }
}

#[async_trait]
impl Entity for DroppedItem {
    fn id(&self) -> EntityId {
        self.id
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Drop
    }
    fn pseudo_id(&self) -> PseudoId {
        DroppedItem::pseudo_id(self)
    }
    fn assign_pseudo_id(&self, pseudo_id: PseudoId) {
        DroppedItem::assign_pseudo_id(self, pseudo_id)
    }
    async fn coordinate(&self) -> Coordinate {
        self.coordinate
    }
}

#[async_trait]
impl Entity for HousingItem {
    fn id(&self) -> EntityId {
        self.record.id
    }
    fn kind(&self) -> EntityKind {
        EntityKind::HousingItem
    }
    fn pseudo_id(&self) -> PseudoId {
        HousingItem::pseudo_id(self)
    }
    fn assign_pseudo_id(&self, pseudo_id: PseudoId) {
        HousingItem::assign_pseudo_id(self, pseudo_id)
    }
    async fn coordinate(&self) -> Coordinate {
        self.record.coordinate
    }
}

#[async_trait]
impl Entity for NpcPosition {
    fn id(&self) -> EntityId {
        self.record.id
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Npc
    }
    fn pseudo_id(&self) -> PseudoId {
        NpcPosition::pseudo_id(self)
    }
    fn assign_pseudo_id(&self, pseudo_id: PseudoId) {
        NpcPosition::assign_pseudo_id(self, pseudo_id)
    }
    async fn coordinate(&self) -> Coordinate {
        self.record.coordinate
    }
}

/// Everything a map partition can hold.
#[derive(Debug, Clone)]
pub enum WorldEntity {
    Player(Arc<Character>),
    Mob(Arc<Ai>),
    Npc(Arc<NpcPosition>),
    Pet(Arc<Pet>),
    Drop(Arc<DroppedItem>),
    Housing(Arc<HousingItem>),
}

impl WorldEntity {
    pub fn as_entity(&self) -> &dyn Entity {
        match self {
            WorldEntity::Player(c) => c.as_ref(),
            WorldEntity::Mob(a) => a.as_ref(),
            WorldEntity::Npc(n) => n.as_ref(),
            WorldEntity::Pet(p) => p.as_ref(),
            WorldEntity::Drop(d) => d.as_ref(),
            WorldEntity::Housing(h) => h.as_ref(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.as_entity().id()
    }

    pub fn kind(&self) -> EntityKind {
        self.as_entity().kind()
    }

    pub fn pseudo_id(&self) -> PseudoId {
        self.as_entity().pseudo_id()
    }

    pub async fn coordinate(&self) -> Coordinate {
        self.as_entity().coordinate().await
    }

    pub fn as_character(&self) -> Option<&Arc<Character>> {
        match self {
            WorldEntity::Player(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_ai(&self) -> Option<&Arc<Ai>> {
        match self {
            WorldEntity::Mob(a) => Some(a),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn baby_pets_have_their_own_kind() {
        let pet = Pet::new(5, 1, "Pup", 1, true, Coordinate::new(3.0, 4.0), 10);
        let entity = WorldEntity::Pet(pet);
        assert_eq!(entity.kind(), EntityKind::BabyPet);
        assert_eq!(entity.coordinate().await, Coordinate::new(3.0, 4.0));
    }
}
