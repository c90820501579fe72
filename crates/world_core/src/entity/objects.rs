//! Pets, drops, housing items and NPC positions.
//!
//! These carry little mutable state: they are placed once and later
//! removed.

use crate::types::{Coordinate, EntityId, MapKey, PseudoId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct PetStatus {
    pub coordinate: Coordinate,
    pub hp: u32,
    pub max_hp: u32,
}

/// A summoned pet or baby pet.
#[derive(Debug)]
pub struct Pet {
    pub id: EntityId,
    pub owner_id: EntityId,
    pub name: String,
    pub level: u16,
    /// Baby pets are tracked in their own on-sight category
    pub is_baby: bool,
    status: Mutex<PetStatus>,
    pseudo_id: AtomicU16,
}

impl Pet {
    pub fn new(
        id: EntityId,
        owner_id: EntityId,
        name: impl Into<String>,
        level: u16,
        is_baby: bool,
        coordinate: Coordinate,
        max_hp: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            owner_id,
            name: name.into(),
            level,
            is_baby,
            status: Mutex::new(PetStatus {
                coordinate,
                hp: max_hp,
                max_hp,
            }),
            pseudo_id: AtomicU16::new(0),
        })
    }

    pub fn pseudo_id(&self) -> PseudoId {
        self.pseudo_id.load(Ordering::Acquire)
    }

    pub(crate) fn assign_pseudo_id(&self, pseudo_id: PseudoId) {
        self.pseudo_id.store(pseudo_id, Ordering::Release);
    }

    pub async fn status(&self) -> PetStatus {
        self.status.lock().await.clone()
    }
}

/// Items lying on the ground after a kill.
#[derive(Debug)]
pub struct DroppedItem {
    pub id: EntityId,
    pub key: MapKey,
    pub item_id: i64,
    pub quantity: u16,
    pub coordinate: Coordinate,
    /// Character allowed to pick the drop up first
    pub owner: Option<EntityId>,
    pseudo_id: AtomicU16,
}

impl DroppedItem {
    pub fn new(
        id: EntityId,
        key: MapKey,
        item_id: i64,
        quantity: u16,
        coordinate: Coordinate,
        owner: Option<EntityId>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            key,
            item_id,
            quantity,
            coordinate,
            owner,
            pseudo_id: AtomicU16::new(0),
        })
    }

    pub fn pseudo_id(&self) -> PseudoId {
        self.pseudo_id.load(Ordering::Acquire)
    }

    pub(crate) fn assign_pseudo_id(&self, pseudo_id: PseudoId) {
        self.pseudo_id.store(pseudo_id, Ordering::Release);
    }
}

/// Furniture placed by a character.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousingItemRecord {
    pub id: EntityId,
    pub owner_id: EntityId,
    pub item_id: i64,
    pub coordinate: Coordinate,
}

#[derive(Debug)]
pub struct HousingItem {
    pub record: HousingItemRecord,
    pseudo_id: AtomicU16,
}

impl HousingItem {
    pub fn new(record: HousingItemRecord) -> Arc<Self> {
        Arc::new(Self {
            record,
            pseudo_id: AtomicU16::new(0),
        })
    }

    pub fn pseudo_id(&self) -> PseudoId {
        self.pseudo_id.load(Ordering::Acquire)
    }

    pub(crate) fn assign_pseudo_id(&self, pseudo_id: PseudoId) {
        self.pseudo_id.store(pseudo_id, Ordering::Release);
    }
}

/// Where an NPC stands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpcRecord {
    pub id: EntityId,
    /// Template of the NPC, shown to the client
    pub npc_id: i32,
    pub name: String,
    pub coordinate: Coordinate,
}

#[derive(Debug)]
pub struct NpcPosition {
    pub record: NpcRecord,
    pseudo_id: AtomicU16,
}

impl NpcPosition {
    pub fn new(record: NpcRecord) -> Arc<Self> {
        Arc::new(Self {
            record,
            pseudo_id: AtomicU16::new(0),
        })
    }

    pub fn pseudo_id(&self) -> PseudoId {
        self.pseudo_id.load(Ordering::Acquire)
    }

    pub(crate) fn assign_pseudo_id(&self, pseudo_id: PseudoId) {
        self.pseudo_id.store(pseudo_id, Ordering::Release);
    }
}
