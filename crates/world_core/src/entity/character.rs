//! Connected player characters.

use crate::combat::AttackQueue;
use crate::entity::OnSight;
use crate::epoch::{Epoched, MovementToken};
use crate::types::{CombatStats, Coordinate, EntityId, Faction, MapId, MapKey, PseudoId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// The persisted form of a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub faction: Faction,
    pub map: MapId,
    pub coordinate: Coordinate,
    pub hp: u32,
    pub max_hp: u32,
    #[serde(default)]
    pub chi: u32,
    #[serde(default)]
    pub max_chi: u32,
    #[serde(default)]
    pub stats: CombatStats,
    #[serde(default)]
    pub exp: u64,
    #[serde(default)]
    pub war_points: u32,
}

impl CharacterProfile {
    /// A fresh level 1 character, used when persistence has no record.
    pub fn starter(id: EntityId, name: impl Into<String>, map: MapId, coordinate: Coordinate) -> Self {
        Self {
            id,
            name: name.into(),
            faction: Faction::Neutral,
            map,
            coordinate,
            hp: 100,
            max_hp: 100,
            chi: 50,
            max_chi: 50,
            stats: CombatStats::default(),
            exp: 0,
            war_points: 0,
        }
    }
}

/// Mutable state of a character, guarded by one mutex.
#[derive(Debug, Clone)]
pub struct CharacterStatus {
    /// Map currently joined, `None` between maps and after disconnect
    pub map: Option<MapKey>,
    /// Last joined map, kept for persistence checkpoints
    pub last_map: MapId,
    pub coordinate: Coordinate,
    pub hp: u32,
    pub max_hp: u32,
    pub chi: u32,
    pub max_chi: u32,
    pub faction: Faction,
    pub stats: CombatStats,
    pub exp: u64,
    pub war_points: u32,
    pub buffs: Vec<u16>,
    pub is_dead: bool,
    pub is_mounted: bool,
    pub is_invisible: bool,
    /// Cleared on disconnect; reconciliation and AI targeting stop at once
    pub is_active: bool,
}

impl CharacterStatus {
    pub fn level(&self) -> u16 {
        self.stats.level
    }

    /// Whether other players should see this character at all.
    pub fn is_visible_to_players(&self) -> bool {
        !self.is_mounted && !self.is_invisible
    }
}

/// A player character in the world.
#[derive(Debug)]
pub struct Character {
    pub id: EntityId,
    pub name: String,
    pub on_sight: OnSight,
    status: Mutex<CharacterStatus>,
    attacks: Mutex<AttackQueue>,
    movement: MovementToken,
    pseudo_id: AtomicU16,
}

impl Character {
    pub fn new(profile: CharacterProfile) -> Arc<Self> {
        let max_hp = profile.max_hp.max(1);
        let status = CharacterStatus {
            map: None,
            last_map: profile.map,
            coordinate: profile.coordinate,
            hp: profile.hp.min(max_hp),
            max_hp,
            chi: profile.chi.min(profile.max_chi),
            max_chi: profile.max_chi,
            faction: profile.faction,
            stats: profile.stats,
            exp: profile.exp,
            war_points: profile.war_points,
            buffs: Vec::new(),
            is_dead: profile.hp == 0,
            is_mounted: false,
            is_invisible: false,
            is_active: true,
        };

        Arc::new(Self {
            id: profile.id,
            name: profile.name,
            on_sight: OnSight::new(),
            status: Mutex::new(status),
            attacks: Mutex::new(AttackQueue::default()),
            movement: MovementToken::new(),
            pseudo_id: AtomicU16::new(0),
        })
    }

    /// Pseudo-ID on the current map, `0` when not on a map.
    pub fn pseudo_id(&self) -> PseudoId {
        self.pseudo_id.load(Ordering::Acquire)
    }

    pub(crate) fn assign_pseudo_id(&self, pseudo_id: PseudoId) {
        self.pseudo_id.store(pseudo_id, Ordering::Release);
    }

    /// Locks the status. Do not hold the guard across socket writes.
    pub async fn lock_status(&self) -> MutexGuard<'_, CharacterStatus> {
        self.status.lock().await
    }

    /// A copy of the current status.
    pub async fn status(&self) -> CharacterStatus {
        self.status.lock().await.clone()
    }

    pub async fn current_map(&self) -> Option<MapKey> {
        self.status.lock().await.map
    }

    pub async fn coordinate(&self) -> Coordinate {
        self.status.lock().await.coordinate
    }

    pub async fn is_active(&self) -> bool {
        self.status.lock().await.is_active
    }

    pub async fn set_active(&self, active: bool) {
        self.status.lock().await.is_active = active;
    }

    /// Pending attacks for the two-packet attack sequence.
    pub fn attack_queue(&self) -> &Mutex<AttackQueue> {
        &self.attacks
    }

    /// Persistable snapshot.
    pub async fn profile(&self) -> CharacterProfile {
        let status = self.status.lock().await;
        CharacterProfile {
            id: self.id,
            name: self.name.clone(),
            faction: status.faction,
            map: status.map.map(|k| k.map).unwrap_or(status.last_map),
            coordinate: status.coordinate,
            hp: status.hp,
            max_hp: status.max_hp,
            chi: status.chi,
            max_chi: status.max_chi,
            stats: status.stats,
            exp: status.exp,
            war_points: status.war_points,
        }
    }
}

impl Epoched for Character {
    fn movement_token(&self) -> &MovementToken {
        &self.movement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_character_clamps_loaded_hp() {
        let mut profile = CharacterProfile::starter(1, "Lin", 1, Coordinate::new(1.0, 2.0));
        profile.hp = 500;
        let character = Character::new(profile);
        let status = character.status().await;
        assert_eq!(status.hp, status.max_hp);
        assert!(status.map.is_none());
        assert_eq!(character.pseudo_id(), 0);
    }

    #[tokio::test]
    async fn profile_falls_back_to_last_map() {
        let character = Character::new(CharacterProfile::starter(2, "Mei", 7, Coordinate::default()));
        assert_eq!(character.profile().await.map, 7);

        character.lock_status().await.map = Some(MapKey::new(0, 9));
        assert_eq!(character.profile().await.map, 9);
    }
}
