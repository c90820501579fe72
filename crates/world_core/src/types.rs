//! # Core Type Definitions
//!
//! Fundamental identifiers and value types shared by every part of the world
//! core: persistent entity IDs, per-map pseudo-IDs, map keys, coordinates and
//! factions.
//!
//! ## Key Types
//!
//! - [`EntityId`] - Persistent, server-scoped identity of a world object
//! - [`PseudoId`] - Transient 2-byte identity, unique within one (server, map)
//! - [`MapKey`] - The (server shard, map) pair that scopes a population
//! - [`Coordinate`] - 2D position on a map
//! - [`Faction`] - Allegiance used for aggression and war stone conquest

use serde::{Deserialize, Serialize};
use std::fmt;

/// Persistent identity of a character, mob, pet, drop or placed item.
pub type EntityId = i32;

/// Transient wire identity of an entity inside one (server, map) pair.
///
/// `0` is never allocated and means "no entity" on the wire.
pub type PseudoId = u16;

/// Index of a server shard.
pub type ServerId = u16;

/// Numeric map identifier as configured by the world seed.
pub type MapId = i16;

/// Identifies one map population on one server shard.
///
/// Every registry partition, pseudo-ID pool and cast-near scope is keyed by
/// this pair, so a map with the same `MapId` on two shards never shares state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapKey {
    /// Server shard hosting the map
    pub server: ServerId,
    /// Map identifier
    pub map: MapId,
}

impl MapKey {
    /// Creates a new map key.
    pub fn new(server: ServerId, map: MapId) -> Self {
        Self { server, map }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.server, self.map)
    }
}

/// A position on a map.
///
/// Maps are flat; height is not tracked by the server.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    /// East-west axis
    pub x: f64,
    /// North-south axis
    pub y: f64,
}

impl Coordinate {
    /// Creates a new coordinate.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another coordinate.
    pub fn distance(&self, other: &Coordinate) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Returns the point reached by walking at most `max_step` units toward
    /// `target`. Never overshoots.
    pub fn step_toward(&self, target: &Coordinate, max_step: f64) -> Coordinate {
        let distance = self.distance(target);
        if distance <= max_step || distance == 0.0 {
            return *target;
        }
        let ratio = max_step / distance;
        Coordinate {
            x: self.x + (target.x - self.x) * ratio,
            y: self.y + (target.y - self.y) * ratio,
        }
    }
}

/// Allegiance of a character or mob.
///
/// Mobs in the `Neutral` faction are hostile to every player; faction mobs
/// only attack members of the opposing faction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    #[default]
    Neutral,
    Zhuang,
    Shao,
}

impl Faction {
    /// Wire representation.
    pub fn code(&self) -> u8 {
        match self {
            Faction::Neutral => 0,
            Faction::Zhuang => 1,
            Faction::Shao => 2,
        }
    }

    /// Whether a mob of this faction treats a player of `other` as an enemy.
    pub fn is_hostile_to(&self, other: Faction) -> bool {
        match self {
            Faction::Neutral => true,
            _ => other != *self && other != Faction::Neutral,
        }
    }
}

/// The categories of entities tracked by a character's on-sight sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Mob,
    Npc,
    Pet,
    Drop,
    HousingItem,
    BabyPet,
}

impl EntityKind {
    /// All categories, in reconciliation order.
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Player,
        EntityKind::Mob,
        EntityKind::Npc,
        EntityKind::Pet,
        EntityKind::Drop,
        EntityKind::HousingItem,
        EntityKind::BabyPet,
    ];
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Player => "player",
            EntityKind::Mob => "mob",
            EntityKind::Npc => "npc",
            EntityKind::Pet => "pet",
            EntityKind::Drop => "drop",
            EntityKind::HousingItem => "housing_item",
            EntityKind::BabyPet => "baby_pet",
        };
        f.write_str(name)
    }
}

/// Combat-relevant statistics shared by characters and mobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatStats {
    pub level: u16,
    pub min_attack: u32,
    pub max_attack: u32,
    pub defense: u32,
    pub accuracy: u32,
    /// Chance in `[0, 1]` that a hit is critical
    pub critical_rate: f64,
}

impl Default for CombatStats {
    fn default() -> Self {
        Self {
            level: 1,
            min_attack: 1,
            max_attack: 2,
            defense: 0,
            accuracy: 10,
            critical_rate: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_toward_never_overshoots() {
        let from = Coordinate::new(0.0, 0.0);
        let to = Coordinate::new(3.0, 4.0);
        let next = from.step_toward(&to, 2.5);
        assert!((next.distance(&from) - 2.5).abs() < 1e-9);
        assert_eq!(from.step_toward(&to, 10.0), to);
    }

    #[test]
    fn neutral_mobs_attack_everyone() {
        assert!(Faction::Neutral.is_hostile_to(Faction::Zhuang));
        assert!(Faction::Neutral.is_hostile_to(Faction::Neutral));
        assert!(Faction::Zhuang.is_hostile_to(Faction::Shao));
        assert!(!Faction::Zhuang.is_hostile_to(Faction::Zhuang));
        assert!(!Faction::Shao.is_hostile_to(Faction::Neutral));
    }
}
