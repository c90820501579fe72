//! World seed: the TOML file describing what exists at boot.
//!
//! ```toml
//! [[maps]]
//! id = 1
//! spawn = { x = 0.0, y = 0.0 }
//!
//! [[mobs]]
//! kind_id = 10
//! name = "Forest Wolf"
//! max_hp = 120
//! aggressive = true
//!
//! [[spawns]]
//! kind_id = 10
//! map = 1
//! coordinate = { x = 40.0, y = 12.0 }
//! count = 3
//! spread = 5.0
//! ```

use crate::entity::{Ai, CharacterProfile, HousingItem, HousingItemRecord, MobInfo, NpcPosition, NpcRecord, WorldEntity};
use crate::error::WorldError;
use crate::loot::LootTable;
use crate::registry::WorldRegistry;
use crate::types::{Coordinate, EntityId, MapId, MapKey, ServerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapSeed {
    pub id: MapId,
    /// Where characters enter and respawn
    #[serde(default)]
    pub spawn: Coordinate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnSeed {
    pub kind_id: i32,
    pub map: MapId,
    pub coordinate: Coordinate,
    #[serde(default = "one")]
    pub count: u32,
    /// Radius of the circle multiple spawns are placed on
    #[serde(default)]
    pub spread: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpcSeed {
    pub map: MapId,
    #[serde(flatten)]
    pub npc: NpcRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousingSeed {
    pub map: MapId,
    #[serde(flatten)]
    pub item: HousingItemRecord,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldSeed {
    #[serde(default)]
    pub maps: Vec<MapSeed>,
    #[serde(default)]
    pub mobs: Vec<MobInfo>,
    #[serde(default)]
    pub spawns: Vec<SpawnSeed>,
    #[serde(default)]
    pub npcs: Vec<NpcSeed>,
    #[serde(default)]
    pub housing: Vec<HousingSeed>,
    #[serde(default)]
    pub loot: Vec<LootTable>,
    /// Profiles preloaded into persistence
    #[serde(default)]
    pub characters: Vec<CharacterProfile>,
}

impl WorldSeed {
    pub fn from_toml(text: &str) -> Result<Self, WorldError> {
        toml::from_str(text).map_err(|e| WorldError::Seed(e.to_string()))
    }

    pub async fn load(path: &Path) -> Result<Self, WorldError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| WorldError::Seed(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Map a character enters when its saved map is unknown.
    pub fn default_map(&self) -> MapId {
        self.maps.first().map(|m| m.id).unwrap_or(1)
    }

    pub fn knows_map(&self, map: MapId) -> bool {
        self.maps.is_empty() || self.maps.iter().any(|m| m.id == map)
    }

    pub fn spawn_point(&self, map: MapId) -> Coordinate {
        self.maps
            .iter()
            .find(|m| m.id == map)
            .map(|m| m.spawn)
            .unwrap_or_default()
    }

    /// Registers every seeded mob, NPC and housing item on `server` and
    /// returns the AIs, ready for their behavior loops.
    pub async fn populate(&self, registry: &WorldRegistry, server: ServerId) -> Result<Vec<Arc<Ai>>, WorldError> {
        let kinds: HashMap<i32, Arc<MobInfo>> = self.mobs.iter().map(|m| (m.kind_id, Arc::new(m.clone()))).collect();

        let mut ais = Vec::new();
        let mut next_id: EntityId = 1;
        for spawn in &self.spawns {
            let info = kinds
                .get(&spawn.kind_id)
                .ok_or_else(|| WorldError::Seed(format!("spawn references unknown mob kind {}", spawn.kind_id)))?;
            let key = MapKey::new(server, spawn.map);
            for i in 0..spawn.count {
                let angle = std::f64::consts::TAU * i as f64 / spawn.count as f64;
                let at = Coordinate::new(
                    spawn.coordinate.x + spawn.spread * angle.cos(),
                    spawn.coordinate.y + spawn.spread * angle.sin(),
                );
                let ai = Ai::new(next_id, key, info.clone(), at);
                next_id += 1;
                registry.register_new(key, WorldEntity::Mob(ai.clone())).await?;
                ais.push(ai);
            }
        }

        for seed in &self.npcs {
            let key = MapKey::new(server, seed.map);
            registry.register_new(key, WorldEntity::Npc(NpcPosition::new(seed.npc.clone()))).await?;
        }
        for seed in &self.housing {
            let key = MapKey::new(server, seed.map);
            registry.register_new(key, WorldEntity::Housing(HousingItem::new(seed.item.clone()))).await?;
        }

        info!(
            "🌱 World seed loaded: {} mobs, {} NPCs, {} housing items",
            ais.len(),
            self.npcs.len(),
            self.housing.len()
        );
        Ok(ais)
    }
}
