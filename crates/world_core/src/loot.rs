//! Loot-grant contract and the drop table behind it.

use crate::entity::{Ai, DroppedItem, WorldEntity};
use crate::error::WorldError;
use crate::registry::WorldRegistry;
use crate::types::{Coordinate, EntityId, EntityKind};
use crate::wire::int_to_bytes;
use async_trait::async_trait;
use dashmap::DashSet;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// First persistent ID given to a rolled drop.
const FIRST_DROP_ID: EntityId = 1_000_000;

/// What a kill produced.
#[derive(Debug, Default, Clone)]
pub struct LootGrant {
    /// Serialized drop list appended to the kill broadcast
    pub fragment: Vec<u8>,
    pub drops: Vec<Arc<DroppedItem>>,
}

#[async_trait]
pub trait LootProvider: Send + Sync + std::fmt::Debug {
    async fn grant(&self, mob: &Ai, killer: Option<EntityId>, at: Coordinate) -> Result<LootGrant, WorldError>;
}

/// Grants nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLoot;

#[async_trait]
impl LootProvider for NoLoot {
    async fn grant(&self, _mob: &Ai, _killer: Option<EntityId>, _at: Coordinate) -> Result<LootGrant, WorldError> {
        Ok(LootGrant::default())
    }
}

fn one() -> u16 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LootEntry {
    pub item_id: i64,
    /// Probability in `[0, 1]`
    pub chance: f64,
    #[serde(default = "one")]
    pub quantity: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LootTable {
    pub kind_id: i32,
    pub entries: Vec<LootEntry>,
}

/// Rolls items per mob kind and places them on the map as drops that expire
/// after `lifetime`.
#[derive(Debug)]
pub struct DropTable {
    registry: Arc<WorldRegistry>,
    tables: HashMap<i32, Vec<LootEntry>>,
    lifetime: Duration,
    next_id: AtomicI32,
    warned: DashSet<i32>,
}

impl DropTable {
    pub fn new(registry: Arc<WorldRegistry>, tables: impl IntoIterator<Item = LootTable>, lifetime: Duration) -> Self {
        Self {
            registry,
            tables: tables.into_iter().map(|t| (t.kind_id, t.entries)).collect(),
            lifetime,
            next_id: AtomicI32::new(FIRST_DROP_ID),
            warned: DashSet::new(),
        }
    }

    fn roll(entries: &[LootEntry]) -> Vec<&LootEntry> {
        let mut rng = rand::thread_rng();
        entries.iter().filter(|e| rng.gen_bool(e.chance.clamp(0.0, 1.0))).collect()
    }

    fn spawn_expiry(&self, drop: &Arc<DroppedItem>) {
        let registry = self.registry.clone();
        let lifetime = self.lifetime;
        let (key, pseudo_id, id) = (drop.key, drop.pseudo_id(), drop.id);
        tokio::spawn(async move {
            tokio::time::sleep(lifetime).await;
            if registry.unregister_entity(key, pseudo_id, id, EntityKind::Drop).await.is_some() {
                debug!(drop = id, map = %key, "drop expired");
            }
        });
    }
}

#[async_trait]
impl LootProvider for DropTable {
    async fn grant(&self, mob: &Ai, killer: Option<EntityId>, at: Coordinate) -> Result<LootGrant, WorldError> {
        let kind = mob.info.kind_id;
        let Some(entries) = self.tables.get(&kind) else {
            if self.warned.insert(kind) {
                warn!(kind, mob = %mob.info.name, "no drop table for mob kind");
            }
            return Ok(LootGrant::default());
        };

        let rolled: Vec<(i64, u16)> = Self::roll(entries).into_iter().map(|e| (e.item_id, e.quantity)).collect();
        let mut grant = LootGrant::default();
        for (item_id, quantity) in rolled {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let drop = DroppedItem::new(id, mob.key, item_id, quantity, at, killer);
            self.registry.register_new(mob.key, WorldEntity::Drop(drop.clone())).await?;
            self.spawn_expiry(&drop);
            grant.drops.push(drop);
        }

        grant.fragment.push(grant.drops.len().min(u8::MAX as usize) as u8);
        for drop in grant.drops.iter().take(u8::MAX as usize) {
            grant.fragment.extend(int_to_bytes(drop.item_id as u64, 8, true));
            grant.fragment.extend(int_to_bytes(drop.quantity as u64, 2, true));
            grant.fragment.extend(int_to_bytes(drop.pseudo_id() as u64, 2, true));
        }
        Ok(grant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ai::test_mob;
    use crate::types::MapKey;

    fn table(kind_id: i32, chance: f64) -> LootTable {
        LootTable {
            kind_id,
            entries: vec![LootEntry { item_id: 500, chance, quantity: 2 }],
        }
    }

    #[tokio::test]
    async fn certain_drop_is_registered_and_expires() {
        let registry = Arc::new(WorldRegistry::new());
        let key = MapKey::new(0, 1);
        let loot = DropTable::new(registry.clone(), [table(1, 1.0)], Duration::from_millis(30));
        let ai = Ai::new(1, key, Arc::new(test_mob(1, 10)), Coordinate::default());

        let grant = loot.grant(&ai, Some(77), Coordinate::new(2.0, 2.0)).await.unwrap();
        assert_eq!(grant.drops.len(), 1);
        assert_eq!(grant.fragment[0], 1);
        let drop = &grant.drops[0];
        assert_eq!(drop.owner, Some(77));
        assert!(registry.lookup(key, drop.pseudo_id()).await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(registry.lookup(key, drop.pseudo_id()).await.is_none());
    }

    #[tokio::test]
    async fn missing_table_grants_nothing() {
        let registry = Arc::new(WorldRegistry::new());
        let loot = DropTable::new(registry, [table(1, 1.0)], Duration::from_secs(60));
        let ai = Ai::new(1, MapKey::new(0, 1), Arc::new(test_mob(2, 10)), Coordinate::default());
        let grant = loot.grant(&ai, None, Coordinate::default()).await.unwrap();
        assert!(grant.drops.is_empty());
        assert!(grant.fragment.is_empty());
    }

    #[tokio::test]
    async fn zero_chance_rolls_empty_fragment() {
        let registry = Arc::new(WorldRegistry::new());
        let loot = DropTable::new(registry, [table(1, 0.0)], Duration::from_secs(60));
        let ai = Ai::new(1, MapKey::new(0, 1), Arc::new(test_mob(1, 10)), Coordinate::default());
        let grant = loot.grant(&ai, None, Coordinate::default()).await.unwrap();
        assert_eq!(grant.fragment, vec![0]);
    }
}
