//! # Spatial Registry
//!
//! Per-server, per-map lookup of live entities by pseudo-ID.
//!
//! The registry is partitioned by [`MapKey`]; each partition has its own
//! lock, so registrations on one map never block lookups on another. Two
//! secondary indexes map persistent IDs to characters and AIs for callers
//! that only know the persistent ID (AI targeting, bus filtering, handlers).
//!
//! Nothing here is global: a [`WorldRegistry`] is created by the server and
//! passed to every component that needs it.

pub mod partition;
pub mod pool;

pub use partition::MapPartition;
pub use pool::PseudoIdPool;

use crate::entity::{Ai, Character, WorldEntity};
use crate::error::WorldError;
use crate::types::{Coordinate, EntityId, EntityKind, MapKey, PseudoId};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace};

/// Counts reported by the server tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub maps: usize,
    pub characters: usize,
    pub ais: usize,
}

#[derive(Debug)]
pub struct WorldRegistry {
    partitions: DashMap<MapKey, Arc<MapPartition>>,
    characters: DashMap<EntityId, Arc<Character>>,
    ais: DashMap<EntityId, Arc<Ai>>,
    pool_capacity: u16,
}

impl Default for WorldRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldRegistry {
    pub fn new() -> Self {
        Self::with_pool_capacity(u16::MAX)
    }

    /// A registry whose maps hold at most `capacity` entities each.
    pub fn with_pool_capacity(capacity: u16) -> Self {
        Self {
            partitions: DashMap::new(),
            characters: DashMap::new(),
            ais: DashMap::new(),
            pool_capacity: capacity,
        }
    }

    /// The partition of `key`, created on first use.
    pub fn partition(&self, key: MapKey) -> Arc<MapPartition> {
        self.partitions
            .entry(key)
            .or_insert_with(|| Arc::new(MapPartition::new(key, self.pool_capacity)))
            .clone()
    }

    fn existing(&self, key: MapKey) -> Option<Arc<MapPartition>> {
        self.partitions.get(&key).map(|p| p.clone())
    }

    fn index(&self, entity: &WorldEntity) {
        match entity {
            WorldEntity::Player(c) => {
                self.characters.insert(c.id, c.clone());
            }
            WorldEntity::Mob(a) => {
                self.ais.insert(a.id, a.clone());
            }
            _ => {}
        }
    }

    fn unindex(&self, entity: &WorldEntity) {
        match entity {
            WorldEntity::Player(c) => {
                self.characters.remove_if(&c.id, |_, v| Arc::ptr_eq(v, c));
            }
            WorldEntity::Mob(a) => {
                self.ais.remove_if(&a.id, |_, v| Arc::ptr_eq(v, a));
            }
            _ => {}
        }
    }

    /// Registers `entity` under an explicit pseudo-ID.
    pub async fn register(&self, key: MapKey, pseudo_id: PseudoId, entity: WorldEntity) -> Result<(), WorldError> {
        self.partition(key).insert_at(pseudo_id, entity.clone()).await?;
        self.index(&entity);
        trace!(map = %key, pseudo_id, id = entity.id(), kind = %entity.kind(), "registered");
        Ok(())
    }

    /// Registers `entity` under a freshly allocated pseudo-ID.
    pub async fn register_new(&self, key: MapKey, entity: WorldEntity) -> Result<PseudoId, WorldError> {
        let pseudo_id = self.partition(key).insert(entity.clone()).await?;
        self.index(&entity);
        trace!(map = %key, pseudo_id, id = entity.id(), kind = %entity.kind(), "registered");
        Ok(pseudo_id)
    }

    pub async fn lookup(&self, key: MapKey, pseudo_id: PseudoId) -> Option<WorldEntity> {
        self.existing(key)?.get(pseudo_id).await
    }

    /// Removes the entry and returns its pseudo-ID to the pool.
    pub async fn unregister(&self, key: MapKey, pseudo_id: PseudoId) -> Option<WorldEntity> {
        let entity = self.existing(key)?.remove(pseudo_id).await?;
        self.unindex(&entity);
        trace!(map = %key, pseudo_id, id = entity.id(), "unregistered");
        Some(entity)
    }

    /// Like [`unregister`](Self::unregister), but only if the pseudo-ID is
    /// still held by the given entity.
    pub async fn unregister_entity(&self, key: MapKey, pseudo_id: PseudoId, id: EntityId, kind: EntityKind) -> Option<WorldEntity> {
        let entity = self.existing(key)?.remove_if(pseudo_id, id, kind).await?;
        self.unindex(&entity);
        Some(entity)
    }

    pub fn character(&self, id: EntityId) -> Option<Arc<Character>> {
        self.characters.get(&id).map(|c| c.clone())
    }

    pub fn ai(&self, id: EntityId) -> Option<Arc<Ai>> {
        self.ais.get(&id).map(|a| a.clone())
    }

    pub fn ais(&self) -> Vec<Arc<Ai>> {
        self.ais.iter().map(|a| a.value().clone()).collect()
    }

    /// Entities of `kind` within `radius` of `center`, with the position
    /// each was read at. The partition lock is released before any entity
    /// lock is taken.
    pub async fn nearby(&self, key: MapKey, center: Coordinate, radius: f64, kind: EntityKind) -> Vec<(WorldEntity, Coordinate)> {
        let Some(partition) = self.existing(key) else {
            return Vec::new();
        };
        let candidates = partition.entities_of(kind).await;
        let mut found = Vec::with_capacity(candidates.len());
        for entity in candidates {
            let at = entity.coordinate().await;
            if at.distance(&center) <= radius {
                found.push((entity, at));
            }
        }
        found
    }

    /// Places `character` on a map: leaves the previous one, clears its
    /// on-sight sets and registers it under a new pseudo-ID.
    pub async fn enter_map(&self, character: &Arc<Character>, key: MapKey, at: Coordinate) -> Result<PseudoId, WorldError> {
        self.leave_map(character).await;

        let pseudo_id = self.register_new(key, WorldEntity::Player(character.clone())).await?;
        {
            let mut status = character.lock_status().await;
            status.map = Some(key);
            status.last_map = key.map;
            status.coordinate = at;
            status.is_active = true;
        }
        debug!(character = character.id, map = %key, pseudo_id, "entered map");
        Ok(pseudo_id)
    }

    /// Takes `character` off its map, releases its pseudo-ID and drops every
    /// reciprocal registration. Returns the map it left.
    pub async fn leave_map(&self, character: &Arc<Character>) -> Option<MapKey> {
        let key = character.lock_status().await.map.take();

        let seen_mobs = character.on_sight.clear().await;
        for id in seen_mobs {
            if let Some(ai) = self.ai(id) {
                ai.on_sight_players.write().await.remove(&character.id);
            }
        }

        let key = key?;
        let pseudo_id = character.pseudo_id();
        self.unregister_entity(key, pseudo_id, character.id, EntityKind::Player).await;
        character.assign_pseudo_id(0);

        // an interrupted visibility pass can leave a one-sided entry behind
        if let Some(partition) = self.existing(key) {
            for entity in partition.entities_of(EntityKind::Mob).await {
                if let Some(ai) = entity.as_ai() {
                    ai.on_sight_players.write().await.remove(&character.id);
                    if let Some(stone) = ai.war_stone() {
                        stone.forget(character.id).await;
                    }
                }
            }
        }

        debug!(character = character.id, map = %key, pseudo_id, "left map");
        Some(key)
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            maps: self.partitions.len(),
            characters: self.characters.len(),
            ais: self.ais.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ai::test_mob;
    use crate::entity::{CharacterProfile, DroppedItem};
    use std::collections::HashSet;

    fn character(id: EntityId) -> Arc<Character> {
        Character::new(CharacterProfile::starter(id, format!("c{id}"), 1, Coordinate::default()))
    }

    #[tokio::test]
    async fn lookup_and_unregister() {
        let registry = WorldRegistry::new();
        let key = MapKey::new(0, 1);
        let ai = Ai::new(9, key, Arc::new(test_mob(1, 50)), Coordinate::default());

        let pseudo = registry.register_new(key, WorldEntity::Mob(ai.clone())).await.unwrap();
        assert_eq!(ai.pseudo_id(), pseudo);
        assert_eq!(registry.lookup(key, pseudo).await.unwrap().id(), 9);
        assert!(registry.ai(9).is_some());

        // other shard, same map id
        assert!(registry.lookup(MapKey::new(1, 1), pseudo).await.is_none());

        assert!(registry.unregister(key, pseudo).await.is_some());
        assert!(registry.lookup(key, pseudo).await.is_none());
        assert!(registry.ai(9).is_none());
    }

    #[tokio::test]
    async fn explicit_register_rejects_occupied_id() {
        let registry = WorldRegistry::new();
        let key = MapKey::new(0, 1);
        let d1 = DroppedItem::new(1, key, 100, 1, Coordinate::default(), None);
        let d2 = DroppedItem::new(2, key, 100, 1, Coordinate::default(), None);
        registry.register(key, 40, WorldEntity::Drop(d1)).await.unwrap();
        let err = registry.register(key, 40, WorldEntity::Drop(d2)).await.unwrap_err();
        assert!(matches!(err, WorldError::PseudoIdOccupied { pseudo_id: 40, .. }));
    }

    #[tokio::test]
    async fn exhausted_pool_is_an_error() {
        let registry = WorldRegistry::with_pool_capacity(1);
        let key = MapKey::new(0, 2);
        registry.enter_map(&character(1), key, Coordinate::default()).await.unwrap();
        let err = registry.enter_map(&character(2), key, Coordinate::default()).await.unwrap_err();
        assert!(matches!(err, WorldError::PseudoIdExhausted(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_entries_get_unique_ids() {
        let registry = Arc::new(WorldRegistry::new());
        let key = MapKey::new(0, 1);

        let mut handles = Vec::new();
        for id in 0..200 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.enter_map(&character(id), key, Coordinate::default()).await.unwrap()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            let pseudo = handle.await.unwrap();
            assert_ne!(pseudo, 0);
            assert!(seen.insert(pseudo), "pseudo-ID {pseudo} handed out twice");
        }
        assert_eq!(registry.stats().characters, 200);
    }

    #[tokio::test]
    async fn leave_map_clears_reciprocal_entries() {
        let registry = WorldRegistry::new();
        let key = MapKey::new(0, 1);
        let ai = Ai::new(3, key, Arc::new(test_mob(1, 50)), Coordinate::default());
        registry.register_new(key, WorldEntity::Mob(ai.clone())).await.unwrap();

        let c = character(1);
        registry.enter_map(&c, key, Coordinate::default()).await.unwrap();
        c.on_sight.insert(EntityKind::Mob, ai.id, ai.pseudo_id()).await;
        ai.on_sight_players.write().await.insert(c.id);

        assert_eq!(registry.leave_map(&c).await, Some(key));
        assert!(!ai.on_sight_players.read().await.contains(&c.id));
        assert_eq!(c.on_sight.len(EntityKind::Mob).await, 0);
        assert_eq!(c.pseudo_id(), 0);
        assert!(registry.character(1).is_none());
        assert_eq!(registry.leave_map(&c).await, None);
    }

    #[tokio::test]
    async fn map_change_releases_old_id() {
        let registry = WorldRegistry::new();
        let a = MapKey::new(0, 1);
        let b = MapKey::new(0, 2);
        let c = character(1);

        let first = registry.enter_map(&c, a, Coordinate::default()).await.unwrap();
        registry.enter_map(&c, b, Coordinate::default()).await.unwrap();
        assert!(registry.lookup(a, first).await.is_none());
        assert_eq!(c.current_map().await, Some(b));

        let nearby = registry.nearby(b, Coordinate::default(), 1.0, EntityKind::Player).await;
        assert_eq!(nearby.len(), 1);
    }
}
