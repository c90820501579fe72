//! Population of a single map.
use super::pool::PseudoIdPool;
use crate::entity::WorldEntity;
use crate::error::WorldError;
use crate::types::{EntityId, EntityKind, MapKey, PseudoId};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug)]
struct Population {
    entities: HashMap<PseudoId, WorldEntity>,
    pool: PseudoIdPool,
}

/// Pseudo-ID table of one (server, map) pair.
///
/// The entity table and the pseudo-ID pool sit behind the same lock, so an
/// ID is only returned to the pool after its entry is gone.
#[derive(Debug)]
pub struct MapPartition {
    key: MapKey,
    population: RwLock<Population>,
}

impl MapPartition {
    pub fn new(key: MapKey, capacity: u16) -> Self {
        Self {
            key,
            population: RwLock::new(Population {
                entities: HashMap::new(),
                pool: PseudoIdPool::with_capacity(capacity),
            }),
        }
    }

    pub fn key(&self) -> MapKey {
        self.key
    }

    /// Allocates a pseudo-ID and registers `entity` under it.
    pub async fn insert(&self, entity: WorldEntity) -> Result<PseudoId, WorldError> {
        let mut population = self.population.write().await;
        let pseudo_id = population
            .pool
            .allocate()
            .ok_or(WorldError::PseudoIdExhausted(self.key))?;
        entity.as_entity().assign_pseudo_id(pseudo_id);
        population.entities.insert(pseudo_id, entity);
        Ok(pseudo_id)
    }

    /// Registers `entity` under a caller-chosen pseudo-ID.
    pub async fn insert_at(&self, pseudo_id: PseudoId, entity: WorldEntity) -> Result<(), WorldError> {
        let mut population = self.population.write().await;
        if !population.pool.reserve(pseudo_id) {
            return Err(WorldError::PseudoIdOccupied {
                key: self.key,
                pseudo_id,
            });
        }
        entity.as_entity().assign_pseudo_id(pseudo_id);
        population.entities.insert(pseudo_id, entity);
        Ok(())
    }

    pub async fn get(&self, pseudo_id: PseudoId) -> Option<WorldEntity> {
        self.population.read().await.entities.get(&pseudo_id).cloned()
    }

    /// Removes the entry and releases its ID.
    pub async fn remove(&self, pseudo_id: PseudoId) -> Option<WorldEntity> {
        let mut population = self.population.write().await;
        let entity = population.entities.remove(&pseudo_id)?;
        population.pool.release(pseudo_id);
        Some(entity)
    }

    /// Removes the entry only if it still belongs to `id`. A stale caller
    /// must not evict whoever reused the pseudo-ID.
    pub async fn remove_if(&self, pseudo_id: PseudoId, id: EntityId, kind: EntityKind) -> Option<WorldEntity> {
        let mut population = self.population.write().await;
        match population.entities.get(&pseudo_id) {
            Some(entity) if entity.id() == id && entity.kind() == kind => {}
            _ => return None,
        }
        let entity = population.entities.remove(&pseudo_id)?;
        population.pool.release(pseudo_id);
        Some(entity)
    }

    /// Copy of the table. Callers read entity state after the lock is gone.
    pub async fn entities(&self) -> Vec<WorldEntity> {
        self.population.read().await.entities.values().cloned().collect()
    }

    pub async fn entities_of(&self, kind: EntityKind) -> Vec<WorldEntity> {
        self.population
            .read()
            .await
            .entities
            .values()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.population.read().await.entities.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
