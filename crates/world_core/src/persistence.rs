//! Character persistence contract.
//!
//! Saves are idempotent and happen at checkpoints: map change, disconnect,
//! death and experience grants. Nothing is written per tick.

use crate::entity::CharacterProfile;
use crate::error::WorldError;
use crate::types::EntityId;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[async_trait]
pub trait Persistence: Send + Sync + std::fmt::Debug {
    async fn load_character(&self, id: EntityId) -> Result<Option<CharacterProfile>, WorldError>;
    async fn update_character(&self, profile: &CharacterProfile) -> Result<(), WorldError>;
    async fn delete_character(&self, id: EntityId) -> Result<(), WorldError>;
}

/// Keeps profiles in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    characters: DashMap<EntityId, CharacterProfile>,
    writes: AtomicU64,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds profiles, e.g. from the world seed's test accounts.
    pub fn with_profiles(profiles: impl IntoIterator<Item = CharacterProfile>) -> Self {
        let store = Self::default();
        for profile in profiles {
            store.characters.insert(profile.id, profile);
        }
        store
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn load_character(&self, id: EntityId) -> Result<Option<CharacterProfile>, WorldError> {
        Ok(self.characters.get(&id).map(|p| p.clone()))
    }

    async fn update_character(&self, profile: &CharacterProfile) -> Result<(), WorldError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.characters.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn delete_character(&self, id: EntityId) -> Result<(), WorldError> {
        self.characters.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coordinate;

    #[tokio::test]
    async fn update_is_idempotent() {
        let store = MemoryPersistence::new();
        let profile = CharacterProfile::starter(3, "Yun", 1, Coordinate::default());
        store.update_character(&profile).await.unwrap();
        store.update_character(&profile).await.unwrap();

        assert_eq!(store.load_character(3).await.unwrap(), Some(profile));
        assert_eq!(store.writes(), 2);

        store.delete_character(3).await.unwrap();
        assert_eq!(store.load_character(3).await.unwrap(), None);
    }
}
