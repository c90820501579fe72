//! Contestable war stones.
//!
//! A stone keeps two proximity lists, refreshed by every visibility pass of
//! a nearby character, and a conquest meter in `[-CONQUEST_LIMIT,
//! CONQUEST_LIMIT]`. Positive progress favors Zhuang, negative favors Shao.

use crate::types::{EntityId, Faction};
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::Mutex;

/// Progress needed to flip a stone.
pub const CONQUEST_LIMIT: i32 = 100;
/// Largest change of the meter in one tick.
pub const CONQUEST_STEP: i32 = 5;

#[derive(Debug, Default)]
struct StoneLists {
    nearby_zhuang: HashSet<EntityId>,
    nearby_shao: HashSet<EntityId>,
    progress: i32,
    owner: Faction,
}

/// Copy of a stone's state for packets and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WarStoneSnapshot {
    pub owner: Faction,
    pub progress: i32,
    pub zhuang: usize,
    pub shao: usize,
}

#[derive(Debug)]
pub struct WarStone {
    lists: Mutex<StoneLists>,
}

impl WarStone {
    pub fn new(owner: Faction) -> Self {
        Self {
            lists: Mutex::new(StoneLists {
                owner,
                ..Default::default()
            }),
        }
    }

    /// Places `character` in the list of its faction when it is alive and in
    /// range, and removes it from both lists otherwise.
    pub async fn update_presence(&self, character: EntityId, faction: Faction, alive_in_range: bool) {
        let mut lists = self.lists.lock().await;
        lists.nearby_zhuang.remove(&character);
        lists.nearby_shao.remove(&character);
        if !alive_in_range {
            return;
        }
        match faction {
            Faction::Zhuang => {
                lists.nearby_zhuang.insert(character);
            }
            Faction::Shao => {
                lists.nearby_shao.insert(character);
            }
            Faction::Neutral => {}
        }
    }

    pub async fn forget(&self, character: EntityId) {
        let mut lists = self.lists.lock().await;
        lists.nearby_zhuang.remove(&character);
        lists.nearby_shao.remove(&character);
    }

    /// Advances the meter by the head-count difference and returns the new
    /// owner when the stone changes hands.
    pub async fn tick_conquest(&self) -> Option<Faction> {
        let mut lists = self.lists.lock().await;
        let delta = (lists.nearby_zhuang.len() as i32 - lists.nearby_shao.len() as i32)
            .clamp(-CONQUEST_STEP, CONQUEST_STEP);
        lists.progress = (lists.progress + delta).clamp(-CONQUEST_LIMIT, CONQUEST_LIMIT);

        let winner = if lists.progress >= CONQUEST_LIMIT {
            Faction::Zhuang
        } else if lists.progress <= -CONQUEST_LIMIT {
            Faction::Shao
        } else {
            return None;
        };
        if lists.owner == winner {
            return None;
        }
        lists.owner = winner;
        lists.progress = 0;
        Some(winner)
    }

    pub async fn owner(&self) -> Faction {
        self.lists.lock().await.owner
    }

    pub async fn snapshot(&self) -> WarStoneSnapshot {
        let lists = self.lists.lock().await;
        WarStoneSnapshot {
            owner: lists.owner,
            progress: lists.progress,
            zhuang: lists.nearby_zhuang.len(),
            shao: lists.nearby_shao.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn presence_follows_faction_and_liveness() {
        let stone = WarStone::new(Faction::Neutral);
        stone.update_presence(1, Faction::Zhuang, true).await;
        stone.update_presence(2, Faction::Shao, true).await;
        stone.update_presence(3, Faction::Neutral, true).await;
        let snap = stone.snapshot().await;
        assert_eq!((snap.zhuang, snap.shao), (1, 1));

        // dead or out of range
        stone.update_presence(2, Faction::Shao, false).await;
        assert_eq!(stone.snapshot().await.shao, 0);
    }

    #[tokio::test]
    async fn majority_flips_stone_once() {
        let stone = WarStone::new(Faction::Shao);
        for id in 0..8 {
            stone.update_presence(id, Faction::Zhuang, true).await;
        }

        let mut flips = Vec::new();
        for _ in 0..(CONQUEST_LIMIT / CONQUEST_STEP) {
            if let Some(owner) = stone.tick_conquest().await {
                flips.push(owner);
            }
        }
        assert_eq!(flips, vec![Faction::Zhuang]);
        assert_eq!(stone.owner().await, Faction::Zhuang);
        assert_eq!(stone.snapshot().await.progress, 0);
    }

    #[tokio::test]
    async fn balanced_presence_holds_progress() {
        let stone = WarStone::new(Faction::Neutral);
        stone.update_presence(1, Faction::Zhuang, true).await;
        stone.update_presence(2, Faction::Shao, true).await;
        assert_eq!(stone.tick_conquest().await, None);
        assert_eq!(stone.snapshot().await.progress, 0);
    }
}
