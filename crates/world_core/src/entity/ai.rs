//! Server-controlled mobs.

use crate::entity::WarStone;
use crate::epoch::{Epoched, MovementToken};
use crate::types::{CombatStats, Coordinate, EntityId, Faction, MapKey, PseudoId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard, RwLock};

fn default_walking_speed() -> f64 {
    2.0
}
fn default_running_speed() -> f64 {
    4.0
}
fn default_attack_range() -> f64 {
    3.0
}
fn default_aggro_range() -> f64 {
    12.0
}
fn default_respawn_secs() -> u64 {
    30
}

/// Static description of a mob kind, shared by every spawn of that kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobInfo {
    pub kind_id: i32,
    pub name: String,
    pub max_hp: u32,
    #[serde(default)]
    pub max_chi: u32,
    #[serde(default)]
    pub stats: CombatStats,
    #[serde(default = "default_walking_speed")]
    pub walking_speed: f64,
    #[serde(default = "default_running_speed")]
    pub running_speed: f64,
    #[serde(default = "default_attack_range")]
    pub attack_range: f64,
    #[serde(default = "default_aggro_range")]
    pub aggro_range: f64,
    /// Aggressive mobs attack on sight; passive ones only retaliate
    #[serde(default)]
    pub aggressive: bool,
    #[serde(default)]
    pub faction: Faction,
    #[serde(default)]
    pub exp: u64,
    #[serde(default)]
    pub war_points: u32,
    /// `0` disables respawn; the AI is removed after death
    #[serde(default = "default_respawn_secs")]
    pub respawn_secs: u64,
    #[serde(default)]
    pub is_boss: bool,
    #[serde(default)]
    pub is_war_stone: bool,
}

impl MobInfo {
    pub fn level(&self) -> u16 {
        self.stats.level
    }
}

/// States of the behavior loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BehaviorState {
    #[default]
    Idle,
    Scanning,
    Chasing,
    Attacking,
    Dead,
    Respawning,
}

/// Mutable state of an AI, guarded by its mutex. Every HP change goes
/// through [`crate::combat::CombatResolver`].
#[derive(Debug, Clone)]
pub struct AiStatus {
    pub hp: u32,
    pub chi: u32,
    pub coordinate: Coordinate,
    pub target_location: Coordinate,
    pub is_dead: bool,
    pub is_moving: bool,
    pub can_attack: bool,
    pub target_player_id: Option<EntityId>,
    pub state: BehaviorState,
    /// Damage dealt per attacker since the last respawn
    pub aggro: HashMap<EntityId, u64>,
    pub died_at: Option<Instant>,
}

impl AiStatus {
    /// Attacker with the most accumulated damage.
    pub fn top_attacker(&self) -> Option<EntityId> {
        self.aggro
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(id, _)| *id)
    }
}

/// A live AI on one map of one server.
#[derive(Debug)]
pub struct Ai {
    pub id: EntityId,
    pub key: MapKey,
    pub info: Arc<MobInfo>,
    pub spawn: Coordinate,
    /// Characters that currently display this AI
    pub on_sight_players: RwLock<HashSet<EntityId>>,
    status: Mutex<AiStatus>,
    movement: MovementToken,
    pseudo_id: AtomicU16,
    removed: AtomicBool,
    war_stone: Option<WarStone>,
}

impl Ai {
    pub fn new(id: EntityId, key: MapKey, info: Arc<MobInfo>, spawn: Coordinate) -> Arc<Self> {
        let status = AiStatus {
            hp: info.max_hp,
            chi: info.max_chi,
            coordinate: spawn,
            target_location: spawn,
            is_dead: false,
            is_moving: false,
            can_attack: true,
            target_player_id: None,
            state: BehaviorState::Idle,
            aggro: HashMap::new(),
            died_at: None,
        };
        let war_stone = info.is_war_stone.then(|| WarStone::new(info.faction));

        Arc::new(Self {
            id,
            key,
            info,
            spawn,
            on_sight_players: RwLock::new(HashSet::new()),
            status: Mutex::new(status),
            movement: MovementToken::new(),
            pseudo_id: AtomicU16::new(0),
            removed: AtomicBool::new(false),
            war_stone,
        })
    }

    pub fn pseudo_id(&self) -> PseudoId {
        self.pseudo_id.load(Ordering::Acquire)
    }

    pub(crate) fn assign_pseudo_id(&self, pseudo_id: PseudoId) {
        self.pseudo_id.store(pseudo_id, Ordering::Release);
    }

    pub fn max_hp(&self) -> u32 {
        self.info.max_hp
    }

    pub async fn lock_status(&self) -> MutexGuard<'_, AiStatus> {
        self.status.lock().await
    }

    pub async fn status(&self) -> AiStatus {
        self.status.lock().await.clone()
    }

    pub async fn coordinate(&self) -> Coordinate {
        self.status.lock().await.coordinate
    }

    pub async fn is_dead(&self) -> bool {
        self.status.lock().await.is_dead
    }

    /// Current allegiance; a war stone follows its conquest owner.
    pub async fn faction(&self) -> Faction {
        match &self.war_stone {
            Some(stone) => stone.owner().await,
            None => self.info.faction,
        }
    }

    pub fn war_stone(&self) -> Option<&WarStone> {
        self.war_stone.as_ref()
    }

    pub fn is_war_stone(&self) -> bool {
        self.war_stone.is_some()
    }

    /// Marks the AI as gone from the world; its loop exits on the next step.
    pub fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }
}

impl Epoched for Ai {
    fn movement_token(&self) -> &MovementToken {
        &self.movement
    }
}

#[cfg(test)]
pub(crate) fn test_mob(kind_id: i32, max_hp: u32) -> MobInfo {
    MobInfo {
        kind_id,
        name: format!("mob-{kind_id}"),
        max_hp,
        max_chi: 0,
        stats: CombatStats::default(),
        walking_speed: default_walking_speed(),
        running_speed: default_running_speed(),
        attack_range: default_attack_range(),
        aggro_range: default_aggro_range(),
        aggressive: true,
        faction: Faction::Neutral,
        exp: 10,
        war_points: 0,
        respawn_secs: 1,
        is_boss: false,
        is_war_stone: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mob_info_defaults_from_toml() {
        let info: MobInfo = toml::from_str(
            r#"
            kind_id = 4
            name = "Wolf"
            max_hp = 80
            "#,
        )
        .unwrap();
        assert_eq!(info.respawn_secs, 30);
        assert!(!info.aggressive);
        assert_eq!(info.faction, Faction::Neutral);
    }

    #[tokio::test]
    async fn top_attacker_is_highest_damage() {
        let ai = Ai::new(1, MapKey::new(0, 1), Arc::new(test_mob(1, 100)), Coordinate::default());
        {
            let mut status = ai.lock_status().await;
            status.aggro.insert(10, 30);
            status.aggro.insert(11, 45);
        }
        assert_eq!(ai.status().await.top_attacker(), Some(11));
    }

    #[tokio::test]
    async fn war_stone_faction_follows_owner() {
        let mut info = test_mob(2, 1000);
        info.is_war_stone = true;
        info.faction = Faction::Shao;
        let ai = Ai::new(2, MapKey::new(0, 1), Arc::new(info), Coordinate::default());
        assert!(ai.is_war_stone());
        assert_eq!(ai.faction().await, Faction::Shao);
    }
}
