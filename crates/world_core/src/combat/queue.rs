use crate::entity::{Ai, Character};
use std::collections::HashSet;
use std::sync::Arc;

/// Queued damage against a mob.
#[derive(Debug, Clone)]
pub struct Target {
    pub damage: u64,
    pub ai: Arc<Ai>,
    pub is_skill: bool,
}

/// Queued damage against another player.
#[derive(Debug, Clone)]
pub struct PlayerTarget {
    pub damage: u64,
    pub enemy: Arc<Character>,
    pub is_skill: bool,
}

/// Attacks announced by the client and not yet applied.
///
/// The "attack" packet pushes entries, the "deal damage" packet drains them.
#[derive(Debug, Default)]
pub struct AttackQueue {
    targets: Vec<Target>,
    player_targets: Vec<PlayerTarget>,
}

impl AttackQueue {
    pub fn push_target(&mut self, target: Target) {
        self.targets.push(target);
    }

    pub fn push_player_target(&mut self, target: PlayerTarget) {
        self.player_targets.push(target);
    }

    pub fn len(&self) -> usize {
        self.targets.len() + self.player_targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.targets.clear();
        self.player_targets.clear();
    }

    /// Drains the queue, keeping only the first entry per target.
    pub fn take(&mut self) -> (Vec<Target>, Vec<PlayerTarget>) {
        let mut seen = HashSet::new();
        let targets = self.targets.drain(..).filter(|t| seen.insert(t.ai.id)).collect();
        seen.clear();
        let players = self.player_targets.drain(..).filter(|t| seen.insert(t.enemy.id)).collect();
        (targets, players)
    }
}
