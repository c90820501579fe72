//! Tunables of the simulation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// In-process world configuration, filled from the `[world]` table of the
/// application config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Distance within which entities are visible
    pub perception_radius: f64,
    pub reconcile_interval_ms: u64,
    pub ai_tick_ms: u64,
    pub attack_cooldown_ms: u64,
    /// Distance from spawn at which a chasing mob gives up
    pub chase_leash: f64,
    pub drop_lifetime_secs: u64,
    /// Mobs ignore players this many levels above them
    pub max_aggro_level_gap: u16,
    /// Pseudo-IDs available on each map
    pub map_capacity: u16,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            perception_radius: 50.0,
            reconcile_interval_ms: 1000,
            ai_tick_ms: 500,
            attack_cooldown_ms: 1500,
            chase_leash: 60.0,
            drop_lifetime_secs: 60,
            max_aggro_level_gap: 20,
            map_capacity: u16::MAX,
        }
    }
}

impl WorldConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    pub fn ai_tick(&self) -> Duration {
        Duration::from_millis(self.ai_tick_ms)
    }

    pub fn attack_cooldown(&self) -> Duration {
        Duration::from_millis(self.attack_cooldown_ms)
    }

    pub fn drop_lifetime(&self) -> Duration {
        Duration::from_secs(self.drop_lifetime_secs)
    }
}
