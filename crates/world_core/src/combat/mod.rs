//! # Combat Resolution
//!
//! Damage rolls ([`calculate_damage`]), the attack queue behind the
//! two-packet attack sequence ([`AttackQueue`]) and the single place HP is
//! changed ([`CombatResolver`]).
//!
//! ## Accuracy
//!
//! When the defender out-levels the attacker, the attacker needs
//! [`required_accuracy`] for a guaranteed hit. Below it, the hit chance is
//! `accuracy / required`, never lower than the floor of the target class.

pub mod queue;
pub mod resolver;

pub use queue::{AttackQueue, PlayerTarget, Target};
pub use resolver::{Attacker, CombatResolver, DamageOutcome, FlushReport};

use crate::error::WorldError;
use crate::types::CombatStats;
use rand::Rng;

/// Multiplier applied to critical hits, as numerator / denominator.
const CRITICAL_MULTIPLIER: (u64, u64) = (3, 2);

/// What is being hit; decides the lowest hit chance under the accuracy rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetClass {
    Player,
    Mob,
    Boss,
    WarStone,
}

impl TargetClass {
    pub fn hit_floor(&self) -> f64 {
        match self {
            TargetClass::Player => 0.2,
            TargetClass::Mob => 0.1,
            TargetClass::Boss => 0.05,
            // stones cannot dodge
            TargetClass::WarStone => 1.0,
        }
    }
}

/// Accuracy needed to always hit a defender `level_gap` levels higher.
pub fn required_accuracy(level_gap: i32) -> f64 {
    500.0 / (1.0 + (-(level_gap as f64 - 10.0) / 3.0).exp())
}

/// Result of one damage roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageRoll {
    pub damage: u64,
    pub critical: bool,
    pub missed: bool,
}

/// Rolls damage for one hit of `attacker` on `defender`.
///
/// A hit that lands always does at least 1 damage. A missed accuracy roll
/// returns zero damage with `missed` set.
pub fn calculate_damage<R: Rng + ?Sized>(
    attacker: &CombatStats,
    defender: &CombatStats,
    target: TargetClass,
    rng: &mut R,
) -> Result<DamageRoll, WorldError> {
    if attacker.min_attack > attacker.max_attack {
        return Err(WorldError::InvalidStats(format!(
            "min attack {} above max attack {}",
            attacker.min_attack, attacker.max_attack
        )));
    }
    if !(0.0..=1.0).contains(&attacker.critical_rate) {
        return Err(WorldError::InvalidStats(format!(
            "critical rate {} outside [0, 1]",
            attacker.critical_rate
        )));
    }

    if defender.level > attacker.level {
        let required = required_accuracy(defender.level as i32 - attacker.level as i32);
        let accuracy = attacker.accuracy as f64;
        if accuracy < required {
            let chance = (accuracy / required).clamp(target.hit_floor(), 1.0);
            if !rng.gen_bool(chance) {
                return Ok(DamageRoll {
                    damage: 0,
                    critical: false,
                    missed: true,
                });
            }
        }
    }

    let raw = rng.gen_range(attacker.min_attack..=attacker.max_attack) as u64;
    let mut damage = raw.saturating_sub(defender.defense as u64).max(1);
    let critical = rng.gen_bool(attacker.critical_rate);
    if critical {
        damage = damage * CRITICAL_MULTIPLIER.0 / CRITICAL_MULTIPLIER.1;
    }

    Ok(DamageRoll {
        damage,
        critical,
        missed: false,
    })
}
