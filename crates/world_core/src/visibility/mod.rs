//! # Visibility Reconciliation
//!
//! Once per interval, for every connected and active character, each
//! on-sight category is compared with what the registry reports within the
//! perception radius. Newly visible entities are recorded and announced
//! with an appear packet; entities that left are removed and announced with
//! a disappear packet. Mob entries are mirrored in the AI's
//! `on_sight_players`.
//!
//! A pass never trusts previous passes: it re-derives the visible set from
//! the registry, so missed updates converge on the next tick.
//!
//! Special cases:
//!
//! - dead AIs are not visible
//! - mounted or invisible characters are not shown to other players, and
//!   one that was already shown gets a disappear
//! - war stones are tracked with the mobs but announced with their own
//!   packet, and every pass refreshes the stone's faction proximity lists

pub mod delta;

pub use delta::{diff, SightDelta};

use crate::bus::ClientSink;
use crate::entity::{Character, CharacterStatus, WorldEntity};
use crate::packets::{self, opcodes};
use crate::registry::WorldRegistry;
use crate::types::{EntityId, EntityKind, MapKey, PseudoId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

/// Totals of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub appeared: usize,
    pub disappeared: usize,
    pub send_failures: usize,
}

fn disappear_opcode(kind: EntityKind) -> u8 {
    match kind {
        EntityKind::Player => opcodes::PLAYER_DISAPPEAR,
        EntityKind::Mob => opcodes::MOB_DISAPPEAR,
        EntityKind::Npc => opcodes::NPC_DISAPPEAR,
        EntityKind::Pet => opcodes::PET_DISAPPEAR,
        EntityKind::Drop => opcodes::DROP_DISAPPEAR,
        EntityKind::HousingItem => opcodes::HOUSING_DISAPPEAR,
        EntityKind::BabyPet => opcodes::BABY_PET_DISAPPEAR,
    }
}

#[derive(Debug)]
pub struct Reconciler {
    registry: Arc<WorldRegistry>,
    sink: Arc<dyn ClientSink>,
    radius: f64,
    interval: Duration,
}

impl Reconciler {
    pub fn new(registry: Arc<WorldRegistry>, sink: Arc<dyn ClientSink>, radius: f64, interval: Duration) -> Self {
        Self {
            registry,
            sink,
            radius,
            interval,
        }
    }

    /// Runs passes for `character` until it becomes inactive.
    pub fn spawn(self: Arc<Self>, character: Arc<Character>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !character.is_active().await {
                    break;
                }
                self.reconcile(&character).await;
            }
            debug!(character = character.id, "visibility task stopped");
        })
    }

    /// One pass over every category.
    pub async fn reconcile(&self, character: &Arc<Character>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let me = character.status().await;
        if !me.is_active {
            return report;
        }
        let Some(key) = me.map else {
            return report;
        };

        for kind in EntityKind::ALL {
            self.reconcile_kind(character, &me, key, kind, &mut report).await;
        }
        if report.appeared + report.disappeared > 0 {
            trace!(character = character.id, appeared = report.appeared, disappeared = report.disappeared, "visibility pass");
        }
        report
    }

    async fn reconcile_kind(&self, character: &Arc<Character>, me: &CharacterStatus, key: MapKey, kind: EntityKind, report: &mut ReconcileReport) {
        let nearby = self.registry.nearby(key, me.coordinate, self.radius, kind).await;

        let mut current: HashMap<EntityId, (PseudoId, WorldEntity)> = HashMap::with_capacity(nearby.len());
        for (entity, _) in nearby {
            let id = entity.id();
            match &entity {
                WorldEntity::Player(other) => {
                    if other.id == character.id {
                        continue;
                    }
                    let status = other.status().await;
                    if !status.is_active || !status.is_visible_to_players() {
                        continue;
                    }
                }
                WorldEntity::Mob(ai) => {
                    if let Some(stone) = ai.war_stone() {
                        stone.update_presence(character.id, me.faction, !me.is_dead && me.hp > 0).await;
                    }
                    if ai.is_removed() || ai.is_dead().await {
                        continue;
                    }
                }
                _ => {}
            }
            current.insert(id, (entity.pseudo_id(), entity));
        }

        let known = character.on_sight.snapshot(kind).await;
        let delta = diff(&current, &known);
        if delta.is_empty() {
            return;
        }

        for (id, pseudo_id) in delta.disappeared {
            if character.on_sight.set(kind).write().await.remove(&id).is_none() {
                continue;
            }
            if kind == EntityKind::Mob {
                if let Some(ai) = self.registry.ai(id) {
                    ai.on_sight_players.write().await.remove(&character.id);
                    if let Some(stone) = ai.war_stone() {
                        stone.forget(character.id).await;
                    }
                }
            }
            report.disappeared += 1;
            self.send(character, packets::disappear(disappear_opcode(kind), pseudo_id), report).await;
        }

        for (id, pseudo_id, entity) in delta.appeared {
            character.on_sight.insert(kind, id, pseudo_id).await;
            let packet = match &entity {
                WorldEntity::Player(other) => packets::player_appear(pseudo_id, other.id, &other.name, &other.status().await),
                WorldEntity::Mob(ai) => {
                    ai.on_sight_players.write().await.insert(character.id);
                    let status = ai.status().await;
                    match ai.war_stone() {
                        Some(stone) => packets::stone_appear(ai, &status, &stone.snapshot().await),
                        None => packets::mob_appear(ai, &status, me.level()),
                    }
                }
                WorldEntity::Npc(npc) => packets::npc_appear(npc),
                WorldEntity::Pet(pet) => packets::pet_appear(pet, &pet.status().await),
                WorldEntity::Drop(drop) => packets::drop_appear(drop),
                WorldEntity::Housing(item) => packets::housing_appear(item),
            };
            report.appeared += 1;
            self.send(character, packet, report).await;
        }
    }

    async fn send(&self, character: &Character, packet: Vec<u8>, report: &mut ReconcileReport) {
        if let Err(e) = self.sink.send_to_character(character.id, packet).await {
            report.send_failures += 1;
            warn!(character = character.id, "visibility packet not delivered: {}", e);
        }
    }
}
