use crate::bus::{Anchor, BusTransport, Envelope, EnvelopeType};
use crate::entity::{Ai, BehaviorState, Character};
use crate::epoch::Epoched;
use crate::loot::{LootGrant, LootProvider};
use crate::packets;
use crate::persistence::Persistence;
use crate::registry::WorldRegistry;
use crate::types::{EntityId, Faction, ServerId};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Result of applying damage to one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    /// Target already dead, removed or offline; nothing changed
    Ignored,
    Damaged { hp: u32 },
    /// This call took HP to zero
    Killed,
}

impl DamageOutcome {
    pub fn remaining_hp(&self) -> u32 {
        match self {
            DamageOutcome::Damaged { hp } => *hp,
            _ => 0,
        }
    }
}

/// Who dealt damage to a character.
#[derive(Debug, Clone)]
pub enum Attacker {
    Mob(EntityId),
    Player(Arc<Character>),
}

impl Attacker {
    fn id(&self) -> EntityId {
        match self {
            Attacker::Mob(id) => *id,
            Attacker::Player(c) => c.id,
        }
    }
}

/// Totals of one "deal damage" flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub applied: usize,
    pub killed: usize,
}

/// Owns every HP mutation and the death handling that follows.
#[derive(Debug)]
pub struct CombatResolver {
    server_id: ServerId,
    registry: Arc<WorldRegistry>,
    bus: Arc<dyn BusTransport>,
    loot: Arc<dyn LootProvider>,
    persistence: Arc<dyn Persistence>,
}

impl CombatResolver {
    pub fn new(
        server_id: ServerId,
        registry: Arc<WorldRegistry>,
        bus: Arc<dyn BusTransport>,
        loot: Arc<dyn LootProvider>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            server_id,
            registry,
            bus,
            loot,
            persistence,
        }
    }

    pub fn bus(&self) -> &Arc<dyn BusTransport> {
        &self.bus
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    async fn publish(&self, envelope: Envelope) {
        if let Err(e) = self.bus.publish(envelope).await {
            warn!("publish failed: {}", e);
        }
    }

    /// Subtracts `amount` from the AI under its mutex. Returns the outcome
    /// and, on a kill, the character credited with it.
    async fn apply_to_ai(&self, ai: &Arc<Ai>, attacker: Option<EntityId>, amount: u64) -> (DamageOutcome, Option<EntityId>) {
        if ai.is_removed() {
            return (DamageOutcome::Ignored, None);
        }
        let mut status = ai.lock_status().await;
        if status.is_dead {
            return (DamageOutcome::Ignored, None);
        }

        let dealt = amount.min(status.hp as u64);
        status.hp = (status.hp as u64).saturating_sub(amount).min(ai.max_hp() as u64) as u32;
        if let Some(attacker) = attacker {
            *status.aggro.entry(attacker).or_default() += dealt;
        }
        if status.hp > 0 {
            return (DamageOutcome::Damaged { hp: status.hp }, None);
        }

        status.is_dead = true;
        status.is_moving = false;
        status.state = BehaviorState::Dead;
        status.target_player_id = None;
        status.died_at = Some(Instant::now());
        (DamageOutcome::Killed, status.top_attacker().or(attacker))
    }

    /// The single HP mutation point for mobs. A kill runs death handling
    /// exactly once, however many attackers race on it.
    pub async fn deal_damage_to_ai(&self, ai: &Arc<Ai>, attacker: Option<EntityId>, amount: u64, is_skill: bool) -> DamageOutcome {
        let (outcome, killer) = self.apply_to_ai(ai, attacker, amount).await;
        trace!(ai = ai.id, amount, is_skill, ?outcome, "damage to ai");
        if outcome == DamageOutcome::Killed {
            self.handle_ai_death(ai, killer).await;
        }
        outcome
    }

    async fn handle_ai_death(&self, ai: &Arc<Ai>, killer: Option<EntityId>) {
        // pending movement must not revive the corpse's position
        ai.movement_token().advance();
        let at = ai.coordinate().await;

        if let Some(character) = killer.and_then(|id| self.registry.character(id)) {
            {
                let mut status = character.lock_status().await;
                status.exp += ai.info.exp;
                status.war_points += ai.info.war_points;
            }
            let profile = character.profile().await;
            if let Err(e) = self.persistence.update_character(&profile).await {
                warn!(character = character.id, "failed to save after kill: {}", e);
            }
        }

        let grant = match self.loot.grant(ai, killer, at).await {
            Ok(grant) => grant,
            Err(e) => {
                warn!(ai = ai.id, kind = ai.info.kind_id, "loot grant failed: {}", e);
                LootGrant::default()
            }
        };

        let payload = packets::mob_death(ai.pseudo_id(), killer, &grant.fragment);
        let anchor = Anchor::Mob {
            id: ai.id,
            pseudo_id: ai.pseudo_id(),
        };
        self.publish(Envelope::near(self.server_id, EnvelopeType::Death, ai.key, anchor, payload))
            .await;
        info!(ai = ai.id, mob = %ai.info.name, killer = ?killer, drops = grant.drops.len(), "💀 Mob killed");
    }

    /// The single HP mutation point for characters.
    pub async fn deal_damage_to_character(&self, target: &Arc<Character>, attacker: Attacker, amount: u64, is_skill: bool) -> DamageOutcome {
        let (outcome, key, target_faction) = {
            let mut status = target.lock_status().await;
            if status.is_dead || !status.is_active {
                return DamageOutcome::Ignored;
            }
            let Some(key) = status.map else {
                return DamageOutcome::Ignored;
            };
            status.hp = (status.hp as u64).saturating_sub(amount).min(status.max_hp as u64) as u32;
            if status.hp > 0 {
                return DamageOutcome::Damaged { hp: status.hp };
            }
            status.is_dead = true;
            (DamageOutcome::Killed, key, status.faction)
        };
        trace!(character = target.id, amount, is_skill, "damage to character");

        target.movement_token().advance();
        target.attack_queue().lock().await.clear();

        if let Attacker::Player(killer) = &attacker {
            let mut status = killer.lock_status().await;
            if status.faction != Faction::Neutral && target_faction != Faction::Neutral && status.faction != target_faction {
                status.war_points += 1;
            }
        }
        if let Err(e) = self.persistence.update_character(&target.profile().await).await {
            warn!(character = target.id, "failed to save after death: {}", e);
        }

        let payload = packets::player_death(target.pseudo_id(), Some(attacker.id()));
        self.publish(Envelope::near(self.server_id, EnvelopeType::Death, key, Anchor::Character(target.id), payload))
            .await;
        info!(character = target.id, killer = attacker.id(), "☠️ Character died");
        outcome
    }

    /// Applies every queued attack of `attacker`, once per target, and
    /// publishes the attack packets. The queue is empty afterwards.
    pub async fn flush_attacks(&self, attacker: &Arc<Character>) -> FlushReport {
        let (targets, player_targets) = attacker.attack_queue().lock().await.take();
        let mut report = FlushReport::default();

        let status = attacker.status().await;
        let Some(key) = status.map else {
            return report;
        };
        if status.is_dead {
            return report;
        }
        let pseudo_id = attacker.pseudo_id();

        for target in targets {
            if target.ai.key != key {
                continue;
            }
            let (outcome, killer) = self.apply_to_ai(&target.ai, Some(attacker.id), target.damage).await;
            if outcome == DamageOutcome::Ignored {
                continue;
            }
            report.applied += 1;
            let payload = packets::player_attack(pseudo_id, target.ai.pseudo_id(), target.damage, outcome.remaining_hp(), target.is_skill);
            self.publish(Envelope::near(self.server_id, EnvelopeType::Attack, key, Anchor::Character(attacker.id), payload))
                .await;
            if outcome == DamageOutcome::Killed {
                report.killed += 1;
                self.handle_ai_death(&target.ai, killer).await;
            }
        }

        for target in player_targets {
            if target.enemy.id == attacker.id {
                continue;
            }
            let enemy_pseudo = target.enemy.pseudo_id();
            let outcome = self
                .deal_damage_to_character(&target.enemy, Attacker::Player(attacker.clone()), target.damage, target.is_skill)
                .await;
            if outcome == DamageOutcome::Ignored {
                continue;
            }
            report.applied += 1;
            if outcome == DamageOutcome::Killed {
                report.killed += 1;
            }
            let payload = packets::player_attack(pseudo_id, enemy_pseudo, target.damage, outcome.remaining_hp(), target.is_skill);
            self.publish(Envelope::near(self.server_id, EnvelopeType::Attack, key, Anchor::Character(attacker.id), payload))
                .await;
        }

        debug!(character = attacker.id, applied = report.applied, killed = report.killed, "attacks flushed");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use crate::combat::{PlayerTarget, Target};
    use crate::entity::ai::test_mob;
    use crate::entity::{CharacterProfile, WorldEntity};
    use crate::loot::NoLoot;
    use crate::persistence::MemoryPersistence;
    use crate::types::{Coordinate, MapKey};
    use tokio::sync::broadcast::error::TryRecvError;

    struct Fixture {
        registry: Arc<WorldRegistry>,
        bus: Arc<LocalBus>,
        persistence: Arc<MemoryPersistence>,
        resolver: Arc<CombatResolver>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(WorldRegistry::new());
        let bus = Arc::new(LocalBus::new(64));
        let persistence = Arc::new(MemoryPersistence::new());
        let resolver = Arc::new(CombatResolver::new(0, registry.clone(), bus.clone(), Arc::new(NoLoot), persistence.clone()));
        Fixture {
            registry,
            bus,
            persistence,
            resolver,
        }
    }

    async fn mob(f: &Fixture, id: EntityId, hp: u32) -> Arc<Ai> {
        let ai = Ai::new(id, MapKey::new(0, 1), Arc::new(test_mob(1, hp)), Coordinate::default());
        f.registry.register_new(ai.key, WorldEntity::Mob(ai.clone())).await.unwrap();
        ai
    }

    async fn player(f: &Fixture, id: EntityId) -> Arc<Character> {
        let c = Character::new(CharacterProfile::starter(id, "p", 1, Coordinate::default()));
        f.registry.enter_map(&c, MapKey::new(0, 1), Coordinate::default()).await.unwrap();
        c
    }

    fn deaths(rx: &mut crate::bus::BusReceiver) -> Vec<Arc<Envelope>> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(env) if env.kind == EnvelopeType::Death => out.push(env),
                Ok(_) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(_)) => {}
            }
        }
        out
    }

    #[tokio::test]
    async fn overkill_clamps_and_broadcasts_one_death() {
        let f = fixture();
        let mut rx = f.bus.subscribe();
        let ai = mob(&f, 1, 100).await;

        assert_eq!(f.resolver.deal_damage_to_ai(&ai, None, 150, false).await, DamageOutcome::Killed);
        assert_eq!(f.resolver.deal_damage_to_ai(&ai, None, 10, false).await, DamageOutcome::Ignored);

        let status = ai.status().await;
        assert_eq!(status.hp, 0);
        assert!(status.is_dead);

        let deaths = deaths(&mut rx);
        assert_eq!(deaths.len(), 1);
        assert!(deaths[0].cast_near);
        assert_eq!(deaths[0].anchor, Anchor::Mob { id: 1, pseudo_id: ai.pseudo_id() });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_attackers_kill_once() {
        let f = fixture();
        let mut rx = f.bus.subscribe();
        let ai = mob(&f, 1, 100).await;

        let mut handles = Vec::new();
        for attacker in 0..16 {
            let resolver = f.resolver.clone();
            let ai = ai.clone();
            handles.push(tokio::spawn(async move { resolver.deal_damage_to_ai(&ai, Some(attacker), 30, false).await }));
        }
        let mut kills = 0;
        for handle in handles {
            if handle.await.unwrap() == DamageOutcome::Killed {
                kills += 1;
            }
        }
        assert_eq!(kills, 1);
        assert_eq!(deaths(&mut rx).len(), 1);
        assert_eq!(ai.status().await.hp, 0);
    }

    #[tokio::test]
    async fn kill_grants_exp_to_top_damage_dealer() {
        let f = fixture();
        let ai = mob(&f, 1, 100).await;
        let top = player(&f, 10).await;
        let other = player(&f, 11).await;

        f.resolver.deal_damage_to_ai(&ai, Some(top.id), 60, false).await;
        f.resolver.deal_damage_to_ai(&ai, Some(other.id), 50, false).await;

        assert_eq!(top.status().await.exp, ai.info.exp);
        assert_eq!(other.status().await.exp, 0);
        assert!(f.persistence.load_character(10).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn flush_dedupes_and_clears_queue() {
        let f = fixture();
        let attacker = player(&f, 1).await;
        let ai = mob(&f, 5, 100).await;
        {
            let mut queue = attacker.attack_queue().lock().await;
            queue.push_target(Target { damage: 20, ai: ai.clone(), is_skill: false });
            queue.push_target(Target { damage: 20, ai: ai.clone(), is_skill: false });
        }

        let report = f.resolver.flush_attacks(&attacker).await;
        assert_eq!(report, FlushReport { applied: 1, killed: 0 });
        assert_eq!(ai.status().await.hp, 80);
        assert!(attacker.attack_queue().lock().await.is_empty());

        // a second flush has nothing to apply
        assert_eq!(f.resolver.flush_attacks(&attacker).await.applied, 0);
    }

    #[tokio::test]
    async fn player_kill_is_anchored_on_victim() {
        let f = fixture();
        let mut rx = f.bus.subscribe();
        let attacker = player(&f, 1).await;
        let victim = player(&f, 2).await;
        attacker
            .attack_queue()
            .lock()
            .await
            .push_player_target(PlayerTarget { damage: 1000, enemy: victim.clone(), is_skill: false });

        let report = f.resolver.flush_attacks(&attacker).await;
        assert_eq!(report.killed, 1);
        let status = victim.status().await;
        assert_eq!(status.hp, 0);
        assert!(status.is_dead);

        let deaths = deaths(&mut rx);
        assert_eq!(deaths.len(), 1);
        assert_eq!(deaths[0].anchor, Anchor::Character(2));
    }

    #[tokio::test]
    async fn zero_damage_keeps_hp() {
        let f = fixture();
        let ai = mob(&f, 1, 100).await;
        assert_eq!(f.resolver.deal_damage_to_ai(&ai, None, 0, false).await, DamageOutcome::Damaged { hp: 100 });
    }
}
