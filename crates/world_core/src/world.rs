//! The assembled world: registry, bus, combat and the AI loops of one server
//! process, plus the character lifecycle that ties them together.

use crate::ai::{spawn_behavior, AiContext};
use crate::bus::{BusTransport, ClientSink};
use crate::combat::CombatResolver;
use crate::config::WorldConfig;
use crate::entity::{Character, CharacterProfile};
use crate::error::WorldError;
use crate::loot::DropTable;
use crate::persistence::Persistence;
use crate::registry::{RegistryStats, WorldRegistry};
use crate::seed::WorldSeed;
use crate::types::{EntityId, MapKey, PseudoId, ServerId};
use crate::visibility::Reconciler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct World {
    server_id: ServerId,
    config: WorldConfig,
    seed: WorldSeed,
    registry: Arc<WorldRegistry>,
    bus: Arc<dyn BusTransport>,
    persistence: Arc<dyn Persistence>,
    combat: Arc<CombatResolver>,
    ai_context: Arc<AiContext>,
    shutdown: broadcast::Sender<()>,
    ai_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("server_id", &self.server_id)
            .field("stats", &self.registry.stats())
            .finish()
    }
}

impl World {
    pub fn new(
        server_id: ServerId,
        config: WorldConfig,
        seed: WorldSeed,
        bus: Arc<dyn BusTransport>,
        persistence: Arc<dyn Persistence>,
    ) -> Arc<Self> {
        let registry = Arc::new(WorldRegistry::with_pool_capacity(config.map_capacity));
        let loot = Arc::new(DropTable::new(registry.clone(), seed.loot.clone(), config.drop_lifetime()));
        let combat = Arc::new(CombatResolver::new(
            server_id,
            registry.clone(),
            bus.clone(),
            loot,
            persistence.clone(),
        ));
        let ai_context = Arc::new(AiContext {
            registry: registry.clone(),
            combat: combat.clone(),
            config: config.clone(),
        });
        let (shutdown, _) = broadcast::channel(1);

        Arc::new(Self {
            server_id,
            config,
            seed,
            registry,
            bus,
            persistence,
            combat,
            ai_context,
            shutdown,
            ai_tasks: Mutex::new(Vec::new()),
        })
    }

    /// Populates the world from its seed and starts one behavior loop per AI.
    /// Returns the number of AIs started.
    pub async fn boot(&self) -> Result<usize, WorldError> {
        for profile in &self.seed.characters {
            self.persistence.update_character(profile).await?;
        }

        let ais = self.seed.populate(&self.registry, self.server_id).await?;
        let mut tasks = self.ai_tasks.lock().await;
        for ai in &ais {
            tasks.push(spawn_behavior(ai.clone(), self.ai_context.clone(), self.shutdown.subscribe()));
        }
        info!("🧠 Started {} AI behavior loops on server {}", ais.len(), self.server_id);
        Ok(ais.len())
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<WorldRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<dyn BusTransport> {
        &self.bus
    }

    pub fn combat(&self) -> &Arc<CombatResolver> {
        &self.combat
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// A reconciler delivering through `sink` with the configured radius and
    /// interval.
    pub fn reconciler(&self, sink: Arc<dyn ClientSink>) -> Arc<Reconciler> {
        Arc::new(Reconciler::new(
            self.registry.clone(),
            sink,
            self.config.perception_radius,
            self.config.reconcile_interval(),
        ))
    }

    /// Loads a stored profile, or creates a starter one at the default map's
    /// spawn point.
    pub async fn load_character(&self, id: EntityId, name: &str) -> Result<Arc<Character>, WorldError> {
        let profile = match self.persistence.load_character(id).await? {
            Some(profile) => profile,
            None => {
                let map = self.seed.default_map();
                let profile = CharacterProfile::starter(id, name, map, self.seed.spawn_point(map));
                self.persistence.update_character(&profile).await?;
                debug!(character = id, "created starter profile");
                profile
            }
        };
        Ok(Character::new(profile))
    }

    /// Puts `character` on its saved map, falling back to the default map
    /// when the saved one is not part of this world.
    pub async fn enter(&self, character: &Arc<Character>) -> Result<PseudoId, WorldError> {
        let status = character.status().await;
        let (map, at) = if self.seed.knows_map(status.last_map) {
            (status.last_map, status.coordinate)
        } else {
            let map = self.seed.default_map();
            (map, self.seed.spawn_point(map))
        };
        let pseudo_id = self
            .registry
            .enter_map(character, MapKey::new(self.server_id, map), at)
            .await?;
        self.checkpoint(character).await;
        info!("🚪 {} entered map {} as #{}", character.name, map, pseudo_id);
        Ok(pseudo_id)
    }

    /// Brings a dead character back at the spawn point of its map.
    pub async fn respawn(&self, character: &Arc<Character>) -> Result<PseudoId, WorldError> {
        let map = {
            let mut status = character.lock_status().await;
            if !status.is_dead {
                return Ok(character.pseudo_id());
            }
            status.is_dead = false;
            status.hp = status.max_hp;
            status.chi = status.max_chi;
            status.last_map
        };
        let pseudo_id = self
            .registry
            .enter_map(character, MapKey::new(self.server_id, map), self.seed.spawn_point(map))
            .await?;
        self.checkpoint(character).await;
        Ok(pseudo_id)
    }

    /// Takes `character` out of the world and saves it.
    pub async fn leave(&self, character: &Arc<Character>) {
        character.set_active(false).await;
        character.attack_queue().lock().await.clear();
        let left = self.registry.leave_map(character).await;
        self.checkpoint(character).await;
        if let Some(key) = left {
            info!("👋 {} left map {}", character.name, key);
        }
    }

    /// Saves the character's profile. Failures are logged, not propagated.
    pub async fn checkpoint(&self, character: &Arc<Character>) {
        let profile = character.profile().await;
        if let Err(e) = self.persistence.update_character(&profile).await {
            warn!(character = character.id, "checkpoint failed: {}", e);
        }
    }

    /// Stops every AI loop and waits for them, up to `grace`.
    pub async fn shutdown(&self, grace: Duration) {
        let _ = self.shutdown.send(());
        let tasks: Vec<_> = self.ai_tasks.lock().await.drain(..).collect();
        let count = tasks.len();
        if tokio::time::timeout(grace, futures::future::join_all(tasks)).await.is_err() {
            warn!("AI loops did not stop within {:?}", grace);
        }
        info!("🛑 Stopped {} AI behavior loops", count);
    }
}
