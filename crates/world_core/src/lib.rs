//! # World Core
//!
//! The simulation side of the Sightline world server: everything that lives
//! on a map, who can see it, and what happens when it fights.
//!
//! ## Components
//!
//! * **Spatial Registry** ([`registry`]) - per-map tables of entities keyed by
//!   a 16-bit pseudo-ID that is unique within the map
//! * **Entity State** ([`entity`]) - characters, mobs, pets, drops, NPCs and
//!   housing items, each with its own locks and per-category on-sight sets
//! * **Broadcast Bus** ([`bus`]) - publish/subscribe of world events with a
//!   cast-near filter applied per receiving session
//! * **AI Behavior Loop** ([`ai`]) - one task per mob stepping
//!   scan / chase / attack / respawn
//! * **Visibility Reconciliation** ([`visibility`]) - per-character passes that
//!   turn "what is nearby" into appear and disappear packets
//! * **Combat Resolution** ([`combat`]) - damage formula, attack queues and the
//!   single place HP is mutated
//!
//! [`World`] wires them together for one server process.
//!
//! ## Locking
//!
//! A map partition lock guards the entity table and the pseudo-ID pool of
//! that map together. Entity locks are independent of it. No lock is held
//! while a packet is written to a client.

pub mod ai;
pub mod bus;
pub mod combat;
pub mod config;
pub mod entity;
pub mod epoch;
pub mod error;
pub mod loot;
pub mod packets;
pub mod persistence;
pub mod registry;
pub mod seed;
pub mod types;
pub mod utils;
pub mod visibility;
pub mod wire;
pub mod world;

pub use bus::{BusDispatcher, BusTransport, ClientSink, Envelope, LocalBus, LocalSession, SightFilter};
pub use config::WorldConfig;
pub use entity::{Character, CharacterProfile};
pub use error::WorldError;
pub use persistence::{MemoryPersistence, Persistence};
pub use registry::WorldRegistry;
pub use seed::WorldSeed;
pub use types::*;
pub use world::World;
