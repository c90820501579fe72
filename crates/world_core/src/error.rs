//! Error types for the world core.

use crate::types::{MapKey, PseudoId};

/// Failures surfaced by registry, combat, bus and contract operations.
///
/// Most races between client and server state are *not* errors: looking up a
/// departed pseudo-ID yields `None`, attacking a dead mob is ignored. Only
/// conditions a caller must react to are represented here.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// Every pseudo-ID of the map is in use
    #[error("pseudo-ID pool exhausted on map {0}")]
    PseudoIdExhausted(MapKey),
    /// An explicit registration targeted an occupied pseudo-ID
    #[error("pseudo-ID {pseudo_id} already registered on map {key}")]
    PseudoIdOccupied { key: MapKey, pseudo_id: PseudoId },
    /// Combat statistics that cannot produce a damage roll
    #[error("invalid combat stats: {0}")]
    InvalidStats(String),
    /// The broadcast bus rejected a publish
    #[error("bus error: {0}")]
    Bus(String),
    /// A persistence call failed
    #[error("persistence error: {0}")]
    Persistence(String),
    /// A loot table or item lookup failed
    #[error("loot error: {0}")]
    Loot(String),
    /// A wire frame could not be decoded
    #[error("malformed packet: {0}")]
    Malformed(String),
    /// The world seed could not be read or parsed
    #[error("world seed error: {0}")]
    Seed(String),
}
