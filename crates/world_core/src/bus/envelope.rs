use crate::types::{Coordinate, EntityId, MapKey, PseudoId, ServerId};
use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Semantic tag of a published payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvelopeType {
    Movement,
    Attack,
    Death,
    Respawn,
    HpUpdate,
    Conquest,
    Notice,
}

/// What a cast-near envelope is relative to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Anchor {
    /// Everyone in the envelope's scope
    None,
    Character(EntityId),
    Mob { id: EntityId, pseudo_id: PseudoId },
    Pet(EntityId),
    Drop(EntityId),
    BabyPet(EntityId),
    Location { coordinate: Coordinate, radius: f64 },
}

/// A serialized packet on its way to every server process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    /// Process that published it
    pub origin: ServerId,
    /// Map the envelope is about; `None` for world-wide messages
    pub scope: Option<MapKey>,
    pub kind: EnvelopeType,
    pub anchor: Anchor,
    /// Deliver only to observers the anchor rules select
    pub cast_near: bool,
    pub payload: Vec<u8>,
    pub timestamp: u64,
}

impl Envelope {
    /// An envelope delivered to every connected client.
    pub fn everyone(origin: ServerId, kind: EnvelopeType, payload: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin,
            scope: None,
            kind,
            anchor: Anchor::None,
            cast_near: false,
            payload,
            timestamp: current_timestamp(),
        }
    }

    /// A cast-near envelope on `scope`.
    pub fn near(origin: ServerId, kind: EnvelopeType, scope: MapKey, anchor: Anchor, payload: Vec<u8>) -> Self {
        Self {
            scope: Some(scope),
            anchor,
            cast_near: true,
            ..Self::everyone(origin, kind, payload)
        }
    }

    /// JSON form used by network transports.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_form_preserves_anchor() {
        let env = Envelope::near(
            2,
            EnvelopeType::Death,
            MapKey::new(2, 5),
            Anchor::Mob { id: 7, pseudo_id: 3 },
            vec![1, 2, 3],
        );
        let back = Envelope::from_json(&env.to_json().unwrap()).unwrap();
        assert_eq!(back.anchor, env.anchor);
        assert_eq!(back.scope, Some(MapKey::new(2, 5)));
        assert!(back.cast_near);
        assert_eq!(back.payload, vec![1, 2, 3]);
    }
}
