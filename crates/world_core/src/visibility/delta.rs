use crate::types::{EntityId, PseudoId};
use std::collections::HashMap;

/// Changes needed to bring one on-sight category in line with what is
/// actually nearby.
#[derive(Debug, Clone, PartialEq)]
pub struct SightDelta<T> {
    pub appeared: Vec<(EntityId, PseudoId, T)>,
    pub disappeared: Vec<(EntityId, PseudoId)>,
}

impl<T> SightDelta<T> {
    pub fn is_empty(&self) -> bool {
        self.appeared.is_empty() && self.disappeared.is_empty()
    }
}

/// Compares `current` (what is nearby now) with `known` (what the client
/// was told about).
///
/// Entities that are nearby but must not be shown (mounted or invisible
/// players) are left out of `current` by the caller. One the client already
/// knows therefore gets a disappear, and it gets no appear until it is
/// visible again. An entity that came back under a new pseudo-ID gets a
/// disappear for the old one and an appear for the new one.
pub fn diff<T: Clone>(current: &HashMap<EntityId, (PseudoId, T)>, known: &HashMap<EntityId, PseudoId>) -> SightDelta<T> {
    let mut appeared = Vec::new();
    let mut disappeared = Vec::new();

    for (id, (pseudo_id, item)) in current {
        match known.get(id) {
            Some(old) if old == pseudo_id => {}
            Some(old) => {
                disappeared.push((*id, *old));
                appeared.push((*id, *pseudo_id, item.clone()));
            }
            None => appeared.push((*id, *pseudo_id, item.clone())),
        }
    }
    for (id, pseudo_id) in known {
        if !current.contains_key(id) {
            disappeared.push((*id, *pseudo_id));
        }
    }

    appeared.sort_by_key(|(id, _, _)| *id);
    disappeared.sort_by_key(|(id, _)| *id);
    SightDelta { appeared, disappeared }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current(entries: &[(EntityId, PseudoId)]) -> HashMap<EntityId, (PseudoId, ())> {
        entries.iter().map(|(id, p)| (*id, (*p, ()))).collect()
    }

    fn known(entries: &[(EntityId, PseudoId)]) -> HashMap<EntityId, PseudoId> {
        entries.iter().copied().collect()
    }

    #[test]
    fn set_differences() {
        let delta = diff(&current(&[(1, 10), (2, 20)]), &known(&[(2, 20), (3, 30)]));
        assert_eq!(delta.appeared, vec![(1, 10, ())]);
        assert_eq!(delta.disappeared, vec![(3, 30)]);
    }

    #[test]
    fn converged_sets_produce_nothing() {
        let delta = diff(&current(&[(1, 10)]), &known(&[(1, 10)]));
        assert!(delta.is_empty());
    }

    #[test]
    fn new_pseudo_id_replaces_old() {
        let delta = diff(&current(&[(1, 11)]), &known(&[(1, 10)]));
        assert_eq!(delta.disappeared, vec![(1, 10)]);
        assert_eq!(delta.appeared, vec![(1, 11, ())]);
    }
}
