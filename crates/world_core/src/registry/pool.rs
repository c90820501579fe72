//! Reusable pseudo-ID pool of one map.

use crate::types::PseudoId;
use std::collections::{HashSet, VecDeque};

/// Hands out pseudo-IDs `1..=capacity`. Released IDs are reused oldest
/// first, which keeps a freshly released ID away from clients that may
/// still reference it.
#[derive(Debug)]
pub struct PseudoIdPool {
    capacity: u16,
    next: u32,
    free: VecDeque<PseudoId>,
    in_use: HashSet<PseudoId>,
}

impl Default for PseudoIdPool {
    fn default() -> Self {
        Self::with_capacity(u16::MAX)
    }
}

impl PseudoIdPool {
    pub fn with_capacity(capacity: u16) -> Self {
        Self {
            capacity,
            next: 1,
            free: VecDeque::new(),
            in_use: HashSet::new(),
        }
    }

    /// Takes an unused ID, or `None` when the pool is exhausted.
    pub fn allocate(&mut self) -> Option<PseudoId> {
        while let Some(id) = self.free.pop_front() {
            if self.in_use.insert(id) {
                return Some(id);
            }
        }
        while self.next <= self.capacity as u32 {
            let id = self.next as PseudoId;
            self.next += 1;
            if self.in_use.insert(id) {
                return Some(id);
            }
        }
        None
    }

    /// Claims a specific ID. Fails if it is `0`, out of range or taken.
    pub fn reserve(&mut self, id: PseudoId) -> bool {
        if id == 0 || id > self.capacity || !self.in_use.insert(id) {
            return false;
        }
        self.free.retain(|f| *f != id);
        true
    }

    /// Returns an ID to the pool. Releasing an unused ID is a no-op.
    pub fn release(&mut self, id: PseudoId) -> bool {
        if !self.in_use.remove(&id) {
            return false;
        }
        if (id as u32) < self.next {
            self.free.push_back(id);
        }
        true
    }

    pub fn in_use(&self) -> usize {
        self.in_use.len()
    }

    pub fn is_in_use(&self, id: PseudoId) -> bool {
        self.in_use.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_allocates_zero_or_duplicates() {
        let mut pool = PseudoIdPool::with_capacity(4);
        let ids: Vec<_> = std::iter::from_fn(|| pool.allocate()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(pool.allocate(), None);
    }

    #[test]
    fn released_ids_are_reused_fifo() {
        let mut pool = PseudoIdPool::with_capacity(3);
        for _ in 0..3 {
            pool.allocate();
        }
        assert!(pool.release(2));
        assert!(pool.release(1));
        assert!(!pool.release(1));
        assert_eq!(pool.allocate(), Some(2));
        assert_eq!(pool.allocate(), Some(1));
    }

    #[test]
    fn reserve_skips_id_during_allocation() {
        let mut pool = PseudoIdPool::default();
        assert!(pool.reserve(2));
        assert!(!pool.reserve(2));
        assert!(!pool.reserve(0));
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.allocate(), Some(3));
    }

    #[test]
    fn reserved_id_leaves_free_list() {
        let mut pool = PseudoIdPool::with_capacity(2);
        pool.allocate();
        pool.release(1);
        assert!(pool.reserve(1));
        assert_eq!(pool.allocate(), Some(2));
        assert_eq!(pool.allocate(), None);
    }
}
