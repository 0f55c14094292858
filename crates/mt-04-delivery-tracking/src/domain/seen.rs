//! Bounded FIFO cache for duplicate suppression.

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

struct SeenState<K> {
    keys: HashSet<K>,
    order: VecDeque<K>,
}

/// Remembers up to `max_size` keys, evicting the oldest first.
pub struct SeenCache<K> {
    state: Mutex<SeenState<K>>,
    max_size: usize,
}

impl<K: Eq + Hash + Clone> SeenCache<K> {
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(SeenState {
                keys: HashSet::new(),
                order: VecDeque::new(),
            }),
            max_size: max_size.max(1),
        }
    }

    /// Record `key`. Returns `false` if it was already present.
    pub fn insert(&self, key: K) -> bool {
        let mut state = self.state.lock();
        if state.keys.contains(&key) {
            return false;
        }
        if state.order.len() >= self.max_size {
            if let Some(oldest) = state.order.pop_front() {
                state.keys.remove(&oldest);
            }
        }
        state.keys.insert(key.clone());
        state.order.push_back(key);
        true
    }

    pub fn contains(&self, key: &K) -> bool {
        self.state.lock().keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
