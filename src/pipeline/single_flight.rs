use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

/// Tracks keys with an operation in progress so at most one runs per key.
#[derive(Debug)]
pub struct SingleFlight<K> {
    active: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash + Clone> SingleFlight<K> {
    pub fn new() -> Self {
        Self {
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claims `key`, or returns `None` while another holder has it.
    /// The claim is released when the returned guard drops.
    pub fn try_acquire(&self, key: K) -> Option<FlightGuard<K>> {
        let mut active = lock(&self.active);
        if !active.insert(key.clone()) {
            return None;
        }
        Some(FlightGuard {
            active: Arc::clone(&self.active),
            key,
        })
    }

    pub fn is_active(&self, key: &K) -> bool {
        lock(&self.active).contains(key)
    }
}

impl<K: Eq + Hash + Clone> Default for SingleFlight<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct FlightGuard<K: Eq + Hash> {
    active: Arc<Mutex<HashSet<K>>>,
    key: K,
}

impl<K: Eq + Hash> Drop for FlightGuard<K> {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.key);
    }
}

// The set stays consistent even if a holder panicked, so a poisoned lock is still usable.
fn lock<K>(active: &Mutex<HashSet<K>>) -> MutexGuard<'_, HashSet<K>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
