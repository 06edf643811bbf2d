// src/core/locking.rs

//! The striped key locker: a fixed array of read/write locks selected by
//! hashing a key, giving fine-grained concurrency at bounded memory.
//!
//! Any multi-key mutation must acquire every required slot before touching
//! the keyspace and hold the guards until all accesses complete. Slots are
//! always acquired in ascending index order, which imposes a global total
//! order and rules out deadlock between any pair of key sets.

use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Default number of lock slots.
pub const DEFAULT_LOCKER_SIZE: usize = 1024;

#[derive(Debug)]
pub struct KeyLocker {
    slots: Vec<Arc<RwLock<()>>>,
}

enum SlotGuard {
    Read(OwnedRwLockReadGuard<()>),
    Write(OwnedRwLockWriteGuard<()>),
}

/// Guards held for the duration of a command execution. Slots are released in
/// reverse acquisition order on drop.
pub struct KeyLockGuard {
    guards: Vec<SlotGuard>,
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        while self.guards.pop().is_some() {}
    }
}

impl Default for KeyLocker {
    fn default() -> Self {
        Self::new(DEFAULT_LOCKER_SIZE)
    }
}

impl KeyLocker {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            slots: (0..size).map(|_| Arc::new(RwLock::new(()))).collect(),
        }
    }

    fn slot_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.slots.len()
    }

    /// Acquires the write locks for `write_keys` and the read locks for
    /// `read_keys` in one deterministic sweep. When a slot is needed by both
    /// sets, the write lock subsumes the read.
    pub async fn lock_rw(&self, write_keys: &[Bytes], read_keys: &[Bytes]) -> KeyLockGuard {
        // `BTreeMap` keeps the slots sorted ascending; insert reads first so a
        // later write marking wins the slot.
        let mut slots: BTreeMap<usize, bool> = BTreeMap::new();
        for key in read_keys {
            slots.insert(self.slot_index(key), false);
        }
        for key in write_keys {
            slots.insert(self.slot_index(key), true);
        }

        let mut guards = Vec::with_capacity(slots.len());
        for (index, write) in slots {
            let slot = Arc::clone(&self.slots[index]);
            if write {
                guards.push(SlotGuard::Write(slot.write_owned().await));
            } else {
                guards.push(SlotGuard::Read(slot.read_owned().await));
            }
        }
        KeyLockGuard { guards }
    }

    /// Exclusive variant used by the pub/sub hub for channel operations.
    pub async fn lock_exclusive(&self, keys: &[Bytes]) -> KeyLockGuard {
        let slots: BTreeSet<usize> = keys.iter().map(|key| self.slot_index(key)).collect();
        let mut guards = Vec::with_capacity(slots.len());
        for index in slots {
            let slot = Arc::clone(&self.slots[index]);
            guards.push(SlotGuard::Write(slot.write_owned().await));
        }
        KeyLockGuard { guards }
    }
}
