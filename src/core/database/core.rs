// src/core/database/core.rs

//! One numbered database: the data, TTL and version maps plus the striped
//! key locker that serializes multi-key access.

use crate::core::database::registry::{self, CommandFlags};
use crate::core::locking::KeyLocker;
use crate::core::storage::{DataEntity, ShardedDict};
use crate::core::timewheel::TimeWheel;
use crate::core::{CitrineError, CmdLine, RespValue};
use bytes::Bytes;
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::SystemTime;

/// Shard counts for the three concurrent maps.
pub const DATA_DICT_SHARDS: usize = 1 << 16;
pub const TTL_DICT_SHARDS: usize = 1 << 10;
/// Slots in the per-database striped locker.
pub const LOCKER_SIZE: usize = 1024;

/// Callback the persistence layer installs to receive `(db_index, line)`
/// payloads for every durable write.
pub type AofHook = Arc<dyn Fn(usize, CmdLine) -> BoxFuture<'static, ()> + Send + Sync>;

pub struct Database {
    index: usize,
    data: ShardedDict<DataEntity>,
    ttl: ShardedDict<SystemTime>,
    version: ShardedDict<u32>,
    pub locker: Arc<KeyLocker>,
    wheel: TimeWheel,
    aof_hook: OnceCell<AofHook>,
}

/// The wheel registry key for a pending expiration. Bytes are widened to
/// chars one-to-one, so distinct binary keys never collide.
fn expire_task_key(index: usize, key: &Bytes) -> String {
    let mut out = String::with_capacity(key.len() + 16);
    out.push_str("expire:");
    let mut buf = itoa::Buffer::new();
    out.push_str(buf.format(index));
    out.push(':');
    out.extend(key.iter().map(|&b| b as char));
    out
}

impl Database {
    pub fn new(index: usize, wheel: TimeWheel) -> Arc<Self> {
        Arc::new(Self {
            index,
            data: ShardedDict::with_shard_count(DATA_DICT_SHARDS),
            ttl: ShardedDict::with_shard_count(TTL_DICT_SHARDS),
            version: ShardedDict::with_shard_count(DATA_DICT_SHARDS),
            locker: Arc::new(KeyLocker::new(LOCKER_SIZE)),
            wheel,
            aof_hook: OnceCell::new(),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Installs the persistence callback. May only happen once, at startup.
    pub fn set_aof_hook(&self, hook: AofHook) {
        let _ = self.aof_hook.set(hook);
    }

    pub(crate) async fn emit_aof(&self, line: CmdLine) {
        if let Some(hook) = self.aof_hook.get() {
            hook(self.index, line).await;
        }
    }

    // --- Expiration ---

    fn has_expired(&self, key: &Bytes) -> bool {
        self.ttl
            .get(key)
            .is_some_and(|when| when <= SystemTime::now())
    }

    /// Removes the key from all three maps without touching the wheel.
    fn remove_inner(&self, key: &Bytes) -> bool {
        let was_present = self.data.remove(key).is_some();
        self.ttl.remove(key);
        self.version.remove(key);
        was_present
    }

    /// Removes the key from all three maps and cancels its pending
    /// expiration task.
    pub fn remove_key(&self, key: &Bytes) -> bool {
        self.wheel.cancel(&expire_task_key(self.index, key));
        self.remove_inner(key)
    }

    /// Lazy expiration: drops the key if its TTL has passed. Returns true
    /// when the key was reaped.
    fn expire_if_needed(&self, key: &Bytes) -> bool {
        if self.has_expired(key) {
            self.remove_key(key);
            true
        } else {
            false
        }
    }

    /// Sets the absolute expiration instant for an existing key and schedules
    /// the wheel task that reaps it.
    pub fn expire_at(self: &Arc<Self>, key: Bytes, at: SystemTime) {
        self.ttl.put(key.clone(), at);

        let db = Arc::clone(self);
        let task_key = expire_task_key(self.index, &key);
        self.wheel.at(
            at,
            task_key,
            Box::pin(async move {
                let write_keys = [key.clone()];
                let _guard = db.locker.lock_rw(&write_keys, &[]).await;
                // Check-lock-check: the TTL may have been moved or removed
                // while this task sat in the wheel.
                if db.has_expired(&key) {
                    db.remove_inner(&key);
                }
            }),
        );
    }

    /// Removes the TTL, keeping the key. Returns true when a TTL existed.
    pub fn persist(&self, key: &Bytes) -> bool {
        self.wheel.cancel(&expire_task_key(self.index, key));
        self.ttl.remove(key).is_some()
    }

    /// The absolute expiration instant, if one is set (and not yet passed).
    pub fn expiration(&self, key: &Bytes) -> Option<SystemTime> {
        if self.expire_if_needed(key) {
            return None;
        }
        self.ttl.get(key)
    }

    // --- Data access (all lazily expiring) ---

    pub fn get_entity(&self, key: &Bytes) -> Option<DataEntity> {
        if self.expire_if_needed(key) {
            return None;
        }
        self.data.get(key)
    }

    pub fn with_entity<R>(&self, key: &Bytes, f: impl FnOnce(&DataEntity) -> R) -> Option<R> {
        if self.expire_if_needed(key) {
            return None;
        }
        self.data.with_value(key, f)
    }

    pub fn with_entity_mut<R>(
        &self,
        key: &Bytes,
        f: impl FnOnce(&mut DataEntity) -> R,
    ) -> Option<R> {
        if self.expire_if_needed(key) {
            return None;
        }
        self.data.with_value_mut(key, f)
    }

    /// Runs `f` on the entity, creating it with `default()` first when the key
    /// is absent (or just expired).
    pub fn with_entity_or_insert<R>(
        &self,
        key: Bytes,
        default: impl FnOnce() -> DataEntity,
        f: impl FnOnce(&mut DataEntity) -> R,
    ) -> R {
        self.expire_if_needed(&key);
        let (result, _inserted) = self.data.with_value_or_insert_mut(key, default, f);
        result
    }

    pub fn put_entity(&self, key: Bytes, entity: DataEntity) -> usize {
        self.expire_if_needed(&key);
        self.data.put(key, entity)
    }

    pub fn put_if_absent(&self, key: Bytes, entity: DataEntity) -> usize {
        self.expire_if_needed(&key);
        self.data.put_if_absent(key, entity)
    }

    pub fn put_if_exists(&self, key: Bytes, entity: DataEntity) -> usize {
        self.expire_if_needed(&key);
        self.data.put_if_exists(key, entity)
    }

    pub fn exists(&self, key: &Bytes) -> bool {
        if self.expire_if_needed(key) {
            return false;
        }
        self.data.contains_key(key)
    }

    pub fn key_count(&self) -> usize {
        self.data.len()
    }

    /// Iterates live keys with their entities and optional expirations.
    /// Expired-but-unreaped keys are skipped.
    pub fn for_each(&self, mut visitor: impl FnMut(&Bytes, &DataEntity, Option<SystemTime>) -> bool) {
        let now = SystemTime::now();
        self.data.for_each(|key, entity| {
            match self.ttl.get(key) {
                Some(when) if when <= now => true,
                expiration => visitor(key, entity, expiration),
            }
        });
    }

    pub fn random_keys(&self, n: usize) -> Vec<Bytes> {
        self.data.random_keys(n)
    }

    pub fn random_distinct_keys(&self, n: usize) -> Vec<Bytes> {
        self.data.random_distinct_keys(n)
    }

    /// Drops every key, TTL and version in this database. Pending wheel tasks
    /// are left to fire harmlessly against the emptied TTL map.
    pub fn flush(&self) {
        self.data.clear();
        self.ttl.clear();
        self.version.clear();
    }

    // --- Versioning ---

    /// Bumps the optimistic-concurrency token of each key. Runs strictly
    /// before the write becomes observable.
    pub fn bump_versions(&self, keys: &[Bytes]) {
        for key in keys {
            self.version
                .with_value_or_insert_mut(key.clone(), || 0u32, |v| *v = v.wrapping_add(1));
        }
    }

    pub fn get_version(&self, key: &Bytes) -> u32 {
        self.version.get(key).unwrap_or(0)
    }

    // --- Command execution ---

    /// Runs one normal (non-transaction, non-system) command: resolve the
    /// descriptor, check arity, bump versions of the written keys, take the
    /// striped locks, execute, and emit the AOF payload while still inside
    /// the critical section.
    pub async fn exec_normal(self: &Arc<Self>, line: &[Bytes]) -> Result<RespValue, CitrineError> {
        let name = String::from_utf8_lossy(&line[0]).to_lowercase();
        let spec = registry::lookup(&name).ok_or(CitrineError::UnknownCommand(name.clone()))?;
        if !registry::validate_arity(spec.arity, line.len()) {
            return Err(CitrineError::WrongArgumentCount(name));
        }

        let (write_keys, read_keys) = (spec.prepare)(&line[1..]);
        if !write_keys.is_empty() {
            self.bump_versions(&write_keys);
        }

        let guard = self.locker.lock_rw(&write_keys, &read_keys).await;
        let result = (spec.exec)(self, &line[1..])?;
        for payload in result.aof {
            self.emit_aof(payload).await;
        }
        drop(guard);

        Ok(result.reply)
    }

    /// Runs a command whose locks the caller already holds (the EXEC path and
    /// anything else that batches lock acquisition).
    pub fn exec_with_lock(
        self: &Arc<Self>,
        line: &[Bytes],
    ) -> Result<registry::CmdResult, CitrineError> {
        let name = String::from_utf8_lossy(&line[0]).to_lowercase();
        let spec = registry::lookup(&name).ok_or(CitrineError::UnknownCommand(name.clone()))?;
        if !registry::validate_arity(spec.arity, line.len()) {
            return Err(CitrineError::WrongArgumentCount(name));
        }
        (spec.exec)(self, &line[1..])
    }

    /// True when the named command carries the WRITE flag.
    pub fn is_write_command(name: &str) -> bool {
        registry::lookup(name).is_some_and(|spec| spec.flags.contains(CommandFlags::WRITE))
    }
}
