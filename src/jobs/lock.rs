//! Enqueue deduplication locks
//!
//! The lock is advisory: it bounds duplicate enqueues, while the
//! synchronizer's row lock is what actually guarantees mutual exclusion.
//! Any store with TTL'd write-if-absent semantics qualifies.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// TTL'd write-if-absent key-value store.
pub trait CacheStore: Send + Sync {
	/// Atomically claim `key` for `ttl`. `false` when a live entry exists.
	fn put_if_absent(&self, key: &str, ttl: Duration) -> bool;

	/// Drop `key` immediately.
	fn delete(&self, key: &str);
}

/// The enqueue lock key for a (model, id, crm) triple.
pub fn enqueue_lock_key(model: &str, id: &str, crm_name: &str) -> String {
	format!("etlify:enqueue_lock:v2:{model}:{id}:{crm_name}")
}

/// In-process cache store backed by a mutexed map of expiry instants.
///
/// Suits single-process deployments and tests; multi-process deployments
/// plug in a shared store instead.
#[derive(Default)]
pub struct InMemoryCacheStore {
	entries: Mutex<HashMap<String, Instant>>,
}

impl InMemoryCacheStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Live entry count (expired entries are not counted).
	pub fn len(&self) -> usize {
		let now = Instant::now();
		let entries = self.entries.lock().expect("cache store poisoned");
		entries.values().filter(|expiry| **expiry > now).count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Whether `key` currently holds a live entry.
	pub fn contains(&self, key: &str) -> bool {
		let entries = self.entries.lock().expect("cache store poisoned");
		entries
			.get(key)
			.is_some_and(|expiry| *expiry > Instant::now())
	}
}

impl CacheStore for InMemoryCacheStore {
	fn put_if_absent(&self, key: &str, ttl: Duration) -> bool {
		let now = Instant::now();
		let mut entries = self.entries.lock().expect("cache store poisoned");

		if let Some(expiry) = entries.get(key) {
			if *expiry > now {
				return false;
			}
		}
		entries.insert(key.to_string(), now + ttl);
		true
	}

	fn delete(&self, key: &str) {
		let mut entries = self.entries.lock().expect("cache store poisoned");
		entries.remove(key);
	}
}
