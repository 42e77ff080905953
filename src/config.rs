//! Engine configuration knobs

use crate::digest::{DigestStrategy, Sha256CanonicalJson};
use std::sync::Arc;
use std::time::Duration;

/// Process-wide engine configuration.
///
/// Per-CRM and per-binding overrides narrow these values; a `None` override
/// always inherits from here.
#[derive(Clone)]
pub struct EngineConfig {
	/// Payload fingerprint strategy. Must be pure.
	pub digest_strategy: Arc<dyn DigestStrategy>,
	/// Name of the default job queue.
	pub job_queue_name: String,
	/// Attempts are abandoned once a record's `error_count` reaches this.
	pub max_sync_errors: u32,
	/// TTL of the enqueue deduplication lock. Keep at 15 minutes or more so
	/// slow attempts stay covered.
	pub enqueue_lock_ttl: Duration,
	/// Bounded attempt count for the retry policy.
	pub retry_attempts: u32,
	/// Fixed delay between retries.
	pub retry_delay: Duration,
	/// Workers spawned by `Engine::start_workers`.
	pub worker_concurrency: usize,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			digest_strategy: Arc::new(Sha256CanonicalJson),
			job_queue_name: "etlify".into(),
			max_sync_errors: 3,
			enqueue_lock_ttl: Duration::from_secs(15 * 60),
			retry_attempts: 3,
			retry_delay: Duration::from_secs(60),
			worker_concurrency: 4,
		}
	}
}
