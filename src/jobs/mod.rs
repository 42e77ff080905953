//! Job layer
//!
//! Deduplicated enqueue (TTL lock), worker dispatch, bounded retry with lock
//! re-arming. The lock bounds duplicate enqueues only; correctness comes
//! from the synchronizer's row lock.

pub mod lock;
pub mod queue;
pub mod worker;

pub use lock::{enqueue_lock_key, CacheStore, InMemoryCacheStore};
pub use queue::{InProcessQueue, JobQueue, QueuedSyncJob, SyncJobArgs};

use crate::context::EngineContext;
use crate::error::SyncResult;
use crate::record::RecordRef;
use std::sync::Arc;
use tracing::debug;

/// Resolve the queue for a job: binding override, then per-CRM option, then
/// the context's default queue.
pub(crate) async fn queue_for(
	ctx: &EngineContext,
	args: &SyncJobArgs,
) -> SyncResult<Arc<dyn JobQueue>> {
	if let Some(binding) = ctx.bindings.get(&args.model, &args.crm_name) {
		if let Some(queue) = &binding.queue {
			return Ok(queue.clone());
		}
	}
	if let Some(crm) = ctx.crms.fetch(&args.crm_name) {
		if let Some(queue) = &crm.options.queue {
			return Ok(queue.clone());
		}
	}
	ctx.get_queue().await.ok_or(crate::error::SyncError::NoQueue)
}

/// Enqueue a sync attempt, deduplicated by the TTL lock.
///
/// Returns `false` when a live lock already covers the triple and the
/// enqueue was silently dropped.
pub async fn enqueue_sync(
	ctx: &EngineContext,
	record: &RecordRef,
	crm_name: &str,
) -> SyncResult<bool> {
	let crm_name = crate::registry::CrmRegistry::canonical_name(crm_name);
	let args = SyncJobArgs::for_record(record, &crm_name);
	let key = enqueue_lock_key(&args.model, &args.id, &args.crm_name);

	if !ctx.cache.put_if_absent(&key, ctx.config.enqueue_lock_ttl) {
		debug!(%record, %crm_name, "duplicate enqueue dropped");
		return Ok(false);
	}

	let queue = match queue_for(ctx, &args).await {
		Ok(queue) => queue,
		Err(err) => {
			ctx.cache.delete(&key);
			return Err(err);
		}
	};

	if let Err(err) = queue.push(QueuedSyncJob::first(args)).await {
		ctx.cache.delete(&key);
		return Err(err);
	}
	Ok(true)
}
