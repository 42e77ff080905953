//! Worker-side job execution
//!
//! An attempt always clears its enqueue lock when it finishes, whatever the
//! outcome. Retryable failures re-arm the lock for their own attempt and
//! re-enter the queue after the fixed delay.

use super::lock::enqueue_lock_key;
use super::queue::QueuedSyncJob;
use crate::context::EngineContext;
use crate::error::SyncResult;
use crate::synchronizer::{AttemptOutcome, Synchronizer};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Run one queued sync attempt end to end.
pub async fn run_sync_job(ctx: &Arc<EngineContext>, job: QueuedSyncJob) {
	let key = enqueue_lock_key(&job.args.model, &job.args.id, &job.args.crm_name);

	let result = execute(ctx, &job).await;

	// The lock must never outlive the attempt, whatever happened above.
	ctx.cache.delete(&key);

	match result {
		Ok(Some(outcome)) => {
			debug!(
				job_id = %job.id,
				model = %job.args.model,
				id = %job.args.id,
				crm_name = %job.args.crm_name,
				?outcome,
				"sync attempt finished"
			);
		}
		Ok(None) => {}
		Err(err) if err.is_retryable() && job.attempt < ctx.config.retry_attempts => {
			warn!(
				job_id = %job.id,
				model = %job.args.model,
				id = %job.args.id,
				crm_name = %job.args.crm_name,
				attempt = job.attempt,
				%err,
				"sync attempt failed, scheduling retry"
			);
			schedule_retry(ctx, &job, &key).await;
		}
		Err(err) => {
			error!(
				job_id = %job.id,
				model = %job.args.model,
				id = %job.args.id,
				crm_name = %job.args.crm_name,
				attempt = job.attempt,
				%err,
				"sync attempt failed terminally"
			);
		}
	}
}

async fn execute(ctx: &Arc<EngineContext>, job: &QueuedSyncJob) -> SyncResult<Option<AttemptOutcome>> {
	let Some(record) = job.args.record_ref() else {
		warn!(id = %job.args.id, model = %job.args.model, "unparseable record id, dropping job");
		return Ok(None);
	};

	let Some(binding) = ctx.bindings.get(&record.resource_type, &job.args.crm_name) else {
		// Misconfiguration: surfaced, never retried
		return Err(crate::error::SyncError::MissingBinding {
			resource_type: record.resource_type,
			crm_name: job.args.crm_name.clone(),
		});
	};

	if !binding.source.exists(&ctx.db, record.resource_id).await? {
		info!(%record, crm_name = %job.args.crm_name, "record gone, job is a no-op");
		return Ok(None);
	}

	Synchronizer::new(ctx)
		.sync(&record, &job.args.crm_name)
		.await
		.map(Some)
}

/// Re-arm the lock and push the delayed retry.
///
/// Losing the lock race to a fresh enqueue is fine: that job will perform
/// the attempt this retry was for.
async fn schedule_retry(ctx: &Arc<EngineContext>, job: &QueuedSyncJob, key: &str) {
	if !ctx.cache.put_if_absent(key, ctx.config.enqueue_lock_ttl) {
		debug!(job_id = %job.id, "fresh enqueue already holds the lock, retry skipped");
		return;
	}

	let retry = job.retry_of(ctx.config.retry_delay);
	match super::queue_for(ctx, &job.args).await {
		Ok(queue) => {
			if let Err(err) = queue.push(retry).await {
				error!(job_id = %job.id, %err, "failed to push retry");
				ctx.cache.delete(key);
			}
		}
		Err(err) => {
			error!(job_id = %job.id, %err, "no queue for retry");
			ctx.cache.delete(key);
		}
	}
}
