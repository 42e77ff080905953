//! Job queues
//!
//! A queue transports `(model, id, crm)` triples to workers. The engine is
//! thread-neutral: `InProcessQueue` supplies parallelism from a tokio worker
//! pool draining a flume channel, and hosts can implement [`JobQueue`] over
//! an external backend instead.

use crate::context::EngineContext;
use crate::error::{SyncError, SyncResult};
use crate::record::RecordRef;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Wire arguments of one sync job: three strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJobArgs {
	pub model: String,
	pub id: String,
	pub crm_name: String,
}

impl SyncJobArgs {
	pub fn new(
		model: impl Into<String>,
		id: impl Into<String>,
		crm_name: impl Into<String>,
	) -> Self {
		Self {
			model: model.into(),
			id: id.into(),
			crm_name: crm_name.into(),
		}
	}

	pub fn for_record(record: &RecordRef, crm_name: &str) -> Self {
		Self::new(
			record.resource_type.clone(),
			record.resource_id.to_string(),
			crm_name,
		)
	}

	/// Parse back into a record identity. `None` when the id is not numeric.
	pub fn record_ref(&self) -> Option<RecordRef> {
		let id: i64 = self.id.parse().ok()?;
		Some(RecordRef::new(self.model.clone(), id))
	}
}

/// One queued attempt. `delay` is used by retry scheduling.
#[derive(Debug, Clone)]
pub struct QueuedSyncJob {
	pub id: Uuid,
	pub args: SyncJobArgs,
	pub attempt: u32,
	pub delay: Option<Duration>,
}

impl QueuedSyncJob {
	pub fn first(args: SyncJobArgs) -> Self {
		Self {
			id: Uuid::new_v4(),
			args,
			attempt: 1,
			delay: None,
		}
	}

	pub fn retry_of(&self, delay: Duration) -> Self {
		Self {
			id: Uuid::new_v4(),
			args: self.args.clone(),
			attempt: self.attempt + 1,
			delay: Some(delay),
		}
	}
}

/// Transport for sync jobs.
#[async_trait]
pub trait JobQueue: Send + Sync {
	fn name(&self) -> &str;

	async fn push(&self, job: QueuedSyncJob) -> SyncResult<()>;
}

/// Tokio worker pool over a flume channel.
pub struct InProcessQueue {
	name: String,
	tx: flume::Sender<QueuedSyncJob>,
	rx: flume::Receiver<QueuedSyncJob>,
	workers: Mutex<Vec<JoinHandle<()>>>,
}

impl InProcessQueue {
	pub fn new(name: impl Into<String>) -> Arc<Self> {
		let (tx, rx) = flume::unbounded();
		Arc::new(Self {
			name: name.into(),
			tx,
			rx,
			workers: Mutex::new(Vec::new()),
		})
	}

	/// Spawn `concurrency` workers draining the queue against `ctx`.
	pub fn start(&self, ctx: Arc<EngineContext>, concurrency: usize) {
		let mut workers = self.workers.lock().expect("worker list poisoned");
		for _ in 0..concurrency.max(1) {
			let rx = self.rx.clone();
			let ctx = ctx.clone();
			workers.push(tokio::spawn(async move {
				while let Ok(job) = rx.recv_async().await {
					super::worker::run_sync_job(&ctx, job).await;
				}
			}));
		}
		info!(queue = %self.name, concurrency, "sync workers started");
	}

	/// Jobs currently waiting in the channel.
	pub fn pending(&self) -> usize {
		self.rx.len()
	}

	/// Abort the worker pool.
	pub fn shutdown(&self) {
		let mut workers = self.workers.lock().expect("worker list poisoned");
		for worker in workers.drain(..) {
			worker.abort();
		}
	}
}

#[async_trait]
impl JobQueue for InProcessQueue {
	fn name(&self) -> &str {
		&self.name
	}

	async fn push(&self, job: QueuedSyncJob) -> SyncResult<()> {
		match job.delay {
			Some(delay) if !delay.is_zero() => {
				let tx = self.tx.clone();
				debug!(job_id = %job.id, ?delay, "scheduling delayed job");
				tokio::spawn(async move {
					tokio::time::sleep(delay).await;
					let _ = tx.send(QueuedSyncJob { delay: None, ..job });
				});
				Ok(())
			}
			_ => self
				.tx
				.send(job)
				.map_err(|_| SyncError::Source("job queue channel closed".into())),
		}
	}
}
