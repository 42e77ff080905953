//! Etlify
//!
//! A CRM mirroring engine: synchronizes records from a relational
//! application store into external CRM back-ends, with content-digest
//! idempotence, per-record locking, dependency ordering, bounded retry and
//! SQL-level stale discovery.

pub mod adapter;
pub mod batch;
pub mod binding;
pub mod config;
pub mod context;
pub mod db;
pub mod deleter;
pub mod digest;
pub mod error;
pub mod jobs;
pub mod record;
pub mod registry;
pub mod resolver;
pub mod stale;
pub mod synchronizer;
pub mod testing;

pub use adapter::{AdapterError, CrmAdapter};
pub use batch::{BatchSync, BatchSyncOptions, BatchSyncStats};
pub use binding::{Association, BindingRegistry, ModelBinding, SourceJoin, ThroughHop};
pub use config::EngineConfig;
pub use context::EngineContext;
pub use deleter::{DeleteOutcome, Deleter};
pub use digest::{DigestStrategy, Payload, Sha256CanonicalJson};
pub use error::{SyncError, SyncResult};
pub use jobs::{CacheStore, InMemoryCacheStore, InProcessQueue, JobQueue, SyncJobArgs};
pub use record::{ModelDescriptor, RecordRef, RecordSource};
pub use registry::{CrmOptions, CrmRegistry};
pub use stale::StaleFinder;
pub use synchronizer::{AttemptOutcome, Synchronizer};

use crate::db::Database;
use sea_orm::DatabaseConnection;
use std::sync::{Arc, Mutex};
use tracing::info;

/// The engine facade: wires configuration, registries, cache, database and
/// queue into one [`EngineContext`] and offers passthroughs for the common
/// operations.
pub struct Engine {
	ctx: Arc<EngineContext>,
	workers: Mutex<Option<Arc<InProcessQueue>>>,
}

impl Engine {
	pub fn builder() -> EngineBuilder {
		EngineBuilder {
			db: None,
			config: EngineConfig::default(),
			cache: None,
		}
	}

	/// Connect to the store, run the engine's migrations, and build with
	/// defaults.
	pub async fn connect(url: &str) -> SyncResult<Self> {
		let database = Database::connect(url).await?;
		database.migrate().await?;
		Self::builder().database(database.into_conn()).build()
	}

	/// The shared context. Registration of CRMs, models and bindings goes
	/// through its `crms` / `models` / `bindings` fields.
	pub fn context(&self) -> Arc<EngineContext> {
		self.ctx.clone()
	}

	/// Start the default in-process queue and its workers.
	pub async fn start_workers(&self) {
		let queue = InProcessQueue::new(self.ctx.config.job_queue_name.clone());
		self.ctx.set_queue(queue.clone()).await;
		queue.start(self.ctx.clone(), self.ctx.config.worker_concurrency);
		*self.workers.lock().expect("worker slot poisoned") = Some(queue);
	}

	/// Run one sync attempt inline; errors are raised to the caller.
	pub async fn sync(&self, record: &RecordRef, crm_name: &str) -> SyncResult<AttemptOutcome> {
		Synchronizer::new(&self.ctx).sync(record, crm_name).await
	}

	/// Enqueue one sync attempt, deduplicated by the TTL lock.
	pub async fn enqueue_sync(&self, record: &RecordRef, crm_name: &str) -> SyncResult<bool> {
		jobs::enqueue_sync(&self.ctx, record, crm_name).await
	}

	/// Walk stale records and enqueue or sync them.
	pub async fn batch_sync(&self, options: BatchSyncOptions) -> SyncResult<BatchSyncStats> {
		BatchSync::new(&self.ctx).run(options).await
	}

	/// Delete the remote counterpart of (record, CRM).
	pub async fn delete_remote(
		&self,
		record: &RecordRef,
		crm_name: &str,
	) -> SyncResult<DeleteOutcome> {
		Deleter::new(&self.ctx).delete_remote(record, crm_name).await
	}

	/// Stop the worker pool, if one was started.
	pub async fn shutdown(&self) {
		if let Some(queue) = self.workers.lock().expect("worker slot poisoned").take() {
			queue.shutdown();
			info!("sync workers stopped");
		}
	}
}

pub struct EngineBuilder {
	db: Option<DatabaseConnection>,
	config: EngineConfig,
	cache: Option<Arc<dyn CacheStore>>,
}

impl EngineBuilder {
	pub fn database(mut self, db: DatabaseConnection) -> Self {
		self.db = Some(db);
		self
	}

	pub fn config(mut self, config: EngineConfig) -> Self {
		self.config = config;
		self
	}

	pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
		self.cache = Some(cache);
		self
	}

	pub fn build(self) -> SyncResult<Engine> {
		let db = self
			.db
			.ok_or_else(|| SyncError::Source("engine requires a database connection".into()))?;
		let cache = self
			.cache
			.unwrap_or_else(|| Arc::new(InMemoryCacheStore::new()));

		let ctx = Arc::new(EngineContext::new(db, self.config, cache));
		Ok(Engine {
			ctx,
			workers: Mutex::new(None),
		})
	}
}
