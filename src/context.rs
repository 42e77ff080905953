//! Shared context providing access to the engine's components.
//!
//! Everything the synchronizer, batch runner and job workers need travels
//! through this one struct — there is no hidden process-wide state in the
//! hot path.

use crate::binding::{BindingRegistry, ModelBinding};
use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::jobs::queue::JobQueue;
use crate::jobs::CacheStore;
use crate::record::ModelRegistry;
use crate::registry::{CrmHandle, CrmRegistry};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared context providing access to the engine's components.
pub struct EngineContext {
	pub db: DatabaseConnection,
	pub config: EngineConfig,
	pub crms: CrmRegistry,
	pub models: ModelRegistry,
	pub bindings: BindingRegistry,
	pub cache: Arc<dyn CacheStore>,
	// Wrapped in an RwLock so the queue can be attached after the workers
	// that need this context exist
	queue: RwLock<Option<Arc<dyn JobQueue>>>,
}

impl EngineContext {
	pub fn new(db: DatabaseConnection, config: EngineConfig, cache: Arc<dyn CacheStore>) -> Self {
		Self {
			db,
			config,
			crms: CrmRegistry::new(),
			models: ModelRegistry::new(),
			bindings: BindingRegistry::new(),
			cache,
			queue: RwLock::new(None),
		}
	}

	/// Attach the default job queue after initialization.
	pub async fn set_queue(&self, queue: Arc<dyn JobQueue>) {
		*self.queue.write().await = Some(queue);
	}

	pub async fn get_queue(&self) -> Option<Arc<dyn JobQueue>> {
		self.queue.read().await.clone()
	}

	/// The registered CRM handle, or `UnknownCrm`.
	pub fn crm(&self, crm_name: &str) -> SyncResult<CrmHandle> {
		self.crms
			.fetch(crm_name)
			.ok_or_else(|| SyncError::UnknownCrm(crm_name.to_string()))
	}

	/// The binding for (resource_type, crm_name), or `MissingBinding`.
	pub fn binding(&self, resource_type: &str, crm_name: &str) -> SyncResult<Arc<ModelBinding>> {
		self.bindings
			.get(resource_type, crm_name)
			.ok_or_else(|| SyncError::MissingBinding {
				resource_type: resource_type.to_string(),
				crm_name: crm_name.to_string(),
			})
	}

	/// Error budget for a CRM: the per-CRM option when set, the global
	/// default otherwise.
	pub fn max_sync_errors_for(&self, crm: &CrmHandle) -> u32 {
		crm.options
			.max_sync_errors
			.unwrap_or(self.config.max_sync_errors)
	}
}
