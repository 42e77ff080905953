//! Model bindings
//!
//! A binding is the immutable per-(model, CRM) configuration: serializer
//! seam, object type, id property, guard, dependency declarations, stale
//! scope, and an optional queue override. Bindings are declared with a
//! builder and validated when registered — static declaration replaces the
//! source system's per-class metaprogramming.

pub mod association;

pub use association::{Association, SourceJoin, ThroughHop, TypePredicate};

use crate::error::{SyncError, SyncResult};
use crate::jobs::queue::JobQueue;
use crate::record::{ModelDescriptor, RecordSource};
use sea_orm::DbBackend;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// SQL-producing predicate restricting stale-finder candidates.
///
/// Evaluated against the unaliased host table; hosts embed
/// `id IN (SELECT …)` subqueries for join-shaped scopes.
pub type StaleScope = Arc<dyn Fn(DbBackend) -> String + Send + Sync>;

/// Immutable per-(model, CRM) configuration.
pub struct ModelBinding {
	pub model: Arc<ModelDescriptor>,
	pub crm_name: String,
	pub crm_object_type: String,
	pub id_property: Option<String>,
	pub source: Arc<dyn RecordSource>,
	/// Associations whose timestamps propagate into staleness.
	pub dependencies: Vec<Association>,
	/// Association names that must have a remote id before this record
	/// syncs; missing parents defer the attempt.
	pub crm_dependencies: Vec<String>,
	/// Association names checked after the row lock; missing parents buffer
	/// the attempt unless the wait would be cyclic.
	pub sync_dependencies: Vec<String>,
	pub stale_scope: Option<StaleScope>,
	pub queue: Option<Arc<dyn JobQueue>>,
}

impl ModelBinding {
	pub fn builder(
		model: Arc<ModelDescriptor>,
		crm_name: impl Into<String>,
		source: Arc<dyn RecordSource>,
	) -> ModelBindingBuilder {
		ModelBindingBuilder {
			model,
			crm_name: crm_name.into(),
			crm_object_type: None,
			id_property: None,
			source,
			dependencies: Vec::new(),
			crm_dependencies: Vec::new(),
			sync_dependencies: Vec::new(),
			stale_scope: None,
			queue: None,
		}
	}

	pub fn resource_type(&self) -> &str {
		&self.model.resource_type
	}
}

pub struct ModelBindingBuilder {
	model: Arc<ModelDescriptor>,
	crm_name: String,
	crm_object_type: Option<String>,
	id_property: Option<String>,
	source: Arc<dyn RecordSource>,
	dependencies: Vec<Association>,
	crm_dependencies: Vec<String>,
	sync_dependencies: Vec<String>,
	stale_scope: Option<StaleScope>,
	queue: Option<Arc<dyn JobQueue>>,
}

impl ModelBindingBuilder {
	pub fn object_type(mut self, object_type: impl Into<String>) -> Self {
		self.crm_object_type = Some(object_type.into());
		self
	}

	pub fn id_property(mut self, property: impl Into<String>) -> Self {
		self.id_property = Some(property.into());
		self
	}

	pub fn dependency(mut self, association: Association) -> Self {
		self.dependencies.push(association);
		self
	}

	pub fn crm_dependency(mut self, association: impl Into<String>) -> Self {
		self.crm_dependencies.push(association.into());
		self
	}

	pub fn sync_dependency(mut self, association: impl Into<String>) -> Self {
		self.sync_dependencies.push(association.into());
		self
	}

	pub fn stale_scope<F>(mut self, scope: F) -> Self
	where
		F: Fn(DbBackend) -> String + Send + Sync + 'static,
	{
		self.stale_scope = Some(Arc::new(scope));
		self
	}

	pub fn queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
		self.queue = Some(queue);
		self
	}

	pub fn build(self) -> SyncResult<ModelBinding> {
		let invalid = |reason: &str| SyncError::InvalidBinding {
			resource_type: self.model.resource_type.clone(),
			crm_name: self.crm_name.clone(),
			reason: reason.into(),
		};

		let crm_object_type = self
			.crm_object_type
			.clone()
			.ok_or_else(|| invalid("crm_object_type is required"))?;
		if crm_object_type.is_empty() {
			return Err(invalid("crm_object_type must not be empty"));
		}

		let mut seen = std::collections::HashSet::new();
		for association in &self.dependencies {
			if !seen.insert(association.name().to_string()) {
				return Err(invalid(&format!(
					"duplicate dependency association '{}'",
					association.name()
				)));
			}
		}

		Ok(ModelBinding {
			model: self.model,
			crm_name: crate::registry::CrmRegistry::canonical_name(&self.crm_name),
			crm_object_type,
			id_property: self.id_property,
			source: self.source,
			dependencies: self.dependencies,
			crm_dependencies: self.crm_dependencies,
			sync_dependencies: self.sync_dependencies,
			stale_scope: self.stale_scope,
			queue: self.queue,
		})
	}
}

/// Registry of bindings keyed by (resource_type, crm_name).
///
/// Lookup is exact: a subclassed model participates only if it declares its
/// own binding, never through a parent's.
#[derive(Default)]
pub struct BindingRegistry {
	inner: RwLock<HashMap<(String, String), Arc<ModelBinding>>>,
}

impl BindingRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&self, binding: ModelBinding) {
		let key = (
			binding.model.resource_type.clone(),
			binding.crm_name.clone(),
		);
		let mut inner = self.inner.write().expect("binding registry poisoned");
		if inner.insert(key.clone(), Arc::new(binding)).is_some() {
			warn!(
				resource_type = %key.0,
				crm_name = %key.1,
				"binding re-registered, previous entry replaced"
			);
		}
	}

	pub fn get(&self, resource_type: &str, crm_name: &str) -> Option<Arc<ModelBinding>> {
		let inner = self.inner.read().expect("binding registry poisoned");
		inner
			.get(&(
				resource_type.to_string(),
				crate::registry::CrmRegistry::canonical_name(crm_name),
			))
			.cloned()
	}

	/// All bindings, ordered by (resource_type, crm_name) for deterministic
	/// batch walks.
	pub fn all(&self) -> Vec<Arc<ModelBinding>> {
		let inner = self.inner.read().expect("binding registry poisoned");
		let mut bindings: Vec<Arc<ModelBinding>> = inner.values().cloned().collect();
		bindings.sort_by(|a, b| {
			(a.resource_type(), a.crm_name.as_str()).cmp(&(b.resource_type(), b.crm_name.as_str()))
		});
		bindings
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::digest::Payload;
	use crate::error::SyncResult;
	use async_trait::async_trait;
	use sea_orm::DatabaseConnection;

	struct NoopSource;

	#[async_trait]
	impl RecordSource for NoopSource {
		async fn exists(&self, _db: &DatabaseConnection, _id: i64) -> SyncResult<bool> {
			Ok(true)
		}

		async fn payload(
			&self,
			_db: &DatabaseConnection,
			_id: i64,
			_crm_name: &str,
		) -> SyncResult<Option<Payload>> {
			Ok(Some(Payload::new()))
		}
	}

	fn descriptor() -> Arc<ModelDescriptor> {
		Arc::new(ModelDescriptor::new("User", "users"))
	}

	#[test]
	fn build_requires_object_type() {
		let result = ModelBinding::builder(descriptor(), "hubspot", Arc::new(NoopSource)).build();
		assert!(matches!(result, Err(SyncError::InvalidBinding { .. })));
	}

	#[test]
	fn build_rejects_duplicate_dependency_names() {
		let result = ModelBinding::builder(descriptor(), "hubspot", Arc::new(NoopSource))
			.object_type("contacts")
			.dependency(Association::belongs_to("organisation", "organisations", "organisation_id"))
			.dependency(Association::has_many("organisation", "organisations", "user_id"))
			.build();
		assert!(matches!(result, Err(SyncError::InvalidBinding { .. })));
	}

	#[test]
	fn registry_lookup_normalizes_crm_name_only() {
		let registry = BindingRegistry::new();
		let binding = ModelBinding::builder(descriptor(), "HubSpot", Arc::new(NoopSource))
			.object_type("contacts")
			.build()
			.unwrap();
		registry.register(binding);

		assert!(registry.get("User", "hubspot").is_some());
		assert!(registry.get("User", "HUBSPOT").is_some());
		assert!(registry.get("user", "hubspot").is_none());
	}
}
