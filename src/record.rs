//! Record identity and the host-model seam
//!
//! The engine never holds typed host records. A record is identified by a
//! [`RecordRef`]; its table layout is described once per model by a
//! [`ModelDescriptor`]; and everything that needs the actual row (payload
//! building, guards, association traversal) goes through the host-implemented
//! [`RecordSource`] trait. Declarations replace the reflection the engine
//! cannot do.

use crate::digest::Payload;
use crate::error::SyncResult;
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Identity of a local record: (resource_type, resource_id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordRef {
	pub resource_type: String,
	pub resource_id: i64,
}

impl RecordRef {
	pub fn new(resource_type: impl Into<String>, resource_id: i64) -> Self {
		Self {
			resource_type: resource_type.into(),
			resource_id,
		}
	}
}

impl fmt::Display for RecordRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.resource_type, self.resource_id)
	}
}

/// Static description of a syncable model's table layout.
///
/// `crm_id_columns` lists the legacy `<crm_name>_id` columns the table
/// actually exposes; the dependency resolver probes only declared columns.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
	pub resource_type: String,
	pub table: String,
	pub primary_key: String,
	pub timestamp_column: String,
	pub crm_id_columns: Vec<String>,
}

impl ModelDescriptor {
	pub fn new(resource_type: impl Into<String>, table: impl Into<String>) -> Self {
		Self {
			resource_type: resource_type.into(),
			table: table.into(),
			primary_key: "id".into(),
			timestamp_column: "updated_at".into(),
			crm_id_columns: Vec::new(),
		}
	}

	pub fn primary_key(mut self, column: impl Into<String>) -> Self {
		self.primary_key = column.into();
		self
	}

	pub fn timestamp_column(mut self, column: impl Into<String>) -> Self {
		self.timestamp_column = column.into();
		self
	}

	/// Declare a legacy `<crm_name>_id` column present on the table.
	pub fn crm_id_column(mut self, column: impl Into<String>) -> Self {
		self.crm_id_columns.push(column.into());
		self
	}

	/// The legacy remote-id column for a CRM, if the table declares one.
	pub fn legacy_id_column(&self, crm_name: &str) -> Option<&str> {
		let wanted = format!("{crm_name}_id");
		self.crm_id_columns
			.iter()
			.find(|c| **c == wanted)
			.map(String::as_str)
	}
}

/// Host-implemented access to a model's rows.
///
/// One implementation per model. The engine calls these hooks with its own
/// database handle; the host decides how rows are loaded and serialized.
///
/// # Example
///
/// ```rust,ignore
/// struct UserSource;
///
/// #[async_trait]
/// impl RecordSource for UserSource {
///     async fn exists(&self, db: &DatabaseConnection, id: i64) -> SyncResult<bool> {
///         Ok(user::Entity::find_by_id(id).one(db).await?.is_some())
///     }
///
///     async fn payload(
///         &self,
///         db: &DatabaseConnection,
///         id: i64,
///         _crm_name: &str,
///     ) -> SyncResult<Option<Payload>> {
///         let Some(user) = user::Entity::find_by_id(id).one(db).await? else {
///             return Ok(None);
///         };
///         let mut payload = Payload::new();
///         payload.insert("email".into(), user.email.into());
///         Ok(Some(payload))
///     }
/// }
/// ```
#[async_trait]
pub trait RecordSource: Send + Sync {
	/// Whether the record still exists. Workers no-op when it does not.
	async fn exists(&self, db: &DatabaseConnection, id: i64) -> SyncResult<bool>;

	/// Build the CRM payload for a record. `None` when the row is gone.
	async fn payload(
		&self,
		db: &DatabaseConnection,
		id: i64,
		crm_name: &str,
	) -> SyncResult<Option<Payload>>;

	/// Guard predicate. A `false` short-circuits the attempt as skipped.
	async fn sync_if(&self, _db: &DatabaseConnection, _id: i64, _crm_name: &str) -> SyncResult<bool> {
		Ok(true)
	}

	/// Resolve a declared association to the records it currently points at.
	///
	/// Used for `crm_dependencies` and `sync_dependencies`. A `belongs_to`
	/// style association yields zero or one ref; collection associations may
	/// yield many.
	async fn association_records(
		&self,
		_db: &DatabaseConnection,
		_id: i64,
		_association: &str,
	) -> SyncResult<Vec<RecordRef>> {
		Ok(Vec::new())
	}
}

/// Registry of model descriptors, keyed by resource type.
///
/// Mutable during initialization, read-many afterwards.
#[derive(Default)]
pub struct ModelRegistry {
	inner: RwLock<HashMap<String, Arc<ModelDescriptor>>>,
}

impl ModelRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&self, descriptor: ModelDescriptor) {
		let mut inner = self.inner.write().expect("model registry poisoned");
		inner.insert(descriptor.resource_type.clone(), Arc::new(descriptor));
	}

	pub fn get(&self, resource_type: &str) -> Option<Arc<ModelDescriptor>> {
		let inner = self.inner.read().expect("model registry poisoned");
		inner.get(resource_type).cloned()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn legacy_id_column_matches_declared_columns_only() {
		let descriptor = ModelDescriptor::new("Organisation", "organisations")
			.crm_id_column("hubspot_id");

		assert_eq!(descriptor.legacy_id_column("hubspot"), Some("hubspot_id"));
		assert_eq!(descriptor.legacy_id_column("airtable"), None);
	}

	#[test]
	fn registry_lookup_is_exact() {
		let registry = ModelRegistry::new();
		registry.register(ModelDescriptor::new("User", "users"));

		assert!(registry.get("User").is_some());
		// No implicit inheritance for subclassed models
		assert!(registry.get("AdminUser").is_none());
	}
}
