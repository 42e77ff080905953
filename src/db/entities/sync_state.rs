//! Sync state entity
//!
//! One row per (resource_type, resource_id, crm_name): the remote id, the
//! digest of the last successfully upserted payload, and the error ledger.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "crm_synchronisations")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,
	pub crm_name: String,
	pub crm_id: Option<String>,
	pub last_digest: Option<String>,
	pub last_synced_at: Option<DateTimeUtc>,
	pub last_error: Option<String>,
	pub error_count: i32,
	pub resource_type: String,
	pub resource_id: i64,
	pub created_at: DateTimeUtc,
	pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
	/// The remote id, treating the empty string as absent.
	pub fn remote_id(&self) -> Option<&str> {
		match self.crm_id.as_deref() {
			Some("") | None => None,
			Some(id) => Some(id),
		}
	}
}
