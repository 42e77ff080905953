//! Pending dependency entity
//!
//! One row per (child, parent, crm_name): the child waits until the parent
//! has a remote id in that CRM.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "etlify_pending_syncs")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,
	pub dependent_type: String,
	pub dependent_id: i64,
	pub dependency_type: String,
	pub dependency_id: i64,
	pub crm_name: String,
	pub created_at: DateTimeUtc,
	pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
