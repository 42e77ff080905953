//! Pending dependency persistence
//!
//! Store-level operations over `etlify_pending_syncs`: idempotent
//! registration of (child, parent, crm) waits and the queries the resolver
//! needs to wake children.

use super::entities::pending_dependency::{self, Entity as PendingSync};
use crate::record::RecordRef;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
	ActiveValue::Set, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
	QueryFilter,
};

pub struct PendingDependencyStore;

impl PendingDependencyStore {
	/// Register a wait. Duplicate inserts are idempotent no-ops; returns
	/// whether a new row was created.
	pub async fn register<C: ConnectionTrait>(
		conn: &C,
		child: &RecordRef,
		parent: &RecordRef,
		crm_name: &str,
	) -> Result<bool, DbErr> {
		let now = Utc::now();
		let row = pending_dependency::ActiveModel {
			dependent_type: Set(child.resource_type.clone()),
			dependent_id: Set(child.resource_id),
			dependency_type: Set(parent.resource_type.clone()),
			dependency_id: Set(parent.resource_id),
			crm_name: Set(crm_name.to_string()),
			created_at: Set(now),
			updated_at: Set(now),
			..Default::default()
		};

		match PendingSync::insert(row)
			.on_conflict(
				OnConflict::columns([
					pending_dependency::Column::DependentType,
					pending_dependency::Column::DependentId,
					pending_dependency::Column::DependencyType,
					pending_dependency::Column::DependencyId,
					pending_dependency::Column::CrmName,
				])
				.do_nothing()
				.to_owned(),
			)
			.exec(conn)
			.await
		{
			Ok(_) => Ok(true),
			Err(DbErr::RecordNotInserted) => Ok(false),
			Err(err) => Err(err),
		}
	}

	/// Whether `child` is waiting on `parent` for this CRM. The reverse
	/// direction of this probe is the synchronizer's cycle check.
	pub async fn exists<C: ConnectionTrait>(
		conn: &C,
		child: &RecordRef,
		parent: &RecordRef,
		crm_name: &str,
	) -> Result<bool, DbErr> {
		let count = PendingSync::find()
			.filter(pending_dependency::Column::DependentType.eq(child.resource_type.as_str()))
			.filter(pending_dependency::Column::DependentId.eq(child.resource_id))
			.filter(pending_dependency::Column::DependencyType.eq(parent.resource_type.as_str()))
			.filter(pending_dependency::Column::DependencyId.eq(parent.resource_id))
			.filter(pending_dependency::Column::CrmName.eq(crm_name))
			.count(conn)
			.await?;
		Ok(count > 0)
	}

	/// All rows waiting on this parent for this CRM.
	pub async fn waiting_on<C: ConnectionTrait>(
		conn: &C,
		parent: &RecordRef,
		crm_name: &str,
	) -> Result<Vec<pending_dependency::Model>, DbErr> {
		PendingSync::find()
			.filter(pending_dependency::Column::DependencyType.eq(parent.resource_type.as_str()))
			.filter(pending_dependency::Column::DependencyId.eq(parent.resource_id))
			.filter(pending_dependency::Column::CrmName.eq(crm_name))
			.all(conn)
			.await
	}

	/// Delete the rows where this parent is awaited, returning how many went.
	pub async fn delete_waiting_on<C: ConnectionTrait>(
		conn: &C,
		parent: &RecordRef,
		crm_name: &str,
	) -> Result<u64, DbErr> {
		let result = PendingSync::delete_many()
			.filter(pending_dependency::Column::DependencyType.eq(parent.resource_type.as_str()))
			.filter(pending_dependency::Column::DependencyId.eq(parent.resource_id))
			.filter(pending_dependency::Column::CrmName.eq(crm_name))
			.exec(conn)
			.await?;
		Ok(result.rows_affected)
	}

	/// Remaining waits held by a child for this CRM.
	pub async fn count_for_child<C: ConnectionTrait>(
		conn: &C,
		child: &RecordRef,
		crm_name: &str,
	) -> Result<u64, DbErr> {
		PendingSync::find()
			.filter(pending_dependency::Column::DependentType.eq(child.resource_type.as_str()))
			.filter(pending_dependency::Column::DependentId.eq(child.resource_id))
			.filter(pending_dependency::Column::CrmName.eq(crm_name))
			.count(conn)
			.await
	}

	/// Drop every wait held by this child for this CRM (stale-row cleanup).
	pub async fn delete_for_child<C: ConnectionTrait>(
		conn: &C,
		child: &RecordRef,
		crm_name: &str,
	) -> Result<u64, DbErr> {
		let result = PendingSync::delete_many()
			.filter(pending_dependency::Column::DependentType.eq(child.resource_type.as_str()))
			.filter(pending_dependency::Column::DependentId.eq(child.resource_id))
			.filter(pending_dependency::Column::CrmName.eq(crm_name))
			.exec(conn)
			.await?;
		Ok(result.rows_affected)
	}

	/// Total row count (used by tests and diagnostics).
	pub async fn count_all<C: ConnectionTrait>(conn: &C) -> Result<u64, DbErr> {
		PendingSync::find().count(conn).await
	}
}
