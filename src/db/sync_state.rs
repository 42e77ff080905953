//! Sync state persistence
//!
//! Store-level operations over `crm_synchronisations`. Everything is generic
//! over `ConnectionTrait` so the synchronizer can run them inside its row
//! transaction.

use super::entities::sync_state::{self, Entity as SyncState};
use crate::record::RecordRef;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
	ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DbBackend, DbErr,
	EntityTrait, IntoActiveModel, QueryFilter, Statement,
};

fn non_blank(value: Option<&str>) -> Option<String> {
	match value {
		Some("") | None => None,
		Some(v) => Some(v.to_string()),
	}
}

pub struct SyncStateStore;

impl SyncStateStore {
	pub async fn find<C: ConnectionTrait>(
		conn: &C,
		record: &RecordRef,
		crm_name: &str,
	) -> Result<Option<sync_state::Model>, DbErr> {
		SyncState::find()
			.filter(sync_state::Column::ResourceType.eq(record.resource_type.as_str()))
			.filter(sync_state::Column::ResourceId.eq(record.resource_id))
			.filter(sync_state::Column::CrmName.eq(crm_name))
			.one(conn)
			.await
	}

	/// Fetch the row, creating it lazily on first attempt.
	pub async fn find_or_create<C: ConnectionTrait>(
		conn: &C,
		record: &RecordRef,
		crm_name: &str,
	) -> Result<sync_state::Model, DbErr> {
		if let Some(existing) = Self::find(conn, record, crm_name).await? {
			return Ok(existing);
		}

		let now = Utc::now();
		let row = sync_state::ActiveModel {
			crm_name: Set(crm_name.to_string()),
			resource_type: Set(record.resource_type.clone()),
			resource_id: Set(record.resource_id),
			error_count: Set(0),
			created_at: Set(now),
			updated_at: Set(now),
			..Default::default()
		};

		// A concurrent attempt may have created the row between the probe and
		// the insert; the unique index makes the insert a no-op in that case.
		match SyncState::insert(row)
			.on_conflict(
				OnConflict::columns([
					sync_state::Column::ResourceType,
					sync_state::Column::ResourceId,
					sync_state::Column::CrmName,
				])
				.do_nothing()
				.to_owned(),
			)
			.exec(conn)
			.await
		{
			Ok(_) | Err(DbErr::RecordNotInserted) => {}
			Err(err) => return Err(err),
		}

		Self::find(conn, record, crm_name)
			.await?
			.ok_or_else(|| DbErr::Custom("sync state row vanished after insert".into()))
	}

	/// Fetch-or-create the row and take the per-record lock.
	///
	/// On Postgres this is `SELECT … FOR UPDATE`, blocking concurrent
	/// attempts for the same (record, CRM) until the transaction ends. SQLite
	/// has no row locks, but its single-writer transactions give the same
	/// serialization.
	pub async fn lock<C: ConnectionTrait>(
		conn: &C,
		record: &RecordRef,
		crm_name: &str,
	) -> Result<sync_state::Model, DbErr> {
		let state = Self::find_or_create(conn, record, crm_name).await?;

		if conn.get_database_backend() == DbBackend::Postgres {
			conn.execute(Statement::from_sql_and_values(
				DbBackend::Postgres,
				"SELECT id FROM crm_synchronisations \
				 WHERE resource_type = $1 AND resource_id = $2 AND crm_name = $3 \
				 FOR UPDATE",
				vec![
					record.resource_type.clone().into(),
					record.resource_id.into(),
					crm_name.into(),
				],
			))
			.await?;

			// Re-read: the row may have changed while we waited for the lock
			return Self::find(conn, record, crm_name)
				.await?
				.ok_or_else(|| DbErr::Custom("sync state row vanished under lock".into()));
		}

		Ok(state)
	}

	/// Persist a successful upsert.
	///
	/// An already-assigned `crm_id` is never overwritten — in particular not
	/// by a blank adapter result.
	pub async fn mark_synced<C: ConnectionTrait>(
		conn: &C,
		state: sync_state::Model,
		adapter_crm_id: &str,
		digest: &str,
	) -> Result<sync_state::Model, DbErr> {
		let now = Utc::now();
		let crm_id = state
			.remote_id()
			.map(str::to_string)
			.or_else(|| non_blank(Some(adapter_crm_id)));

		let mut row = state.into_active_model();
		row.crm_id = Set(crm_id);
		row.last_digest = Set(Some(digest.to_string()));
		row.last_synced_at = Set(Some(now));
		row.last_error = Set(None);
		row.error_count = Set(0);
		row.updated_at = Set(now);
		row.update(conn).await
	}

	/// Touch `last_synced_at` without changing the digest (digest match).
	pub async fn touch<C: ConnectionTrait>(
		conn: &C,
		state: sync_state::Model,
	) -> Result<sync_state::Model, DbErr> {
		let now = Utc::now();
		let mut row = state.into_active_model();
		row.last_synced_at = Set(Some(now));
		row.updated_at = Set(now);
		row.update(conn).await
	}

	/// Guard-denied attempt: reset the error ledger and touch the timestamp.
	pub async fn reset_for_skip<C: ConnectionTrait>(
		conn: &C,
		state: sync_state::Model,
	) -> Result<sync_state::Model, DbErr> {
		let now = Utc::now();
		let mut row = state.into_active_model();
		row.last_error = Set(None);
		row.error_count = Set(0);
		row.last_synced_at = Set(Some(now));
		row.updated_at = Set(now);
		row.update(conn).await
	}

	/// Persist a failed attempt: keep the message, bump the counter.
	pub async fn record_failure<C: ConnectionTrait>(
		conn: &C,
		record: &RecordRef,
		crm_name: &str,
		message: &str,
	) -> Result<sync_state::Model, DbErr> {
		let state = Self::find_or_create(conn, record, crm_name).await?;
		let now = Utc::now();
		let error_count = state.error_count + 1;

		let mut row = state.into_active_model();
		row.last_error = Set(Some(message.to_string()));
		row.error_count = Set(error_count);
		row.updated_at = Set(now);
		row.update(conn).await
	}

	/// Deleter housekeeping: blank the remote id and digest so a later sync
	/// re-creates the remote record. The row itself is kept.
	pub async fn clear_remote<C: ConnectionTrait>(
		conn: &C,
		state: sync_state::Model,
	) -> Result<sync_state::Model, DbErr> {
		let mut row = state.into_active_model();
		row.crm_id = Set(None);
		row.last_digest = Set(None);
		row.updated_at = Set(Utc::now());
		row.update(conn).await
	}
}
