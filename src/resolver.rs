//! Dependency resolver
//!
//! Tracks which children wait on which parents per CRM, and wakes children
//! once the parent they were missing has a remote id. A dependency is
//! satisfied by a SyncState row with a remote id, or by a declared legacy
//! `<crm_name>_id` column on the parent's own table.

use crate::binding::ModelBinding;
use crate::context::EngineContext;
use crate::db::{PendingDependencyStore, SyncStateStore};
use crate::error::SyncResult;
use crate::record::RecordRef;
use sea_orm::{ConnectionTrait, DbBackend, Statement};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Result of a dependency check.
#[derive(Debug)]
pub struct DependencyCheck {
	pub missing_parents: Vec<RecordRef>,
}

impl DependencyCheck {
	pub fn satisfied(&self) -> bool {
		self.missing_parents.is_empty()
	}
}

pub struct DependencyResolver<'a> {
	ctx: &'a EngineContext,
}

impl<'a> DependencyResolver<'a> {
	pub fn new(ctx: &'a EngineContext) -> Self {
		Self { ctx }
	}

	/// Collect the parents behind the named associations that do not yet
	/// have a remote id in this CRM.
	pub async fn check(
		&self,
		binding: &ModelBinding,
		record: &RecordRef,
		associations: &[String],
	) -> SyncResult<DependencyCheck> {
		let mut missing = Vec::new();
		let mut seen = HashSet::new();

		for association in associations {
			let parents = binding
				.source
				.association_records(&self.ctx.db, record.resource_id, association)
				.await?;

			for parent in parents {
				if !seen.insert(parent.clone()) {
					continue;
				}
				if !self.satisfied(&parent, &binding.crm_name).await? {
					missing.push(parent);
				}
			}
		}

		Ok(DependencyCheck {
			missing_parents: missing,
		})
	}

	/// Whether `parent` already has a remote id in `crm_name`.
	pub async fn satisfied(&self, parent: &RecordRef, crm_name: &str) -> SyncResult<bool> {
		if let Some(state) = SyncStateStore::find(&self.ctx.db, parent, crm_name).await? {
			if state.remote_id().is_some() {
				return Ok(true);
			}
		}
		self.legacy_id_present(parent, crm_name).await
	}

	/// Probe the declared legacy `<crm_name>_id` column on the parent's own
	/// table. Models that declare no such column always probe false.
	async fn legacy_id_present(&self, parent: &RecordRef, crm_name: &str) -> SyncResult<bool> {
		let Some(descriptor) = self.ctx.models.get(&parent.resource_type) else {
			return Ok(false);
		};
		let Some(column) = descriptor.legacy_id_column(crm_name) else {
			return Ok(false);
		};

		let backend = self.ctx.db.get_database_backend();
		let placeholder = match backend {
			DbBackend::Postgres => "$1",
			_ => "?",
		};
		let sql = format!(
			"SELECT {column} FROM {table} WHERE {pk} = {placeholder}",
			table = descriptor.table,
			pk = descriptor.primary_key,
		);

		let row = self
			.ctx
			.db
			.query_one(Statement::from_sql_and_values(
				backend,
				&sql,
				vec![parent.resource_id.into()],
			))
			.await?;

		let Some(row) = row else {
			return Ok(false);
		};

		// The column type is the host's choice; accept text or integer ids
		let value: Option<String> = match row.try_get::<Option<String>>("", column) {
			Ok(value) => value,
			Err(_) => row
				.try_get::<Option<i64>>("", column)
				.ok()
				.flatten()
				.map(|v| v.to_string()),
		};

		Ok(value.is_some_and(|v| !v.is_empty()))
	}

	/// Idempotently record one pending row per missing parent.
	pub async fn register_pending<C: ConnectionTrait>(
		&self,
		conn: &C,
		record: &RecordRef,
		crm_name: &str,
		missing_parents: &[RecordRef],
	) -> SyncResult<()> {
		for parent in missing_parents {
			PendingDependencyStore::register(conn, record, parent, crm_name).await?;
		}
		Ok(())
	}

	/// Wake children waiting on `parent`: delete the matching rows, and
	/// enqueue every child whose remaining pending count dropped to zero.
	pub async fn resolve_dependents(
		&self,
		parent: &RecordRef,
		crm_name: &str,
	) -> SyncResult<Vec<RecordRef>> {
		let rows = PendingDependencyStore::waiting_on(&self.ctx.db, parent, crm_name).await?;
		if rows.is_empty() {
			return Ok(Vec::new());
		}

		PendingDependencyStore::delete_waiting_on(&self.ctx.db, parent, crm_name).await?;

		let mut children: Vec<RecordRef> = Vec::new();
		let mut seen = HashSet::new();
		for row in rows {
			let child = RecordRef::new(row.dependent_type, row.dependent_id);
			if seen.insert(child.clone()) {
				children.push(child);
			}
		}

		let mut woken = Vec::new();
		for child in children {
			let remaining =
				PendingDependencyStore::count_for_child(&self.ctx.db, &child, crm_name).await?;
			if remaining > 0 {
				debug!(%child, crm_name, remaining, "child still waiting on other parents");
				continue;
			}

			match crate::jobs::enqueue_sync(self.ctx, &child, crm_name).await {
				Ok(_) => woken.push(child),
				Err(err) => {
					warn!(%child, crm_name, %err, "failed to enqueue rewoken child")
				}
			}
		}

		Ok(woken)
	}

	/// Unconditionally drop every wait held by this child for this CRM.
	pub async fn cleanup_for_child(&self, child: &RecordRef, crm_name: &str) -> SyncResult<u64> {
		Ok(PendingDependencyStore::delete_for_child(&self.ctx.db, child, crm_name).await?)
	}
}
