//! Remote deletion helper

use crate::context::EngineContext;
use crate::db::SyncStateStore;
use crate::error::SyncResult;
use crate::record::RecordRef;
use tracing::{debug, info};

/// Result of a remote delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
	/// No SyncState row, or no remote id assigned: nothing to do
	Noop,
	/// The remote record was deleted (2xx)
	Deleted,
	/// The remote record was already gone (404)
	Missing,
}

pub struct Deleter<'a> {
	ctx: &'a EngineContext,
}

impl<'a> Deleter<'a> {
	pub fn new(ctx: &'a EngineContext) -> Self {
		Self { ctx }
	}

	/// Delete the remote counterpart of (record, CRM).
	///
	/// The SyncState row is kept, but `crm_id` and `last_digest` are blanked
	/// so a later sync re-creates the remote record.
	pub async fn delete_remote(
		&self,
		record: &RecordRef,
		crm_name: &str,
	) -> SyncResult<DeleteOutcome> {
		let crm_name = crate::registry::CrmRegistry::canonical_name(crm_name);
		let crm = self.ctx.crm(&crm_name)?;
		let binding = self.ctx.binding(&record.resource_type, &crm_name)?;

		let Some(state) = SyncStateStore::find(&self.ctx.db, record, &crm_name).await? else {
			debug!(%record, %crm_name, "no sync state, delete is a noop");
			return Ok(DeleteOutcome::Noop);
		};
		let Some(crm_id) = state.remote_id().map(str::to_string) else {
			debug!(%record, %crm_name, "no remote id, delete is a noop");
			return Ok(DeleteOutcome::Noop);
		};

		let deleted = crm
			.adapter
			.delete(&crm_id, &binding.crm_object_type)
			.await?;

		SyncStateStore::clear_remote(&self.ctx.db, state).await?;
		info!(%record, %crm_name, %crm_id, deleted, "remote delete finished");

		Ok(if deleted {
			DeleteOutcome::Deleted
		} else {
			DeleteOutcome::Missing
		})
	}
}
