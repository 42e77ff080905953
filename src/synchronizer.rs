//! The per-(record, CRM) sync pipeline
//!
//! One attempt walks: guard → hard dependencies → soft dependencies →
//! payload/digest → row lock → digest compare → adapter → state update →
//! post-hooks. Local terminal outcomes never raise; failures in the locked
//! section persist `{last_error, error_count + 1}` and propagate to the
//! caller (the job worker folds them into the retry policy, inline callers
//! see them raised).
//!
//! Host hooks (payload building, guards, association reads) run on the
//! pooled connection; the row transaction covers only the digest compare,
//! the adapter call and the state write — the section mutual exclusion
//! exists to protect.

use crate::binding::ModelBinding;
use crate::context::EngineContext;
use crate::db::entities::sync_state;
use crate::db::{PendingDependencyStore, SyncStateStore};
use crate::digest::Payload;
use crate::error::{SyncError, SyncResult};
use crate::record::RecordRef;
use crate::registry::CrmHandle;
use crate::resolver::DependencyResolver;
use sea_orm::{DatabaseTransaction, TransactionTrait};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Terminal result of a single sync attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
	/// Guard denied; error ledger reset
	Skipped,
	/// Hard dependencies missing; pending rows written, parents enqueued
	Deferred { missing: Vec<RecordRef> },
	/// Soft dependencies missing; pending rows written, parents enqueued
	Buffered { missing: Vec<RecordRef> },
	/// Digest matched the stored one; timestamp touched
	NotModified,
	/// Remote upsert performed
	Synced { crm_id: String },
}

pub struct Synchronizer<'a> {
	ctx: &'a EngineContext,
}

impl<'a> Synchronizer<'a> {
	pub fn new(ctx: &'a EngineContext) -> Self {
		Self { ctx }
	}

	/// Run one sync attempt for (record, CRM).
	pub async fn sync(&self, record: &RecordRef, crm_name: &str) -> SyncResult<AttemptOutcome> {
		let crm_name = crate::registry::CrmRegistry::canonical_name(crm_name);
		let crm = self.ctx.crm(&crm_name)?;
		let binding = self.ctx.binding(&record.resource_type, &crm_name)?;
		let resolver = DependencyResolver::new(self.ctx);

		// Guard: a false short-circuits the attempt and resets the ledger
		if !binding
			.source
			.sync_if(&self.ctx.db, record.resource_id, &crm_name)
			.await?
		{
			let state = SyncStateStore::find_or_create(&self.ctx.db, record, &crm_name).await?;
			SyncStateStore::reset_for_skip(&self.ctx.db, state).await?;
			debug!(%record, %crm_name, "guard denied, attempt skipped");
			return Ok(AttemptOutcome::Skipped);
		}

		// Hard dependencies: missing parents defer the attempt
		let check = resolver
			.check(&binding, record, &binding.crm_dependencies)
			.await?;
		if !check.satisfied() {
			resolver
				.register_pending(&self.ctx.db, record, &crm_name, &check.missing_parents)
				.await?;
			self.enqueue_parents(&crm_name, &check.missing_parents).await;
			info!(
				%record,
				%crm_name,
				missing = check.missing_parents.len(),
				"hard dependencies missing, attempt deferred"
			);
			return Ok(AttemptOutcome::Deferred {
				missing: check.missing_parents,
			});
		}

		// Soft dependencies: buffer unless the wait would be cyclic
		let buffered = self
			.missing_sync_dependencies(&binding, record, &crm_name)
			.await?;
		if !buffered.is_empty() {
			resolver
				.register_pending(&self.ctx.db, record, &crm_name, &buffered)
				.await?;
			self.enqueue_parents(&crm_name, &buffered).await;
			info!(
				%record,
				%crm_name,
				missing = buffered.len(),
				"soft dependencies missing, attempt buffered"
			);
			return Ok(AttemptOutcome::Buffered { missing: buffered });
		}

		// Payload is built exactly once per attempt, digest computed once
		let payload = binding
			.source
			.payload(&self.ctx.db, record.resource_id, &crm_name)
			.await?
			.ok_or_else(|| SyncError::RecordMissing {
				resource_type: record.resource_type.clone(),
				resource_id: record.resource_id,
			})?;
		let digest = self.ctx.config.digest_strategy.digest(&payload);

		// Locked section: concurrent attempts for the same (record, CRM)
		// serialize here
		let txn = self.ctx.db.begin().await?;
		let state = SyncStateStore::lock(&txn, record, &crm_name).await?;

		match Self::locked_attempt(&txn, &binding, &crm, record, &crm_name, state, &payload, &digest)
			.await
		{
			Ok(outcome) => {
				txn.commit().await?;

				if matches!(
					outcome,
					AttemptOutcome::Synced { .. } | AttemptOutcome::NotModified
				) {
					resolver.cleanup_for_child(record, &crm_name).await?;
					resolver.resolve_dependents(record, &crm_name).await?;
				}

				Ok(outcome)
			}
			Err(err) => {
				let message = err.to_string();
				if let Err(persist_err) =
					Self::persist_failure(txn, record, &crm_name, &message).await
				{
					warn!(%record, %crm_name, %persist_err, "failed to persist sync failure");
				}
				Err(err)
			}
		}
	}

	/// Digest compare, adapter call and state write, under the row lock.
	#[allow(clippy::too_many_arguments)]
	async fn locked_attempt(
		txn: &DatabaseTransaction,
		binding: &Arc<ModelBinding>,
		crm: &CrmHandle,
		record: &RecordRef,
		crm_name: &str,
		state: sync_state::Model,
		payload: &Payload,
		digest: &str,
	) -> SyncResult<AttemptOutcome> {
		if state.last_digest.as_deref() == Some(digest) {
			SyncStateStore::touch(txn, state).await?;
			debug!(%record, crm_name, "digest unchanged, remote untouched");
			return Ok(AttemptOutcome::NotModified);
		}

		let adapter_id = crm
			.adapter
			.upsert(
				payload,
				binding.id_property.as_deref(),
				&binding.crm_object_type,
			)
			.await?;

		let updated = SyncStateStore::mark_synced(txn, state, &adapter_id, digest).await?;
		let crm_id = updated
			.remote_id()
			.map(str::to_string)
			.unwrap_or(adapter_id);

		info!(%record, crm_name, %crm_id, "record synced");
		Ok(AttemptOutcome::Synced { crm_id })
	}

	/// Soft-dependency parents that lack a remote id, minus cyclic waits.
	async fn missing_sync_dependencies(
		&self,
		binding: &Arc<ModelBinding>,
		record: &RecordRef,
		crm_name: &str,
	) -> SyncResult<Vec<RecordRef>> {
		let resolver = DependencyResolver::new(self.ctx);
		let mut missing = Vec::new();
		let mut seen = HashSet::new();

		for association in &binding.sync_dependencies {
			let parents = binding
				.source
				.association_records(&self.ctx.db, record.resource_id, association)
				.await?;

			for parent in parents {
				if !seen.insert(parent.clone()) {
					continue;
				}
				if resolver.satisfied(&parent, crm_name).await? {
					continue;
				}
				// Cycle: the parent is already waiting on this record — do
				// not wait back, proceed without it
				if PendingDependencyStore::exists(&self.ctx.db, &parent, record, crm_name).await? {
					debug!(%record, %parent, crm_name, "cyclic wait detected, proceeding");
					continue;
				}
				missing.push(parent);
			}
		}

		Ok(missing)
	}

	async fn persist_failure(
		txn: DatabaseTransaction,
		record: &RecordRef,
		crm_name: &str,
		message: &str,
	) -> SyncResult<()> {
		SyncStateStore::record_failure(&txn, record, crm_name, message).await?;
		txn.commit().await?;
		Ok(())
	}

	/// Enqueue syncs for missing parents that are themselves bound to this
	/// CRM. Unbound parents (e.g. legacy-column models) are skipped.
	async fn enqueue_parents(&self, crm_name: &str, parents: &[RecordRef]) {
		for parent in parents {
			if self
				.ctx
				.bindings
				.get(&parent.resource_type, crm_name)
				.is_none()
			{
				warn!(%parent, crm_name, "missing parent has no binding, not enqueued");
				continue;
			}
			if let Err(err) = crate::jobs::enqueue_sync(self.ctx, parent, crm_name).await {
				warn!(%parent, crm_name, %err, "failed to enqueue parent sync");
			}
		}
	}
}
