//! Synchronizer pipeline: digest idempotence, guard handling, state
//! bookkeeping, error accounting.

mod common;

use common::*;
use etlify::db::SyncStateStore;
use etlify::{AdapterError, AttemptOutcome, ModelBinding, SyncError};
use std::sync::Arc;

async fn register_user_binding(harness: &Harness) {
	let binding = ModelBinding::builder(
		Arc::new(user_descriptor()),
		"hubspot",
		Arc::new(UserSource),
	)
	.object_type("contacts")
	.id_property("email")
	.build()
	.unwrap();
	harness.ctx.bindings.register(binding);
}

#[tokio::test]
async fn sync_twice_upserts_once() {
	let harness = harness().await;
	register_user_binding(&harness).await;

	let id = insert_user(&harness.ctx.db, UserRow::with_email("a@b")).await;
	let record = harness.user(id);

	let first = harness.engine.sync(&record, "hubspot").await.unwrap();
	let second = harness.engine.sync(&record, "hubspot").await.unwrap();

	assert_eq!(
		first,
		AttemptOutcome::Synced {
			crm_id: "crm-1".into()
		}
	);
	assert_eq!(second, AttemptOutcome::NotModified);
	assert_eq!(harness.adapter.upsert_count(), 1);

	let state = SyncStateStore::find(&harness.ctx.db, &record, "hubspot")
		.await
		.unwrap()
		.unwrap();
	assert_eq!(state.crm_id.as_deref(), Some("crm-1"));
	assert!(state.last_digest.is_some());
	assert!(state.last_synced_at.is_some());
	assert_eq!(state.error_count, 0);
}

#[tokio::test]
async fn changed_payload_upserts_again() {
	let harness = harness().await;
	register_user_binding(&harness).await;

	let id = insert_user(&harness.ctx.db, UserRow::with_email("a@b")).await;
	let record = harness.user(id);

	harness.engine.sync(&record, "hubspot").await.unwrap();
	set_user_email(&harness.ctx.db, id, "new@b").await;
	let outcome = harness.engine.sync(&record, "hubspot").await.unwrap();

	assert!(matches!(outcome, AttemptOutcome::Synced { .. }));
	assert_eq!(harness.adapter.upsert_count(), 2);
}

#[tokio::test]
async fn payload_reaches_the_adapter_with_binding_settings() {
	let harness = harness().await;
	register_user_binding(&harness).await;

	let mut row = UserRow::with_email("a@b");
	row.name = Some("Ada".into());
	let id = insert_user(&harness.ctx.db, row).await;

	harness.engine.sync(&harness.user(id), "hubspot").await.unwrap();

	let calls = harness.adapter.upserts();
	assert_eq!(calls.len(), 1);
	assert_eq!(calls[0].object_type, "contacts");
	assert_eq!(calls[0].id_property.as_deref(), Some("email"));
	assert_eq!(calls[0].payload["email"], "a@b");
	assert_eq!(calls[0].payload["name"], "Ada");
}

#[tokio::test]
async fn guard_denied_skips_and_resets_the_error_ledger() {
	let harness = harness().await;
	register_user_binding(&harness).await;

	let id = insert_user(&harness.ctx.db, UserRow::with_email("a@b")).await;
	let record = harness.user(id);

	// Accumulate a failure first
	harness.adapter.push_failures(1);
	assert!(harness.engine.sync(&record, "hubspot").await.is_err());
	let state = SyncStateStore::find(&harness.ctx.db, &record, "hubspot")
		.await
		.unwrap()
		.unwrap();
	assert_eq!(state.error_count, 1);
	assert!(state.last_error.is_some());

	set_user_sync_enabled(&harness.ctx.db, id, false).await;
	let outcome = harness.engine.sync(&record, "hubspot").await.unwrap();
	assert_eq!(outcome, AttemptOutcome::Skipped);

	let state = SyncStateStore::find(&harness.ctx.db, &record, "hubspot")
		.await
		.unwrap()
		.unwrap();
	assert_eq!(state.error_count, 0);
	assert!(state.last_error.is_none());
	assert!(state.last_synced_at.is_some());
	// The guard fired before any remote work
	assert_eq!(harness.adapter.upsert_count(), 1);
}

#[tokio::test]
async fn adapter_failure_increments_and_success_resets_error_count() {
	let harness = harness().await;
	register_user_binding(&harness).await;

	let id = insert_user(&harness.ctx.db, UserRow::with_email("a@b")).await;
	let record = harness.user(id);

	harness.adapter.push_failures(2);
	assert!(harness.engine.sync(&record, "hubspot").await.is_err());
	assert!(harness.engine.sync(&record, "hubspot").await.is_err());

	let state = SyncStateStore::find(&harness.ctx.db, &record, "hubspot")
		.await
		.unwrap()
		.unwrap();
	assert_eq!(state.error_count, 2);

	let outcome = harness.engine.sync(&record, "hubspot").await.unwrap();
	assert!(matches!(outcome, AttemptOutcome::Synced { .. }));

	let state = SyncStateStore::find(&harness.ctx.db, &record, "hubspot")
		.await
		.unwrap()
		.unwrap();
	assert_eq!(state.error_count, 0);
	assert!(state.last_error.is_none());
}

#[tokio::test]
async fn assigned_crm_id_is_never_overwritten() {
	let harness = harness().await;
	register_user_binding(&harness).await;

	let id = insert_user(&harness.ctx.db, UserRow::with_email("a@b")).await;
	let record = harness.user(id);

	harness.engine.sync(&record, "hubspot").await.unwrap();

	// A later upsert returning a blank id must not blank the stored one
	set_user_email(&harness.ctx.db, id, "b@b").await;
	harness.adapter.push_result(Ok(String::new()));
	harness.engine.sync(&record, "hubspot").await.unwrap();

	// Nor does a different id replace it
	set_user_email(&harness.ctx.db, id, "c@b").await;
	harness.adapter.push_result(Ok("crm-other".into()));
	harness.engine.sync(&record, "hubspot").await.unwrap();

	let state = SyncStateStore::find(&harness.ctx.db, &record, "hubspot")
		.await
		.unwrap()
		.unwrap();
	assert_eq!(state.crm_id.as_deref(), Some("crm-1"));
}

#[tokio::test]
async fn vanished_record_surfaces_record_missing() {
	let harness = harness().await;
	register_user_binding(&harness).await;

	let id = insert_user(&harness.ctx.db, UserRow::with_email("a@b")).await;
	let record = harness.user(id);
	delete_user(&harness.ctx.db, id).await;

	let err = harness.engine.sync(&record, "hubspot").await.unwrap_err();
	assert!(matches!(err, SyncError::RecordMissing { .. }));
}

#[tokio::test]
async fn unknown_crm_and_missing_binding_raise_misconfiguration() {
	let harness = harness().await;
	// No binding registered for User yet
	let id = insert_user(&harness.ctx.db, UserRow::with_email("a@b")).await;
	let record = harness.user(id);

	let err = harness.engine.sync(&record, "salesforce").await.unwrap_err();
	assert!(matches!(err, SyncError::UnknownCrm(_)));
	assert!(!err.is_retryable());

	let err = harness.engine.sync(&record, "hubspot").await.unwrap_err();
	assert!(matches!(err, SyncError::MissingBinding { .. }));
	assert!(!err.is_retryable());
}

#[tokio::test]
async fn adapter_errors_carry_their_kind_through() {
	let harness = harness().await;
	register_user_binding(&harness).await;

	let id = insert_user(&harness.ctx.db, UserRow::with_email("a@b")).await;
	let record = harness.user(id);

	harness.adapter.push_result(Err(AdapterError::RateLimited {
		retry_after: Some(30),
	}));
	let err = harness.engine.sync(&record, "hubspot").await.unwrap_err();

	assert!(matches!(
		err,
		SyncError::Adapter(AdapterError::RateLimited { retry_after: Some(30) })
	));
	assert!(err.is_retryable());

	let state = SyncStateStore::find(&harness.ctx.db, &record, "hubspot")
		.await
		.unwrap()
		.unwrap();
	assert!(state.last_error.unwrap().contains("rate limited"));
}
