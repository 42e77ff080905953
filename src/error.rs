//! Engine-level error types
//!
//! Adapter failures carry their own taxonomy in [`crate::adapter::AdapterError`];
//! everything the synchronizer, resolver, stores and job layer can surface is
//! folded into [`SyncError`] here.

use crate::adapter::AdapterError;
use thiserror::Error;

/// Errors surfaced by the synchronization engine
#[derive(Debug, Error)]
pub enum SyncError {
	/// No CRM registered under the given name
	#[error("no CRM registered under '{0}'")]
	UnknownCrm(String),

	/// No model binding declared for (resource_type, crm_name)
	#[error("no binding declared for '{resource_type}' on CRM '{crm_name}'")]
	MissingBinding {
		resource_type: String,
		crm_name: String,
	},

	/// No model descriptor registered for a resource type
	#[error("no model registered under '{0}'")]
	UnknownModel(String),

	/// Binding declaration failed validation
	#[error("invalid binding for '{resource_type}' on CRM '{crm_name}': {reason}")]
	InvalidBinding {
		resource_type: String,
		crm_name: String,
		reason: String,
	},

	/// The record disappeared between scheduling and the attempt
	#[error("record {resource_type}/{resource_id} no longer exists")]
	RecordMissing {
		resource_type: String,
		resource_id: i64,
	},

	/// No job queue has been attached to the engine context
	#[error("no job queue configured")]
	NoQueue,

	/// Remote CRM call failed
	#[error("adapter error: {0}")]
	Adapter(#[from] AdapterError),

	/// Database error
	#[error("database error: {0}")]
	Database(#[from] sea_orm::DbErr),

	/// Payload (de)serialization error
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	/// Host-provided hook failed
	#[error("{0}")]
	Source(String),
}

impl SyncError {
	/// Whether the job layer should retry the attempt.
	///
	/// Misconfiguration is surfaced to the caller and never retried; everything
	/// else (adapter failures, transient database errors) re-enters the retry
	/// policy up to the attempt cap.
	pub fn is_retryable(&self) -> bool {
		!matches!(
			self,
			Self::UnknownCrm(_)
				| Self::MissingBinding { .. }
				| Self::UnknownModel(_)
				| Self::InvalidBinding { .. }
				| Self::NoQueue
		)
	}
}

/// Result alias used across the engine
pub type SyncResult<T> = std::result::Result<T, SyncError>;
