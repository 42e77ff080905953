//! CRM adapter contract
//!
//! An adapter implements the two-operation wire contract against one CRM:
//! find-or-create (`upsert`) and remote delete. Failures are a tagged
//! taxonomy rather than bare status codes, so the synchronizer and job layer
//! can decide retry behavior without knowing wire details.

pub mod airtable;
pub mod http;
pub mod hubspot;

pub use airtable::{AirtableAdapter, AirtableConfig};
pub use hubspot::{HubSpotAdapter, HubSpotConfig};

use crate::digest::Payload;
use async_trait::async_trait;
use thiserror::Error;

/// Wire-level failure kinds surfaced by adapters
#[derive(Debug, Error)]
pub enum AdapterError {
	/// 401 / 403
	#[error("unauthorized (status {status})")]
	Unauthorized { status: u16 },

	/// 404
	#[error("remote record not found")]
	NotFound,

	/// 409 / 422
	#[error("validation failed (status {status}): {message}")]
	ValidationFailed {
		status: u16,
		message: String,
		details: Option<serde_json::Value>,
	},

	/// 429; `retry_after` carries the `Retry-After` header in seconds
	#[error("rate limited")]
	RateLimited { retry_after: Option<u64> },

	/// Any other non-2xx response, and 2xx responses that violate the
	/// contract (e.g. a create response without an id)
	#[error("api error (status {status}): {message}")]
	Api { status: u16, message: String },

	/// Socket / DNS / TLS / timeout
	#[error("transport error: {0}")]
	Transport(#[from] reqwest::Error),

	/// The payload cannot be expressed on this wire
	#[error("invalid payload: {0}")]
	InvalidPayload(String),
}

/// Two-operation wire contract against a remote CRM.
///
/// Implementations must enforce a per-request timeout on their HTTP client
/// and must be idempotent on their own reads: a duplicate `upsert` of an
/// unchanged payload may patch the same remote record twice but must never
/// create it twice.
#[async_trait]
pub trait CrmAdapter: Send + Sync {
	/// Find-or-create on the remote side, returning the remote id.
	///
	/// When `id_property` is set and the payload carries a value for it, the
	/// adapter first attempts a lookup; on hit it patches the existing remote
	/// record, on miss it creates. The `id_property` value stays present in
	/// the created record.
	async fn upsert(
		&self,
		payload: &Payload,
		id_property: Option<&str>,
		object_type: &str,
	) -> Result<String, AdapterError>;

	/// Delete the remote record: `true` on 2xx, `false` on 404.
	async fn delete(&self, crm_id: &str, object_type: &str) -> Result<bool, AdapterError>;
}

/// Whether a payload value counts as present for lookup purposes.
pub(crate) fn lookup_value<'a>(
	payload: &'a Payload,
	id_property: Option<&str>,
) -> Option<&'a serde_json::Value> {
	let property = id_property?;
	match payload.get(property) {
		Some(serde_json::Value::Null) => None,
		Some(serde_json::Value::String(s)) if s.is_empty() => None,
		Some(value) => Some(value),
		None => None,
	}
}
