//! Airtable-shaped v0 adapter
//!
//! Wire surface:
//! - `GET /v0/{baseId}/{table}?filterByFormula=…&maxRecords=1&pageSize=1`
//! - `POST /v0/{baseId}/{table}` to create
//! - `PATCH /v0/{baseId}/{table}/{id}` to update
//! - `DELETE /v0/{baseId}/{table}/{id}`

use super::http::{error_for_response, json_or_error, ApiClient, DEFAULT_TIMEOUT};
use super::{lookup_value, AdapterError, CrmAdapter};
use crate::digest::Payload;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.airtable.com";

#[derive(Debug, Clone)]
pub struct AirtableConfig {
	pub api_key: String,
	pub base_id: String,
	pub base_url: String,
	pub timeout: Duration,
}

impl AirtableConfig {
	pub fn new(api_key: impl Into<String>, base_id: impl Into<String>) -> Self {
		Self {
			api_key: api_key.into(),
			base_id: base_id.into(),
			base_url: DEFAULT_BASE_URL.into(),
			timeout: DEFAULT_TIMEOUT,
		}
	}

	pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = base_url.into();
		self
	}
}

pub struct AirtableAdapter {
	client: ApiClient,
	base_id: String,
}

impl AirtableAdapter {
	pub fn new(config: AirtableConfig) -> Result<Self, AdapterError> {
		let client = ApiClient::new(config.base_url, config.api_key, config.timeout)?;
		Ok(Self {
			client,
			base_id: config.base_id,
		})
	}

	fn table_path(&self, table: &str) -> String {
		format!("/v0/{}/{}", self.base_id, table)
	}

	async fn search(
		&self,
		table: &str,
		field: &str,
		value: &Value,
	) -> Result<Option<String>, AdapterError> {
		let query = [
			("filterByFormula", filter_formula(field, value)),
			("maxRecords", "1".to_string()),
			("pageSize", "1".to_string()),
		];

		let response = self
			.client
			.request(Method::GET, &self.table_path(table), Some(&query), None)
			.await?;

		if !response.status().is_success() {
			return match error_for_response(response).await {
				AdapterError::NotFound => Ok(None),
				err => Err(err),
			};
		}

		let body: Value = response.json().await?;
		let id = body
			.pointer("/records/0/id")
			.and_then(Value::as_str)
			.map(str::to_string);
		Ok(id)
	}

	async fn create(&self, table: &str, payload: &Payload) -> Result<String, AdapterError> {
		let response = self
			.client
			.request(
				Method::POST,
				&self.table_path(table),
				None,
				Some(&json!({ "fields": payload })),
			)
			.await?;

		let status = response.status().as_u16();
		let body = json_or_error(response).await?;
		match body.get("id").and_then(Value::as_str) {
			Some(id) if !id.is_empty() => Ok(id.to_string()),
			_ => Err(AdapterError::Api {
				status,
				message: "create response carried no id".into(),
			}),
		}
	}

	async fn update(
		&self,
		table: &str,
		crm_id: &str,
		payload: &Payload,
	) -> Result<(), AdapterError> {
		let response = self
			.client
			.request(
				Method::PATCH,
				&format!("{}/{}", self.table_path(table), crm_id),
				None,
				Some(&json!({ "fields": payload })),
			)
			.await?;
		json_or_error(response).await?;
		Ok(())
	}
}

#[async_trait]
impl CrmAdapter for AirtableAdapter {
	async fn upsert(
		&self,
		payload: &Payload,
		id_property: Option<&str>,
		object_type: &str,
	) -> Result<String, AdapterError> {
		if let (Some(field), Some(value)) = (id_property, lookup_value(payload, id_property)) {
			if let Some(crm_id) = self.search(object_type, field, value).await? {
				debug!(object_type, %crm_id, "airtable lookup hit, patching");
				self.update(object_type, &crm_id, payload).await?;
				return Ok(crm_id);
			}
		}

		debug!(object_type, "airtable lookup miss, creating");
		self.create(object_type, payload).await
	}

	async fn delete(&self, crm_id: &str, object_type: &str) -> Result<bool, AdapterError> {
		let response = self
			.client
			.request(
				Method::DELETE,
				&format!("{}/{}", self.table_path(object_type), crm_id),
				None,
				None,
			)
			.await?;

		if response.status().is_success() {
			return Ok(true);
		}
		match error_for_response(response).await {
			AdapterError::NotFound => Ok(false),
			err => Err(err),
		}
	}
}

/// Render a `filterByFormula` equality probe: `{Field}='value'`.
///
/// Field names have `}` stripped (it would close the brace reference);
/// string values backslash-escape `'`; booleans render as `TRUE()`/`FALSE()`;
/// numerics render unquoted; anything else serializes as JSON inside single
/// quotes.
fn filter_formula(field: &str, value: &Value) -> String {
	let field: String = field.chars().filter(|c| *c != '}').collect();

	let rendered = match value {
		Value::String(s) => format!("'{}'", escape_quotes(s)),
		Value::Bool(true) => "TRUE()".to_string(),
		Value::Bool(false) => "FALSE()".to_string(),
		Value::Number(n) => n.to_string(),
		other => format!("'{}'", escape_quotes(&other.to_string())),
	};

	format!("{{{field}}}={rendered}")
}

fn escape_quotes(value: &str) -> String {
	value.replace('\'', "\\'")
}
