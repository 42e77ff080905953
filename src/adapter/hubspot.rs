//! HubSpot-shaped v3 adapter
//!
//! Wire surface:
//! - `POST /crm/v3/objects/{type}/search` with JSON filterGroups (OR of ANDs)
//! - `POST /crm/v3/objects/{type}` to create
//! - `PATCH /crm/v3/objects/{type}/{id}` to update
//! - `DELETE /crm/v3/objects/{type}/{id}`

use super::http::{error_for_response, json_or_error, ApiClient, DEFAULT_TIMEOUT};
use super::{lookup_value, AdapterError, CrmAdapter};
use crate::digest::Payload;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";

#[derive(Debug, Clone)]
pub struct HubSpotConfig {
	pub access_token: String,
	pub base_url: String,
	pub timeout: Duration,
}

impl HubSpotConfig {
	pub fn new(access_token: impl Into<String>) -> Self {
		Self {
			access_token: access_token.into(),
			base_url: DEFAULT_BASE_URL.into(),
			timeout: DEFAULT_TIMEOUT,
		}
	}

	pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = base_url.into();
		self
	}
}

pub struct HubSpotAdapter {
	client: ApiClient,
}

impl HubSpotAdapter {
	pub fn new(config: HubSpotConfig) -> Result<Self, AdapterError> {
		let client = ApiClient::new(config.base_url, config.access_token, config.timeout)?;
		Ok(Self { client })
	}

	/// Look up an existing remote record by the id property. `None` on miss.
	async fn search(
		&self,
		object_type: &str,
		id_property: &str,
		value: &Value,
	) -> Result<Option<String>, AdapterError> {
		let body = json!({
			"filterGroups": search_filter_groups(object_type, id_property, value),
			"properties": [id_property],
			"limit": 1,
		});

		let response = self
			.client
			.request(
				Method::POST,
				&format!("/crm/v3/objects/{object_type}/search"),
				None,
				Some(&body),
			)
			.await?;

		if !response.status().is_success() {
			// A 404 from search means "no such record", not a failure
			return match error_for_response(response).await {
				AdapterError::NotFound => Ok(None),
				err => Err(err),
			};
		}

		let body: Value = response.json().await?;
		let id = body
			.pointer("/results/0/id")
			.and_then(Value::as_str)
			.map(str::to_string);
		Ok(id)
	}

	async fn create(&self, object_type: &str, payload: &Payload) -> Result<String, AdapterError> {
		let response = self
			.client
			.request(
				Method::POST,
				&format!("/crm/v3/objects/{object_type}"),
				None,
				Some(&json!({ "properties": payload })),
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
		object_type: &str,
		crm_id: &str,
		payload: &Payload,
	) -> Result<(), AdapterError> {
		let response = self
			.client
			.request(
				Method::PATCH,
				&format!("/crm/v3/objects/{object_type}/{crm_id}"),
				None,
				Some(&json!({ "properties": payload })),
			)
			.await?;
		json_or_error(response).await?;
		Ok(())
	}
}

#[async_trait]
impl CrmAdapter for HubSpotAdapter {
	async fn upsert(
		&self,
		payload: &Payload,
		id_property: Option<&str>,
		object_type: &str,
	) -> Result<String, AdapterError> {
		if let (Some(property), Some(value)) = (id_property, lookup_value(payload, id_property)) {
			if let Some(crm_id) = self.search(object_type, property, value).await? {
				debug!(object_type, %crm_id, "hubspot lookup hit, patching");
				self.update(object_type, &crm_id, payload).await?;
				return Ok(crm_id);
			}
		}

		debug!(object_type, "hubspot lookup miss, creating");
		self.create(object_type, payload).await
	}

	async fn delete(&self, crm_id: &str, object_type: &str) -> Result<bool, AdapterError> {
		let response = self
			.client
			.request(
				Method::DELETE,
				&format!("/crm/v3/objects/{object_type}/{crm_id}"),
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

/// Build the search filterGroups (OR of ANDs) for an id-property lookup.
///
/// Contact lookups by email lowercase the value and emit two extra OR
/// groups unconditionally: a CONTAINS_TOKEN probe against
/// `additional_emails`, and a fallback EQ with `+` encoded as `%2B`.
fn search_filter_groups(object_type: &str, id_property: &str, value: &Value) -> Vec<Value> {
	let rendered = match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	};

	if object_type == "contacts" && id_property == "email" {
		let email = rendered.to_lowercase();
		let encoded = email.replace('+', "%2B");
		return vec![
			filter_group(id_property, "EQ", &email),
			filter_group("additional_emails", "CONTAINS_TOKEN", &email),
			filter_group(id_property, "EQ", &encoded),
		];
	}

	vec![filter_group(id_property, "EQ", &rendered)]
}

fn filter_group(property: &str, operator: &str, value: &str) -> Value {
	json!({
		"filters": [{
			"propertyName": property,
			"operator": operator,
			"value": value,
		}]
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn contact_email_lookup_emits_three_groups() {
		let groups =
			search_filter_groups("contacts", "email", &Value::String("Ada+Dev@Example.COM".into()));

		assert_eq!(groups.len(), 3);
		assert_eq!(
			*groups[0].pointer("/filters/0/value").unwrap(),
			"ada+dev@example.com"
		);
		assert_eq!(
			*groups[1].pointer("/filters/0/propertyName").unwrap(),
			"additional_emails"
		);
		assert_eq!(
			*groups[1].pointer("/filters/0/operator").unwrap(),
			"CONTAINS_TOKEN"
		);
		assert_eq!(
			*groups[2].pointer("/filters/0/value").unwrap(),
			"ada%2Bdev@example.com"
		);
	}

	#[test]
	fn fallback_groups_appear_even_without_plus() {
		let groups = search_filter_groups("contacts", "email", &Value::String("a@b.co".into()));

		assert_eq!(groups.len(), 3);
		// Without a '+' the fallback group degenerates to the plain email
		assert_eq!(*groups[2].pointer("/filters/0/value").unwrap(), "a@b.co");
	}

	#[test]
	fn non_contact_lookup_is_a_single_eq_group() {
		let groups = search_filter_groups("companies", "domain", &Value::String("acme.io".into()));

		assert_eq!(groups.len(), 1);
		assert_eq!(*groups[0].pointer("/filters/0/operator").unwrap(), "EQ");
		assert_eq!(*groups[0].pointer("/filters/0/value").unwrap(), "acme.io");
	}

	#[test]
	fn numeric_lookup_values_render_unquoted() {
		let groups = search_filter_groups("deals", "deal_number", &serde_json::json!(42));
		assert_eq!(*groups[0].pointer("/filters/0/value").unwrap(), "42");
	}
}
