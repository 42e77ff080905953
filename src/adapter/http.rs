//! Shared HTTP plumbing for wire adapters
//!
//! One thin wrapper around `reqwest` with bearer auth, a per-request timeout,
//! and the common status-code → [`AdapterError`] mapping, so each adapter
//! only describes its endpoints.

use super::AdapterError;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bearer-authenticated JSON client with a fixed base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
	client: Client,
	base_url: String,
	token: String,
}

impl ApiClient {
	pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self, AdapterError> {
		let client = Client::builder().timeout(timeout).build()?;
		Ok(Self {
			client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			token: token.into(),
		})
	}

	pub async fn request(
		&self,
		method: Method,
		path: &str,
		query: Option<&[(&str, String)]>,
		body: Option<&Value>,
	) -> Result<Response, AdapterError> {
		let url = format!("{}{}", self.base_url, path);
		let mut request = self
			.client
			.request(method, url)
			.bearer_auth(&self.token);

		if let Some(query) = query {
			request = request.query(query);
		}
		if let Some(body) = body {
			request = request.json(body);
		}

		Ok(request.send().await?)
	}
}

/// Map a non-success response to the adapter error taxonomy.
///
/// The response body is drained for a message; 429 also reads `Retry-After`.
pub async fn error_for_response(response: Response) -> AdapterError {
	let status = response.status();
	let retry_after = response
		.headers()
		.get(reqwest::header::RETRY_AFTER)
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.parse::<u64>().ok());

	let body: Option<Value> = response.json().await.ok();
	let message = body
		.as_ref()
		.and_then(|b| b.get("message").and_then(Value::as_str))
		.or_else(|| {
			body.as_ref()
				.and_then(|b| b.pointer("/error/message").and_then(Value::as_str))
		})
		.unwrap_or("request failed")
		.to_string();

	match status {
		StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AdapterError::Unauthorized {
			status: status.as_u16(),
		},
		StatusCode::NOT_FOUND => AdapterError::NotFound,
		StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => AdapterError::ValidationFailed {
			status: status.as_u16(),
			message,
			details: body,
		},
		StatusCode::TOO_MANY_REQUESTS => AdapterError::RateLimited { retry_after },
		_ => AdapterError::Api {
			status: status.as_u16(),
			message,
		},
	}
}

/// Drain a response into JSON, mapping non-2xx statuses to errors.
pub async fn json_or_error(response: Response) -> Result<Value, AdapterError> {
	if response.status().is_success() {
		Ok(response.json().await?)
	} else {
		Err(error_for_response(response).await)
	}
}
