//! Test support: scripted adapters and capturing queues
//!
//! Shared between the crate's own tests and host test suites.

use crate::adapter::{AdapterError, CrmAdapter};
use crate::digest::Payload;
use crate::error::SyncResult;
use crate::jobs::queue::{JobQueue, QueuedSyncJob};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One recorded `upsert` call.
#[derive(Debug, Clone)]
pub struct RecordedUpsert {
	pub payload: Payload,
	pub id_property: Option<String>,
	pub object_type: String,
}

/// Scripted in-memory adapter.
///
/// Returns scripted results in order; once the script is exhausted it keeps
/// returning the default id. Every call is recorded.
pub struct MockAdapter {
	default_id: String,
	script: Mutex<VecDeque<Result<String, AdapterError>>>,
	upserts: Mutex<Vec<RecordedUpsert>>,
	deletes: Mutex<Vec<(String, String)>>,
	delete_result: Mutex<Option<Result<bool, AdapterError>>>,
}

impl MockAdapter {
	pub fn returning(default_id: impl Into<String>) -> Self {
		Self {
			default_id: default_id.into(),
			script: Mutex::new(VecDeque::new()),
			upserts: Mutex::new(Vec::new()),
			deletes: Mutex::new(Vec::new()),
			delete_result: Mutex::new(None),
		}
	}

	/// Script the next `upsert` result (FIFO).
	pub fn push_result(&self, result: Result<String, AdapterError>) {
		self.script.lock().unwrap().push_back(result);
	}

	/// Script `n` consecutive failures.
	pub fn push_failures(&self, n: usize) {
		for _ in 0..n {
			self.push_result(Err(AdapterError::Api {
				status: 500,
				message: "scripted failure".into(),
			}));
		}
	}

	pub fn set_delete_result(&self, result: Result<bool, AdapterError>) {
		*self.delete_result.lock().unwrap() = Some(result);
	}

	pub fn upsert_count(&self) -> usize {
		self.upserts.lock().unwrap().len()
	}

	pub fn upserts(&self) -> Vec<RecordedUpsert> {
		self.upserts.lock().unwrap().clone()
	}

	pub fn delete_count(&self) -> usize {
		self.deletes.lock().unwrap().len()
	}

	pub fn deletes(&self) -> Vec<(String, String)> {
		self.deletes.lock().unwrap().clone()
	}
}

#[async_trait]
impl CrmAdapter for MockAdapter {
	async fn upsert(
		&self,
		payload: &Payload,
		id_property: Option<&str>,
		object_type: &str,
	) -> Result<String, AdapterError> {
		self.upserts.lock().unwrap().push(RecordedUpsert {
			payload: payload.clone(),
			id_property: id_property.map(str::to_string),
			object_type: object_type.to_string(),
		});

		match self.script.lock().unwrap().pop_front() {
			Some(result) => result,
			None => Ok(self.default_id.clone()),
		}
	}

	async fn delete(&self, crm_id: &str, object_type: &str) -> Result<bool, AdapterError> {
		self.deletes
			.lock()
			.unwrap()
			.push((crm_id.to_string(), object_type.to_string()));

		match self.delete_result.lock().unwrap().take() {
			Some(result) => result,
			None => Ok(true),
		}
	}
}

/// Queue that captures pushes instead of executing them.
pub struct TestQueue {
	name: String,
	jobs: Mutex<Vec<QueuedSyncJob>>,
}

impl TestQueue {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			jobs: Mutex::new(Vec::new()),
		}
	}

	pub fn len(&self) -> usize {
		self.jobs.lock().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn jobs(&self) -> Vec<QueuedSyncJob> {
		self.jobs.lock().unwrap().clone()
	}

	/// Take every captured job, clearing the queue.
	pub fn drain(&self) -> Vec<QueuedSyncJob> {
		self.jobs.lock().unwrap().drain(..).collect()
	}
}

#[async_trait]
impl JobQueue for TestQueue {
	fn name(&self) -> &str {
		&self.name
	}

	async fn push(&self, job: QueuedSyncJob) -> SyncResult<()> {
		self.jobs.lock().unwrap().push(job);
		Ok(())
	}
}
