//! CRM registry
//!
//! Process-wide map of named CRM descriptors. Mutable only during
//! initialization; read-many under load.

use crate::adapter::CrmAdapter;
use crate::jobs::queue::JobQueue;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Per-CRM options. `None` fields inherit the engine-wide value.
#[derive(Clone, Default)]
pub struct CrmOptions {
	/// Overrides `EngineConfig::max_sync_errors` when set.
	pub max_sync_errors: Option<u32>,
	/// Routes this CRM's sync jobs to a dedicated queue when set.
	pub queue: Option<Arc<dyn JobQueue>>,
}

/// A registered CRM: adapter instance plus its options.
#[derive(Clone)]
pub struct CrmHandle {
	pub name: String,
	pub adapter: Arc<dyn CrmAdapter>,
	pub options: CrmOptions,
}

/// Named CRM descriptors, keyed by canonical name.
#[derive(Default)]
pub struct CrmRegistry {
	inner: RwLock<HashMap<String, CrmHandle>>,
}

impl CrmRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Canonical form of a CRM name: trimmed, ASCII-lowercased.
	pub fn canonical_name(name: &str) -> String {
		name.trim().to_ascii_lowercase()
	}

	/// Register a CRM. Re-registering the same name replaces the entry.
	///
	/// `options` is stored as an owned copy, so later caller mutations of the
	/// original cannot leak into the registry.
	pub fn register(&self, name: &str, adapter: Arc<dyn CrmAdapter>, options: CrmOptions) {
		let name = Self::canonical_name(name);
		let handle = CrmHandle {
			name: name.clone(),
			adapter,
			options,
		};
		let mut inner = self.inner.write().expect("crm registry poisoned");
		inner.insert(name, handle);
	}

	pub fn fetch(&self, name: &str) -> Option<CrmHandle> {
		let inner = self.inner.read().expect("crm registry poisoned");
		inner.get(&Self::canonical_name(name)).cloned()
	}

	pub fn names(&self) -> Vec<String> {
		let inner = self.inner.read().expect("crm registry poisoned");
		let mut names: Vec<String> = inner.keys().cloned().collect();
		names.sort();
		names
	}
}
