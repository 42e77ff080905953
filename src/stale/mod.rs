//! Stale record discovery
//!
//! For each configured (model, CRM) the finder emits an id-only SQL relation
//! over records whose mirror is behind: no SyncState row, or a last-synced
//! timestamp older than the greatest timestamp among the record and its
//! declared dependency associations.

pub mod sql;

use crate::binding::ModelBinding;
use crate::context::EngineContext;
use crate::error::SyncResult;
use sea_orm::{ConnectionTrait, Statement};
use std::sync::Arc;
use tracing::{debug, warn};

/// One binding's stale relation, ready to execute.
pub struct StaleQuery {
	pub resource_type: String,
	pub crm_name: String,
	pub statement: Statement,
}

pub struct StaleFinder<'a> {
	ctx: &'a EngineContext,
}

impl<'a> StaleFinder<'a> {
	pub fn new(ctx: &'a EngineContext) -> Self {
		Self { ctx }
	}

	/// Build the relation for one binding.
	pub fn query_for(&self, binding: &ModelBinding) -> SyncResult<StaleQuery> {
		let crm = self.ctx.crm(&binding.crm_name)?;
		let max_errors = self.ctx.max_sync_errors_for(&crm);
		let backend = self.ctx.db.get_database_backend();
		let sql = sql::build_stale_sql(backend, binding, max_errors);

		debug!(
			resource_type = binding.resource_type(),
			crm_name = %binding.crm_name,
			"built stale relation"
		);

		Ok(StaleQuery {
			resource_type: binding.resource_type().to_string(),
			crm_name: binding.crm_name.clone(),
			statement: Statement::from_string(backend, sql),
		})
	}

	/// Relations for every configured binding, optionally filtered by model
	/// names and/or CRM. Bindings whose CRM is unregistered are skipped.
	pub fn queries(
		&self,
		models: Option<&[String]>,
		crm_name: Option<&str>,
	) -> Vec<(Arc<ModelBinding>, SyncResult<StaleQuery>)> {
		let crm_name = crm_name.map(crate::registry::CrmRegistry::canonical_name);

		self.ctx
			.bindings
			.all()
			.into_iter()
			.filter(|binding| {
				models.is_none_or(|models| {
					models.iter().any(|m| m == binding.resource_type())
				})
			})
			.filter(|binding| {
				crm_name
					.as_deref()
					.is_none_or(|crm| crm == binding.crm_name)
			})
			.map(|binding| {
				let query = self.query_for(&binding);
				(binding, query)
			})
			.collect()
	}

	/// Execute a binding's relation and return the stale ids, ascending.
	pub async fn stale_ids(&self, binding: &ModelBinding) -> SyncResult<Vec<i64>> {
		let query = self.query_for(binding)?;
		let rows = self.ctx.db.query_all(query.statement).await?;

		let mut ids = Vec::with_capacity(rows.len());
		for row in rows {
			// Host primary keys may be 32- or 64-bit
			let id: i64 = match row.try_get::<i64>("", "id") {
				Ok(id) => id,
				Err(_) => match row.try_get::<i32>("", "id") {
					Ok(id) => i64::from(id),
					Err(err) => {
						warn!(%err, "stale relation returned a non-integer id, skipping");
						continue;
					}
				},
			};
			ids.push(id);
		}
		Ok(ids)
	}
}
