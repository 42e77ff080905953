//! Bulk synchronization
//!
//! Walks the stale finder output per binding and either enqueues one job per
//! record or runs the synchronizer inline. Inline errors are counted, never
//! aborting the batch.

use crate::context::EngineContext;
use crate::error::SyncResult;
use crate::record::RecordRef;
use crate::stale::StaleFinder;
use crate::synchronizer::Synchronizer;
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Clone, Debug)]
pub struct BatchSyncOptions {
	/// Restrict to these resource types. `None` means every bound model.
	pub models: Option<Vec<String>>,
	/// Restrict to one CRM. `None` means every registered CRM.
	pub crm_name: Option<String>,
	/// Ids are streamed in chunks of this size.
	pub batch_size: usize,
	/// Enqueue jobs (`true`) or run the synchronizer inline (`false`).
	pub run_async: bool,
}

impl Default for BatchSyncOptions {
	fn default() -> Self {
		Self {
			models: None,
			crm_name: None,
			batch_size: 500,
			run_async: true,
		}
	}
}

/// Aggregate result of one batch run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSyncStats {
	pub total: u64,
	/// Per-model counts, aggregated across CRMs.
	pub per_model: HashMap<String, u64>,
	pub errors: u64,
}

pub struct BatchSync<'a> {
	ctx: &'a EngineContext,
}

impl<'a> BatchSync<'a> {
	pub fn new(ctx: &'a EngineContext) -> Self {
		Self { ctx }
	}

	pub async fn run(&self, options: BatchSyncOptions) -> SyncResult<BatchSyncStats> {
		let finder = StaleFinder::new(self.ctx);
		let synchronizer = Synchronizer::new(self.ctx);
		let mut stats = BatchSyncStats::default();
		let batch_size = options.batch_size.max(1);

		for (binding, query) in finder.queries(options.models.as_deref(), options.crm_name.as_deref())
		{
			if let Err(err) = query {
				warn!(
					resource_type = binding.resource_type(),
					crm_name = %binding.crm_name,
					%err,
					"skipping binding without a usable stale relation"
				);
				continue;
			}

			let ids = finder.stale_ids(&binding).await?;
			info!(
				resource_type = binding.resource_type(),
				crm_name = %binding.crm_name,
				stale = ids.len(),
				"batch sync walking stale records"
			);

			for chunk in ids.chunks(batch_size) {
				for id in chunk {
					let record = RecordRef::new(binding.resource_type().to_string(), *id);

					let failed = if options.run_async {
						crate::jobs::enqueue_sync(self.ctx, &record, &binding.crm_name)
							.await
							.is_err()
					} else {
						match synchronizer.sync(&record, &binding.crm_name).await {
							Ok(_) => false,
							Err(err) => {
								warn!(%record, crm_name = %binding.crm_name, %err, "inline sync failed");
								true
							}
						}
					};

					stats.total += 1;
					*stats
						.per_model
						.entry(binding.resource_type().to_string())
						.or_default() += 1;
					if failed {
						stats.errors += 1;
					}
				}
			}
		}

		Ok(stats)
	}
}
