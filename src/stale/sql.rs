//! Stale-detection SQL generation
//!
//! Emits one id-only relation per binding. The threshold for a record is the
//! greatest timestamp among the record itself and each declared association,
//! each contribution NULL-coalesced to the epoch. The query builder cannot
//! express these shapes (correlated subqueries over declared joins with
//! explicit aliasing), so the SQL is authored here by hand.
//!
//! Portability: `GREATEST(…)` on Postgres, scalar `MAX(…)` elsewhere; epoch
//! is `TIMESTAMP '1970-01-01 00:00:00'` on Postgres and
//! `DATETIME('1970-01-01 00:00:00')` elsewhere. On SQLite every timestamp
//! reference is normalized through `DATETIME(…)` so text encodings compare
//! uniformly; an unparseable encoding degrades to epoch, which errs toward
//! resyncing.

use crate::binding::association::{Association, SourceJoin};
use crate::binding::ModelBinding;
use sea_orm::DbBackend;

pub(crate) fn epoch_literal(backend: DbBackend) -> &'static str {
	match backend {
		DbBackend::Postgres => "TIMESTAMP '1970-01-01 00:00:00'",
		_ => "DATETIME('1970-01-01 00:00:00')",
	}
}

fn greatest_fn(backend: DbBackend) -> &'static str {
	match backend {
		DbBackend::Postgres => "GREATEST",
		_ => "MAX",
	}
}

fn normalize_ts(backend: DbBackend, expr: &str) -> String {
	match backend {
		DbBackend::Postgres => expr.to_string(),
		_ => format!("DATETIME({expr})"),
	}
}

fn contribution(backend: DbBackend, expr: &str) -> String {
	format!(
		"COALESCE({}, {})",
		normalize_ts(backend, expr),
		epoch_literal(backend)
	)
}

fn quote(value: &str) -> String {
	format!("'{}'", value.replace('\'', "''"))
}

/// Correlated subquery for one association, or `None` for kinds that
/// contribute only the epoch.
///
/// Subquery tables always carry an alias, so a self-join can never collide
/// with the unaliased owner table.
fn association_subquery(
	backend: DbBackend,
	owner_table: &str,
	owner_pk: &str,
	index: usize,
	association: &Association,
) -> Option<String> {
	match association {
		Association::BelongsTo {
			target_table,
			foreign_key,
			target_primary_key,
			timestamp_column,
			..
		} => Some(format!(
			"(SELECT d{index}.{timestamp_column} FROM {target_table} d{index} \
			 WHERE d{index}.{target_primary_key} = {owner_table}.{foreign_key})"
		)),

		Association::HasMany {
			target_table,
			foreign_key,
			type_predicate,
			timestamp_column,
			..
		} => {
			let ts = normalize_ts(backend, &format!("d{index}.{timestamp_column}"));
			let mut sql = format!(
				"(SELECT MAX({ts}) FROM {target_table} d{index} \
				 WHERE d{index}.{foreign_key} = {owner_table}.{owner_pk}"
			);
			if let Some(predicate) = type_predicate {
				sql.push_str(&format!(
					" AND d{index}.{} = {}",
					predicate.column,
					quote(&predicate.value)
				));
			}
			sql.push(')');
			Some(sql)
		}

		Association::HasManyThrough {
			hops,
			source_table,
			source_join,
			timestamp_column,
			..
		} => {
			let first = hops.first()?;
			let ts = normalize_ts(backend, &format!("s{index}.{timestamp_column}"));
			let mut sql = format!(
				"(SELECT MAX({ts}) FROM {} t{index}_0",
				first.table
			);

			for (hop_index, hop) in hops.iter().enumerate().skip(1) {
				let previous = &hops[hop_index - 1];
				sql.push_str(&format!(
					" JOIN {} t{index}_{hop_index} ON t{index}_{hop_index}.{} = t{index}_{}.{}",
					hop.table,
					hop.foreign_key,
					hop_index - 1,
					previous.primary_key
				));
			}

			let last_index = hops.len() - 1;
			let last = &hops[last_index];
			match source_join {
				SourceJoin::ForeignKeyOnThrough {
					column,
					source_primary_key,
				} => sql.push_str(&format!(
					" JOIN {source_table} s{index} ON s{index}.{source_primary_key} = t{index}_{last_index}.{column}"
				)),
				SourceJoin::ForeignKeyOnSource { column } => sql.push_str(&format!(
					" JOIN {source_table} s{index} ON s{index}.{column} = t{index}_{last_index}.{}",
					last.primary_key
				)),
			}

			sql.push_str(&format!(
				" WHERE t{index}_0.{} = {owner_table}.{owner_pk}",
				first.foreign_key
			));
			for (hop_index, hop) in hops.iter().enumerate() {
				if let Some(predicate) = &hop.type_predicate {
					sql.push_str(&format!(
						" AND t{index}_{hop_index}.{} = {}",
						predicate.column,
						quote(&predicate.value)
					));
				}
			}
			sql.push(')');
			Some(sql)
		}

		Association::HasAndBelongsToMany {
			join_table,
			foreign_key,
			association_foreign_key,
			target_table,
			target_primary_key,
			timestamp_column,
			..
		} => {
			let ts = normalize_ts(backend, &format!("d{index}.{timestamp_column}"));
			Some(format!(
				"(SELECT MAX({ts}) FROM {join_table} j{index} \
				 JOIN {target_table} d{index} ON d{index}.{target_primary_key} = j{index}.{association_foreign_key} \
				 WHERE j{index}.{foreign_key} = {owner_table}.{owner_pk})"
			))
		}

		// Conservative: a per-type scan would be needed to do better
		Association::PolymorphicBelongsTo { .. } | Association::Unknown { .. } => None,
	}
}

/// Build the full stale relation for one binding.
///
/// Selects exactly one column named `id`, ascending. Records without a
/// SyncState row are always candidates; rows at or over the error budget are
/// excluded.
pub fn build_stale_sql(backend: DbBackend, binding: &ModelBinding, max_errors: u32) -> String {
	let table = &binding.model.table;
	let pk = &binding.model.primary_key;
	let ts = &binding.model.timestamp_column;

	let mut args = vec![contribution(backend, &format!("{table}.{ts}"))];
	for (index, association) in binding.dependencies.iter().enumerate() {
		if let Some(subquery) = association_subquery(backend, table, pk, index, association) {
			args.push(contribution(backend, &subquery));
		}
	}
	args.push(epoch_literal(backend).to_string());

	let threshold = format!("{}({})", greatest_fn(backend), args.join(", "));
	let last_synced = contribution(backend, "cs.last_synced_at");
	let resource_type = quote(binding.resource_type());
	let crm_name = quote(&binding.crm_name);

	let mut sql = format!(
		"SELECT {table}.{pk} AS id FROM {table} \
		 LEFT JOIN crm_synchronisations cs \
		 ON cs.resource_type = {resource_type} \
		 AND cs.resource_id = {table}.{pk} \
		 AND cs.crm_name = {crm_name} \
		 WHERE (cs.id IS NULL OR {last_synced} < {threshold}) \
		 AND (cs.id IS NULL OR cs.error_count < {max_errors})"
	);

	if let Some(scope) = &binding.stale_scope {
		sql.push_str(&format!(" AND ({})", scope(backend)));
	}

	sql.push_str(&format!(" ORDER BY {table}.{pk} ASC"));
	sql
}
