//! Association descriptors
//!
//! The stale finder turns each declared association into a correlated
//! subquery over the association's timestamp column. Rust has no model
//! reflection, so the SQL-relevant shape of every association is declared
//! explicitly here.

/// Extra equality predicate for polymorphic tables: `column = 'value'`.
#[derive(Debug, Clone)]
pub struct TypePredicate {
	pub column: String,
	pub value: String,
}

/// One intermediate table in a `through` chain.
///
/// `foreign_key` is the column on this table referencing the previous
/// table's primary key (the owner for the first hop).
#[derive(Debug, Clone)]
pub struct ThroughHop {
	pub table: String,
	pub foreign_key: String,
	pub primary_key: String,
	pub type_predicate: Option<TypePredicate>,
}

impl ThroughHop {
	pub fn new(table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
		Self {
			table: table.into(),
			foreign_key: foreign_key.into(),
			primary_key: "id".into(),
			type_predicate: None,
		}
	}

	pub fn type_predicate(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
		self.type_predicate = Some(TypePredicate {
			column: column.into(),
			value: value.into(),
		});
		self
	}
}

/// How the source table joins the last hop of a `through` chain.
#[derive(Debug, Clone)]
pub enum SourceJoin {
	/// `source.<primary_key> = hop.<column>` — the through row points at the source
	ForeignKeyOnThrough {
		column: String,
		source_primary_key: String,
	},
	/// `source.<column> = hop.<primary_key>` — the source points at the through row
	ForeignKeyOnSource { column: String },
}

/// A declared association, as far as stale detection cares about it.
#[derive(Debug, Clone)]
pub enum Association {
	/// Scalar lookup: `target.pk = owner.fk`
	BelongsTo {
		name: String,
		target_table: String,
		foreign_key: String,
		target_primary_key: String,
		timestamp_column: String,
	},
	/// `MAX(updated_at)` over rows with `target.fk = owner.pk`; covers
	/// `has_one` too. A type predicate handles polymorphic inverses.
	HasMany {
		name: String,
		target_table: String,
		foreign_key: String,
		type_predicate: Option<TypePredicate>,
		timestamp_column: String,
	},
	/// One or more intermediate hops, then the source table.
	HasManyThrough {
		name: String,
		hops: Vec<ThroughHop>,
		source_table: String,
		source_join: SourceJoin,
		timestamp_column: String,
	},
	/// Join-table many-to-many with custom fk names.
	HasAndBelongsToMany {
		name: String,
		join_table: String,
		foreign_key: String,
		association_foreign_key: String,
		target_table: String,
		target_primary_key: String,
		timestamp_column: String,
	},
	/// Owner-side polymorphic belongs_to: contributes epoch (a per-type
	/// table scan would be needed to do better).
	PolymorphicBelongsTo { name: String },
	/// Target cannot be resolved: contributes epoch.
	Unknown { name: String },
}

impl Association {
	pub fn belongs_to(
		name: impl Into<String>,
		target_table: impl Into<String>,
		foreign_key: impl Into<String>,
	) -> Self {
		Self::BelongsTo {
			name: name.into(),
			target_table: target_table.into(),
			foreign_key: foreign_key.into(),
			target_primary_key: "id".into(),
			timestamp_column: "updated_at".into(),
		}
	}

	pub fn has_many(
		name: impl Into<String>,
		target_table: impl Into<String>,
		foreign_key: impl Into<String>,
	) -> Self {
		Self::HasMany {
			name: name.into(),
			target_table: target_table.into(),
			foreign_key: foreign_key.into(),
			type_predicate: None,
			timestamp_column: "updated_at".into(),
		}
	}

	pub fn has_one(
		name: impl Into<String>,
		target_table: impl Into<String>,
		foreign_key: impl Into<String>,
	) -> Self {
		Self::has_many(name, target_table, foreign_key)
	}

	/// `has_many` whose inverse is polymorphic: adds `type_column = 'value'`.
	pub fn has_many_as(
		name: impl Into<String>,
		target_table: impl Into<String>,
		foreign_key: impl Into<String>,
		type_column: impl Into<String>,
		type_value: impl Into<String>,
	) -> Self {
		Self::HasMany {
			name: name.into(),
			target_table: target_table.into(),
			foreign_key: foreign_key.into(),
			type_predicate: Some(TypePredicate {
				column: type_column.into(),
				value: type_value.into(),
			}),
			timestamp_column: "updated_at".into(),
		}
	}

	pub fn has_many_through(
		name: impl Into<String>,
		hops: Vec<ThroughHop>,
		source_table: impl Into<String>,
		source_join: SourceJoin,
	) -> Self {
		Self::HasManyThrough {
			name: name.into(),
			hops,
			source_table: source_table.into(),
			source_join,
			timestamp_column: "updated_at".into(),
		}
	}

	pub fn has_and_belongs_to_many(
		name: impl Into<String>,
		join_table: impl Into<String>,
		foreign_key: impl Into<String>,
		association_foreign_key: impl Into<String>,
		target_table: impl Into<String>,
	) -> Self {
		Self::HasAndBelongsToMany {
			name: name.into(),
			join_table: join_table.into(),
			foreign_key: foreign_key.into(),
			association_foreign_key: association_foreign_key.into(),
			target_table: target_table.into(),
			target_primary_key: "id".into(),
			timestamp_column: "updated_at".into(),
		}
	}

	pub fn polymorphic_belongs_to(name: impl Into<String>) -> Self {
		Self::PolymorphicBelongsTo { name: name.into() }
	}

	pub fn unknown(name: impl Into<String>) -> Self {
		Self::Unknown { name: name.into() }
	}

	pub fn name(&self) -> &str {
		match self {
			Self::BelongsTo { name, .. }
			| Self::HasMany { name, .. }
			| Self::HasManyThrough { name, .. }
			| Self::HasAndBelongsToMany { name, .. }
			| Self::PolymorphicBelongsTo { name }
			| Self::Unknown { name } => name,
		}
	}
}
