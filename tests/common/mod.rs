//! Shared fixtures: an in-memory store with a small host schema
//! (users belonging to organisations, organisations forming a tree) and
//! record sources reading it.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use etlify::db::migration::Migrator;
use etlify::testing::MockAdapter;
use etlify::{
	CrmOptions, Engine, EngineConfig, EngineContext, InMemoryCacheStore, ModelDescriptor, Payload,
	RecordRef, RecordSource, SyncResult,
};
use sea_orm::{ConnectOptions, ConnectionTrait, DatabaseConnection, Statement};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;

pub async fn connect_memory() -> DatabaseConnection {
	let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
	options.max_connections(1).sqlx_logging(false);
	let db = sea_orm::Database::connect(options).await.unwrap();
	Migrator::up(&db, None).await.unwrap();
	create_host_schema(&db).await;
	db
}

async fn create_host_schema(db: &DatabaseConnection) {
	let statements = [
		"CREATE TABLE users (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			email TEXT NOT NULL,
			name TEXT,
			organisation_id INTEGER,
			referrer_id INTEGER,
			sync_enabled INTEGER NOT NULL DEFAULT 1,
			updated_at TEXT NOT NULL
		)",
		"CREATE TABLE organisations (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			name TEXT NOT NULL,
			parent_id INTEGER,
			hubspot_id TEXT,
			updated_at TEXT NOT NULL
		)",
		"CREATE TABLE addresses (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			addressable_type TEXT NOT NULL,
			addressable_id INTEGER NOT NULL,
			city TEXT,
			updated_at TEXT NOT NULL
		)",
	];
	for sql in statements {
		db.execute_unprepared(sql).await.unwrap();
	}
}

/// A timestamp `offset_secs` away from now, second precision.
pub fn ts(offset_secs: i64) -> DateTime<Utc> {
	Utc::now() + Duration::seconds(offset_secs)
}

fn render_ts(at: DateTime<Utc>) -> String {
	at.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Clone)]
pub struct UserRow {
	pub email: String,
	pub name: Option<String>,
	pub organisation_id: Option<i64>,
	pub referrer_id: Option<i64>,
	pub sync_enabled: bool,
	pub updated_at: DateTime<Utc>,
}

impl UserRow {
	pub fn with_email(email: &str) -> Self {
		Self {
			email: email.to_string(),
			name: None,
			organisation_id: None,
			referrer_id: None,
			sync_enabled: true,
			updated_at: ts(0),
		}
	}
}

pub async fn insert_user(db: &DatabaseConnection, row: UserRow) -> i64 {
	let result = db
		.execute(Statement::from_sql_and_values(
			db.get_database_backend(),
			"INSERT INTO users (email, name, organisation_id, referrer_id, sync_enabled, updated_at) \
			 VALUES (?, ?, ?, ?, ?, ?)",
			vec![
				row.email.into(),
				row.name.into(),
				row.organisation_id.into(),
				row.referrer_id.into(),
				(row.sync_enabled as i32).into(),
				render_ts(row.updated_at).into(),
			],
		))
		.await
		.unwrap();
	result.last_insert_id() as i64
}

pub async fn insert_org(
	db: &DatabaseConnection,
	name: &str,
	parent_id: Option<i64>,
	hubspot_id: Option<&str>,
	updated_at: DateTime<Utc>,
) -> i64 {
	let result = db
		.execute(Statement::from_sql_and_values(
			db.get_database_backend(),
			"INSERT INTO organisations (name, parent_id, hubspot_id, updated_at) VALUES (?, ?, ?, ?)",
			vec![
				name.into(),
				parent_id.into(),
				hubspot_id.map(str::to_string).into(),
				render_ts(updated_at).into(),
			],
		))
		.await
		.unwrap();
	result.last_insert_id() as i64
}

pub async fn insert_address(
	db: &DatabaseConnection,
	addressable_type: &str,
	addressable_id: i64,
	city: &str,
	updated_at: DateTime<Utc>,
) -> i64 {
	let result = db
		.execute(Statement::from_sql_and_values(
			db.get_database_backend(),
			"INSERT INTO addresses (addressable_type, addressable_id, city, updated_at) VALUES (?, ?, ?, ?)",
			vec![
				addressable_type.into(),
				addressable_id.into(),
				city.into(),
				render_ts(updated_at).into(),
			],
		))
		.await
		.unwrap();
	result.last_insert_id() as i64
}

pub async fn touch_user(db: &DatabaseConnection, id: i64, updated_at: DateTime<Utc>) {
	db.execute(Statement::from_sql_and_values(
		db.get_database_backend(),
		"UPDATE users SET updated_at = ? WHERE id = ?",
		vec![render_ts(updated_at).into(), id.into()],
	))
	.await
	.unwrap();
}

pub async fn set_user_email(db: &DatabaseConnection, id: i64, email: &str) {
	db.execute(Statement::from_sql_and_values(
		db.get_database_backend(),
		"UPDATE users SET email = ? WHERE id = ?",
		vec![email.into(), id.into()],
	))
	.await
	.unwrap();
}

pub async fn set_user_sync_enabled(db: &DatabaseConnection, id: i64, enabled: bool) {
	db.execute(Statement::from_sql_and_values(
		db.get_database_backend(),
		"UPDATE users SET sync_enabled = ? WHERE id = ?",
		vec![(enabled as i32).into(), id.into()],
	))
	.await
	.unwrap();
}

pub async fn delete_user(db: &DatabaseConnection, id: i64) {
	db.execute(Statement::from_sql_and_values(
		db.get_database_backend(),
		"DELETE FROM users WHERE id = ?",
		vec![id.into()],
	))
	.await
	.unwrap();
}

async fn scalar_i64(
	db: &DatabaseConnection,
	sql: &str,
	id: i64,
	column: &str,
) -> SyncResult<Option<i64>> {
	let row = db
		.query_one(Statement::from_sql_and_values(
			db.get_database_backend(),
			sql,
			vec![id.into()],
		))
		.await?;
	match row {
		Some(row) => Ok(row.try_get::<Option<i64>>("", column)?),
		None => Ok(None),
	}
}

/// Record source over the `users` fixture table.
pub struct UserSource;

#[async_trait]
impl RecordSource for UserSource {
	async fn exists(&self, db: &DatabaseConnection, id: i64) -> SyncResult<bool> {
		Ok(scalar_i64(db, "SELECT id FROM users WHERE id = ?", id, "id")
			.await?
			.is_some())
	}

	async fn payload(
		&self,
		db: &DatabaseConnection,
		id: i64,
		_crm_name: &str,
	) -> SyncResult<Option<Payload>> {
		let row = db
			.query_one(Statement::from_sql_and_values(
				db.get_database_backend(),
				"SELECT email, name FROM users WHERE id = ?",
				vec![id.into()],
			))
			.await?;
		let Some(row) = row else {
			return Ok(None);
		};

		let mut payload = Payload::new();
		payload.insert("email".into(), row.try_get::<String>("", "email")?.into());
		if let Some(name) = row.try_get::<Option<String>>("", "name")? {
			payload.insert("name".into(), name.into());
		}
		Ok(Some(payload))
	}

	async fn sync_if(&self, db: &DatabaseConnection, id: i64, _crm_name: &str) -> SyncResult<bool> {
		Ok(scalar_i64(
			db,
			"SELECT sync_enabled FROM users WHERE id = ?",
			id,
			"sync_enabled",
		)
		.await?
		.is_some_and(|v| v != 0))
	}

	async fn association_records(
		&self,
		db: &DatabaseConnection,
		id: i64,
		association: &str,
	) -> SyncResult<Vec<RecordRef>> {
		match association {
			"organisation" => Ok(scalar_i64(
				db,
				"SELECT organisation_id FROM users WHERE id = ?",
				id,
				"organisation_id",
			)
			.await?
			.map(|org| vec![RecordRef::new("Organisation", org)])
			.unwrap_or_default()),
			"referrer" => Ok(scalar_i64(
				db,
				"SELECT referrer_id FROM users WHERE id = ?",
				id,
				"referrer_id",
			)
			.await?
			.map(|referrer| vec![RecordRef::new("User", referrer)])
			.unwrap_or_default()),
			_ => Ok(Vec::new()),
		}
	}
}

/// Record source over the `organisations` fixture table.
pub struct OrgSource;

#[async_trait]
impl RecordSource for OrgSource {
	async fn exists(&self, db: &DatabaseConnection, id: i64) -> SyncResult<bool> {
		Ok(
			scalar_i64(db, "SELECT id FROM organisations WHERE id = ?", id, "id")
				.await?
				.is_some(),
		)
	}

	async fn payload(
		&self,
		db: &DatabaseConnection,
		id: i64,
		_crm_name: &str,
	) -> SyncResult<Option<Payload>> {
		let row = db
			.query_one(Statement::from_sql_and_values(
				db.get_database_backend(),
				"SELECT name FROM organisations WHERE id = ?",
				vec![id.into()],
			))
			.await?;
		let Some(row) = row else {
			return Ok(None);
		};

		let mut payload = Payload::new();
		payload.insert("name".into(), row.try_get::<String>("", "name")?.into());
		Ok(Some(payload))
	}

	async fn association_records(
		&self,
		db: &DatabaseConnection,
		id: i64,
		association: &str,
	) -> SyncResult<Vec<RecordRef>> {
		match association {
			"parent" => Ok(scalar_i64(
				db,
				"SELECT parent_id FROM organisations WHERE id = ?",
				id,
				"parent_id",
			)
			.await?
			.map(|parent| vec![RecordRef::new("Organisation", parent)])
			.unwrap_or_default()),
			_ => Ok(Vec::new()),
		}
	}
}

pub fn user_descriptor() -> ModelDescriptor {
	ModelDescriptor::new("User", "users")
}

pub fn org_descriptor() -> ModelDescriptor {
	ModelDescriptor::new("Organisation", "organisations")
}

pub fn org_descriptor_with_legacy_column() -> ModelDescriptor {
	org_descriptor().crm_id_column("hubspot_id")
}

pub struct Harness {
	pub engine: Engine,
	pub ctx: Arc<EngineContext>,
	pub adapter: Arc<MockAdapter>,
	pub cache: Arc<InMemoryCacheStore>,
}

impl Harness {
	pub fn user(&self, id: i64) -> RecordRef {
		RecordRef::new("User", id)
	}

	pub fn org(&self, id: i64) -> RecordRef {
		RecordRef::new("Organisation", id)
	}
}

/// Engine over an in-memory store with a `hubspot` CRM backed by a mock
/// adapter. Bindings are registered by each test.
pub async fn harness() -> Harness {
	harness_with(EngineConfig::default()).await
}

pub async fn harness_with(config: EngineConfig) -> Harness {
	let db = connect_memory().await;
	let cache = Arc::new(InMemoryCacheStore::new());
	let engine = Engine::builder()
		.database(db)
		.config(config)
		.cache(cache.clone())
		.build()
		.unwrap();

	let adapter = Arc::new(MockAdapter::returning("crm-1"));
	let ctx = engine.context();
	ctx.crms
		.register("hubspot", adapter.clone(), CrmOptions::default());
	ctx.models.register(user_descriptor());
	ctx.models.register(org_descriptor());

	Harness {
		engine,
		ctx,
		adapter,
		cache,
	}
}

/// Poll until `predicate` returns true or the timeout elapses.
pub async fn wait_until<F, Fut>(mut predicate: F, timeout_ms: u64) -> bool
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = bool>,
{
	let deadline = std::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
	loop {
		if predicate().await {
			return true;
		}
		if std::time::Instant::now() > deadline {
			return false;
		}
		tokio::time::sleep(std::time::Duration::from_millis(5)).await;
	}
}
