//! Database infrastructure using SeaORM

use sea_orm::{ConnectOptions, Database as SeaDatabase, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::info;

pub mod entities;
pub mod migration;
pub mod pending;
pub mod sync_state;

pub use pending::PendingDependencyStore;
pub use sync_state::SyncStateStore;

/// Database wrapper for the sync engine
pub struct Database {
	conn: DatabaseConnection,
}

impl Database {
	/// Connect to the application store (`sqlite://…` or `postgres://…`).
	pub async fn connect(url: &str) -> Result<Self, DbErr> {
		let mut opt = ConnectOptions::new(url.to_string());
		opt.max_connections(10)
			.connect_timeout(Duration::from_secs(8))
			.idle_timeout(Duration::from_secs(8))
			.sqlx_logging(false); // tracing covers query logging

		let conn = SeaDatabase::connect(opt).await?;
		info!(url, "connected to application store");

		Ok(Self { conn })
	}

	/// Run the engine's own migrations (the two sync tables).
	pub async fn migrate(&self) -> Result<(), DbErr> {
		migration::Migrator::up(&self.conn, None).await?;
		info!("sync table migrations completed");
		Ok(())
	}

	pub fn conn(&self) -> &DatabaseConnection {
		&self.conn
	}

	pub fn into_conn(self) -> DatabaseConnection {
		self.conn
	}
}
