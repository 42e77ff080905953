//! Migration creating the engine's two tables

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.create_table(
				Table::create()
					.table(CrmSynchronisations::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(CrmSynchronisations::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(CrmSynchronisations::CrmName).string().not_null())
					.col(ColumnDef::new(CrmSynchronisations::CrmId).string())
					.col(ColumnDef::new(CrmSynchronisations::LastDigest).string())
					.col(ColumnDef::new(CrmSynchronisations::LastSyncedAt).timestamp_with_time_zone())
					.col(ColumnDef::new(CrmSynchronisations::LastError).string())
					.col(
						ColumnDef::new(CrmSynchronisations::ErrorCount)
							.integer()
							.not_null()
							.default(0),
					)
					.col(ColumnDef::new(CrmSynchronisations::ResourceType).string().not_null())
					.col(
						ColumnDef::new(CrmSynchronisations::ResourceId)
							.big_integer()
							.not_null(),
					)
					.col(
						ColumnDef::new(CrmSynchronisations::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.col(
						ColumnDef::new(CrmSynchronisations::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_crm_synchronisations_resource")
					.table(CrmSynchronisations::Table)
					.col(CrmSynchronisations::ResourceType)
					.col(CrmSynchronisations::ResourceId)
					.col(CrmSynchronisations::CrmName)
					.unique()
					.to_owned(),
			)
			.await?;

		// Partial unique indexes are not expressible through the builder
		manager
			.get_connection()
			.execute_unprepared(
				"CREATE UNIQUE INDEX idx_crm_synchronisations_remote \
				 ON crm_synchronisations (crm_name, resource_type, crm_id) \
				 WHERE crm_id IS NOT NULL",
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(EtlifyPendingSyncs::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(EtlifyPendingSyncs::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(EtlifyPendingSyncs::DependentType).string().not_null())
					.col(
						ColumnDef::new(EtlifyPendingSyncs::DependentId)
							.big_integer()
							.not_null(),
					)
					.col(ColumnDef::new(EtlifyPendingSyncs::DependencyType).string().not_null())
					.col(
						ColumnDef::new(EtlifyPendingSyncs::DependencyId)
							.big_integer()
							.not_null(),
					)
					.col(ColumnDef::new(EtlifyPendingSyncs::CrmName).string().not_null())
					.col(
						ColumnDef::new(EtlifyPendingSyncs::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.col(
						ColumnDef::new(EtlifyPendingSyncs::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_etlify_pending_syncs_tuple")
					.table(EtlifyPendingSyncs::Table)
					.col(EtlifyPendingSyncs::DependentType)
					.col(EtlifyPendingSyncs::DependentId)
					.col(EtlifyPendingSyncs::DependencyType)
					.col(EtlifyPendingSyncs::DependencyId)
					.col(EtlifyPendingSyncs::CrmName)
					.unique()
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_etlify_pending_syncs_dependency")
					.table(EtlifyPendingSyncs::Table)
					.col(EtlifyPendingSyncs::DependencyType)
					.col(EtlifyPendingSyncs::DependencyId)
					.col(EtlifyPendingSyncs::CrmName)
					.to_owned(),
			)
			.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_table(Table::drop().table(EtlifyPendingSyncs::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(CrmSynchronisations::Table).to_owned())
			.await?;
		Ok(())
	}
}

#[derive(Iden)]
enum CrmSynchronisations {
	Table,
	Id,
	CrmName,
	CrmId,
	LastDigest,
	LastSyncedAt,
	LastError,
	ErrorCount,
	ResourceType,
	ResourceId,
	CreatedAt,
	UpdatedAt,
}

#[derive(Iden)]
enum EtlifyPendingSyncs {
	Table,
	Id,
	DependentType,
	DependentId,
	DependencyType,
	DependencyId,
	CrmName,
	CreatedAt,
	UpdatedAt,
}
