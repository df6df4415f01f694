use sea_orm_migration::prelude::*;

use super::{ATTRIBUTE_NAME_LEN, ENTITY_ID_LEN, id_col, record_schema_version};
use crate::db::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        manager
            .create_table(
                Table::create()
                    .table(TemporaSchemaVersion::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TemporaSchemaVersion::Version)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TemporaSchemaVersion::AppliedAtHlc)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TemporaSchemaVersion::Checksum)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TemporaSchemaVersion::AppVersion).string())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TemporaTemporalAttribute::Table)
                    .if_not_exists()
                    .col(id_col(backend, TemporaTemporalAttribute::Id, false))
                    .col(
                        ColumnDef::new(TemporaTemporalAttribute::EntityId)
                            .string_len(ENTITY_ID_LEN)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TemporaTemporalAttribute::EntityType)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TemporaTemporalAttribute::AttributeName)
                            .string_len(ATTRIBUTE_NAME_LEN)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TemporaTemporalAttribute::ValueKind)
                            .small_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TemporaTemporalAttribute::CreatedAtHlc)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_tempora_temporal_attribute")
                            .col(TemporaTemporalAttribute::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("tempora_temporal_attribute_entity_attr_idx")
                    .table(TemporaTemporalAttribute::Table)
                    .col(TemporaTemporalAttribute::EntityId)
                    .col(TemporaTemporalAttribute::AttributeName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TemporaAttributeInstance::Table)
                    .if_not_exists()
                    .col(id_col(backend, TemporaAttributeInstance::Id, false))
                    .col(id_col(backend, TemporaAttributeInstance::RecordId, false))
                    .col(
                        ColumnDef::new(TemporaAttributeInstance::ObservedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TemporaAttributeInstance::MeasuredValue)
                            .double()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TemporaAttributeInstance::RawValue)
                            .text()
                            .null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_tempora_attribute_instance")
                            .col(TemporaAttributeInstance::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tempora_attribute_instance_record")
                            .from(
                                TemporaAttributeInstance::Table,
                                TemporaAttributeInstance::RecordId,
                            )
                            .to(TemporaTemporalAttribute::Table, TemporaTemporalAttribute::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("tempora_attribute_instance_record_time_idx")
                    .table(TemporaAttributeInstance::Table)
                    .col(TemporaAttributeInstance::RecordId)
                    .col(TemporaAttributeInstance::ObservedAt)
                    .to_owned(),
            )
            .await?;

        record_schema_version(manager, self.name()).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(TemporaAttributeInstance::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(TemporaTemporalAttribute::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(TemporaSchemaVersion::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}
