use sea_orm_migration::prelude::*;

use super::{ENTITY_ID_LEN, forget_schema_version, record_schema_version};
use crate::db::TemporaEntitySnapshot;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TemporaEntitySnapshot::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TemporaEntitySnapshot::EntityId)
                            .string_len(ENTITY_ID_LEN)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TemporaEntitySnapshot::Payload)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TemporaEntitySnapshot::Version)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TemporaEntitySnapshot::UpdatedAtHlc)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;
        record_schema_version(manager, self.name()).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(TemporaEntitySnapshot::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        forget_schema_version(manager, self.name()).await
    }
}
