use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{DatabaseBackend, Statement};
use sea_orm_migration::sea_query::{
    MysqlQueryBuilder, PostgresQueryBuilder, QueryStatementWriter, SqliteQueryBuilder,
    Value as SeaValue,
};

use crate::db::TemporaSchemaVersion;
use tempora_core::Hlc;

mod m20250101_000001_init;
mod m20250301_000002_entity_snapshots;

/// Longest entity id the keyed columns accept.
pub(crate) const ENTITY_ID_LEN: u32 = 255;
/// Longest expanded attribute IRI the keyed columns accept.
pub(crate) const ATTRIBUTE_NAME_LEN: u32 = 512;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_init::Migration),
            Box::new(m20250301_000002_entity_snapshots::Migration),
        ]
    }
}

/// Id column typed per backend: native uuid, 16 raw bytes, or hyphenated text.
fn id_col(backend: DatabaseBackend, col: impl Iden, nullable: bool) -> ColumnDef {
    let mut def = ColumnDef::new(col);
    let typed = match backend {
        DatabaseBackend::Postgres => def.uuid(),
        DatabaseBackend::MySql => def.binary_len(16),
        _ => def.string_len(36),
    };
    let def = if nullable { typed.null() } else { typed.not_null() };
    def.to_owned()
}

async fn record_schema_version(manager: &SchemaManager<'_>, name: &str) -> Result<(), DbErr> {
    let checksum = blake3::hash(name.as_bytes()).to_hex();
    let app_version = SeaValue::String(Some(env!("CARGO_PKG_VERSION").to_string()));
    let row = Query::insert()
        .into_table(TemporaSchemaVersion::Table)
        .columns([
            TemporaSchemaVersion::Version,
            TemporaSchemaVersion::AppliedAtHlc,
            TemporaSchemaVersion::Checksum,
            TemporaSchemaVersion::AppVersion,
        ])
        .values_panic([
            name.into(),
            Hlc::now().as_i64().into(),
            checksum.as_str().into(),
            app_version.into(),
        ])
        .to_owned();
    run(manager, &row).await
}

async fn forget_schema_version(manager: &SchemaManager<'_>, name: &str) -> Result<(), DbErr> {
    let row = Query::delete()
        .from_table(TemporaSchemaVersion::Table)
        .and_where(Expr::col(TemporaSchemaVersion::Version).eq(name))
        .to_owned();
    run(manager, &row).await
}

async fn run<S: QueryStatementWriter>(manager: &SchemaManager<'_>, stmt: &S) -> Result<(), DbErr> {
    let backend = manager.get_database_backend();
    let (sql, values) = match backend {
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => stmt.build(MysqlQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    };
    manager
        .get_connection()
        .execute_raw(Statement::from_sql_and_values(backend, sql, values))
        .await
        .map(|_| ())
}
