use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum TemporaSchemaVersion {
    Table,
    Version,
    AppliedAtHlc,
    Checksum,
    AppVersion,
}

#[derive(Iden, Clone, Copy)]
pub enum TemporaTemporalAttribute {
    Table,
    Id,
    EntityId,
    EntityType,
    AttributeName,
    ValueKind,
    CreatedAtHlc,
}

#[derive(Iden, Clone, Copy)]
pub enum TemporaAttributeInstance {
    Table,
    Id,
    RecordId,
    ObservedAt,
    MeasuredValue,
    RawValue,
}

#[derive(Iden, Clone, Copy)]
pub enum TemporaEntitySnapshot {
    Table,
    EntityId,
    Payload,
    Version,
    UpdatedAtHlc,
}
