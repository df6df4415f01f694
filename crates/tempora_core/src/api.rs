use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::{
    AttributeInstance, Id, InstanceGroup, InstancePage, InstanceQuery, LdContext,
    NewAttributeInstance, NewTemporalAttribute, ObservationGroup, TemporaResult,
    TemporalAttributeRecord, TemporalEntityQuery, TimeRange,
};

/// One canonical record per (entity, attribute), with the entity's snapshot.
#[async_trait]
pub trait TemporalAttributeRegistry {
    /// Inserts the record or returns the id of the one already registered.
    async fn create(&self, record: NewTemporalAttribute) -> TemporaResult<Id>;
    /// Replaces the snapshot of the record's entity; `false` for an unknown record.
    async fn refresh_snapshot(&self, record_id: Id, payload: JsonValue) -> TemporaResult<bool>;
    async fn find_by_entity(
        &self,
        entity_id: &str,
        attributes: &[String],
    ) -> TemporaResult<Vec<TemporalAttributeRecord>>;
    async fn find_one(&self, entity_id: &str) -> TemporaResult<Option<TemporalAttributeRecord>>;
    async fn find_by_entity_and_attribute(
        &self,
        entity_id: &str,
        attribute_name: &str,
    ) -> TemporaResult<Option<TemporalAttributeRecord>>;
}

/// Append-only observations owned by registry records.
#[async_trait]
pub trait AttributeInstanceStore {
    async fn create_instance(&self, instance: NewAttributeInstance) -> TemporaResult<Id>;
    async fn fetch_instances(&self, query: InstanceQuery) -> TemporaResult<Vec<InstanceGroup>>;
    async fn fetch_page(
        &self,
        query: &InstanceQuery,
        limit: u32,
        cursor: Option<&str>,
    ) -> TemporaResult<InstancePage>;
    async fn stream_instances(
        &self,
        query: InstanceQuery,
    ) -> TemporaResult<tokio::sync::mpsc::Receiver<TemporaResult<AttributeInstance>>>;
}

/// Caller-facing surface of the temporal subsystem.
#[async_trait]
pub trait TemporalService {
    /// Persists every temporal attribute of `document`; returns the instance count.
    async fn ingest_temporal_references(&self, document: &JsonValue) -> TemporaResult<usize>;
    async fn get_records_for_entity(
        &self,
        entity_id: &str,
        attributes: &[String],
    ) -> TemporaResult<Vec<TemporalAttributeRecord>>;
    async fn get_first_record_for_entity(
        &self,
        entity_id: &str,
    ) -> TemporaResult<Option<TemporalAttributeRecord>>;
    async fn get_record_for_entity_and_attribute(
        &self,
        entity_id: &str,
        attribute_name: &str,
    ) -> TemporaResult<Option<TemporalAttributeRecord>>;
    async fn observation_groups(
        &self,
        entity_id: &str,
        attributes: &[String],
        range: TimeRange,
        last_n: Option<u32>,
    ) -> TemporaResult<Vec<ObservationGroup>>;
    fn inject_temporal_values(
        &self,
        document: &JsonValue,
        context: &LdContext,
        groups: &[ObservationGroup],
    ) -> TemporaResult<JsonValue>;
    async fn query_temporal_entity(
        &self,
        query: TemporalEntityQuery,
        context: &LdContext,
    ) -> TemporaResult<Option<JsonValue>>;
}
