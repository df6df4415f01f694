use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use sea_orm::sea_query;
use sea_orm::sea_query::{
    Expr, ExprTrait, MysqlQueryBuilder, OnConflict, Order, PostgresQueryBuilder, Query,
    QueryStatementWriter, SelectStatement, SqliteQueryBuilder, Value as SeaValue,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement, TransactionTrait, TryGetable,
};
use sea_orm_migration::MigratorTrait;
use serde_json::{Map, Value as JsonValue};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::{
    DEFAULT_FETCH_PAGE_SIZE, DEFAULT_MAX_ATTRIBUTES, DEFAULT_MAX_FETCH_INSTANCES,
    FAILPOINT_AFTER_INSTANCE_INSERT, FAILPOINT_AFTER_RECORD_UPSERT,
    FAILPOINT_AFTER_SNAPSHOT_UPSERT, LimitsConfig,
};
use crate::db::*;
use crate::migration::Migrator;
use crate::{PoolConfig, TemporaConfig};
use tempora_core::vocab::{JSONLD_ID, JSONLD_TYPE};
use tempora_core::{
    AttributeInstance, AttributeInstanceStore, DocumentCodec, EntitySnapshot, Hlc, Id,
    InstanceCursor, InstanceGroup, InstancePage, InstanceQuery, InstanceValue, LdContext,
    NewAttributeInstance, NewTemporalAttribute, ObservationGroup, ObservedAt, TemporaError,
    TemporaResult, TemporalAttributeRecord, TemporalAttributeRegistry, TemporalCandidate,
    TemporalEntityQuery, TemporalService, TermCodec, TimeRange, ValueKind, entity_id,
    entity_type, extract, instance_value,
};

#[derive(Clone)]
pub struct TemporaStore {
    conn: DatabaseConnection,
    backend: DatabaseBackend,
    limits: TemporaLimits,
    failpoints: HashSet<String>,
    codec: TermCodec,
}

#[derive(Clone, Copy, Debug)]
struct TemporaLimits {
    max_attributes: usize,
    fetch_page_size: u32,
    max_fetch_instances: usize,
}

impl TemporaLimits {
    fn from_config(config: &TemporaConfig) -> Self {
        let limits = config
            .limits
            .clone()
            .unwrap_or_else(LimitsConfig::with_defaults);
        Self {
            max_attributes: limits.max_attributes.unwrap_or(DEFAULT_MAX_ATTRIBUTES),
            fetch_page_size: Ord::max(
                limits.fetch_page_size.unwrap_or(DEFAULT_FETCH_PAGE_SIZE),
                1,
            ),
            max_fetch_instances: Ord::max(
                limits
                    .max_fetch_instances
                    .unwrap_or(DEFAULT_MAX_FETCH_INSTANCES),
                1,
            ),
        }
    }
}

/// Registry row together with the entity fields it is keyed by.
struct RecordKey<'a> {
    entity_id: &'a str,
    entity_type: &'a str,
    attribute_name: &'a str,
    value_kind: ValueKind,
}

impl TemporaStore {
    pub async fn connect(config: &TemporaConfig, base_dir: &Path) -> TemporaResult<Self> {
        let url = config.database.connection_string(base_dir)?;
        let options = pool_options(url, config.pool.clone().unwrap_or_default());
        let conn = Database::connect(options).await?;
        let backend = conn.get_database_backend();
        let failpoints = config
            .failpoints
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect::<HashSet<_>>();
        let store = Self {
            conn,
            backend,
            limits: TemporaLimits::from_config(config),
            failpoints,
            codec: TermCodec,
        };
        Migrator::up(&store.conn, None).await?;
        log::debug!(
            "tempora store connected backend={} failpoints={}",
            config.backend_name(),
            store.failpoints.len()
        );
        Ok(store)
    }

    pub async fn connect_sqlite(path: &Path) -> TemporaResult<Self> {
        let config = TemporaConfig::default_sqlite(path.to_string_lossy());
        Self::connect(&config, path.parent().unwrap_or_else(|| Path::new("."))).await
    }

    fn maybe_failpoint(&self, key: &str) -> TemporaResult<()> {
        if self.failpoints.contains(key) {
            Err(TemporaError::persistence(format!("failpoint {key}")))
        } else {
            Ok(())
        }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn codec(&self) -> &dyn DocumentCodec {
        &self.codec
    }

    async fn upsert_snapshot<C: ConnectionTrait>(
        &self,
        conn: &C,
        entity_id: &str,
        payload: &JsonValue,
        at: Hlc,
    ) -> TemporaResult<()> {
        let encoded = serde_json::to_string(payload)
            .map_err(|err| TemporaError::persistence(format!("encode snapshot: {err}")))?;
        let insert = Query::insert()
            .into_table(TemporaEntitySnapshot::Table)
            .columns([
                TemporaEntitySnapshot::EntityId,
                TemporaEntitySnapshot::Payload,
                TemporaEntitySnapshot::Version,
                TemporaEntitySnapshot::UpdatedAtHlc,
            ])
            .values_panic([
                entity_id.into(),
                encoded.clone().into(),
                1i64.into(),
                at.as_i64().into(),
            ])
            .on_conflict(
                OnConflict::column(TemporaEntitySnapshot::EntityId)
                    .value(TemporaEntitySnapshot::Payload, encoded)
                    .value(
                        TemporaEntitySnapshot::Version,
                        Expr::col((TemporaEntitySnapshot::Table, TemporaEntitySnapshot::Version))
                            .add(1),
                    )
                    .value(TemporaEntitySnapshot::UpdatedAtHlc, at.as_i64())
                    .to_owned(),
            )
            .to_owned();
        exec(conn, &insert).await
    }

    /// Inserts the record unless `(entity_id, attribute_name)` exists, then
    /// reads back the surviving row. The stored kind wins over `key.value_kind`.
    async fn upsert_record<C: ConnectionTrait>(
        &self,
        conn: &C,
        key: RecordKey<'_>,
    ) -> TemporaResult<(Id, ValueKind)> {
        let insert = Query::insert()
            .into_table(TemporaTemporalAttribute::Table)
            .columns([
                TemporaTemporalAttribute::Id,
                TemporaTemporalAttribute::EntityId,
                TemporaTemporalAttribute::EntityType,
                TemporaTemporalAttribute::AttributeName,
                TemporaTemporalAttribute::ValueKind,
                TemporaTemporalAttribute::CreatedAtHlc,
            ])
            .values_panic([
                id_value(self.backend, Id::new()).into(),
                key.entity_id.into(),
                key.entity_type.into(),
                key.attribute_name.into(),
                key.value_kind.as_i16().into(),
                Hlc::now().as_i64().into(),
            ])
            .on_conflict(
                OnConflict::columns([
                    TemporaTemporalAttribute::EntityId,
                    TemporaTemporalAttribute::AttributeName,
                ])
                .do_nothing()
                .to_owned(),
            )
            .to_owned();
        exec(conn, &insert).await?;

        let select = Query::select()
            .from(TemporaTemporalAttribute::Table)
            .columns([
                TemporaTemporalAttribute::Id,
                TemporaTemporalAttribute::ValueKind,
            ])
            .and_where(Expr::col(TemporaTemporalAttribute::EntityId).eq(key.entity_id))
            .and_where(Expr::col(TemporaTemporalAttribute::AttributeName).eq(key.attribute_name))
            .limit(1)
            .to_owned();
        let row = query_one(conn, &select).await?.ok_or_else(|| {
            TemporaError::persistence(format!(
                "record for {} {} vanished after upsert",
                key.entity_id, key.attribute_name
            ))
        })?;
        let id = read_id(&row, TemporaTemporalAttribute::Id)?;
        let kind = read_value_kind(&row)?;
        Ok((id, kind))
    }

    async fn insert_instance<C: ConnectionTrait>(
        &self,
        conn: &C,
        instance: &NewAttributeInstance,
    ) -> TemporaResult<Id> {
        let id = Id::new();
        let insert = Query::insert()
            .into_table(TemporaAttributeInstance::Table)
            .columns([
                TemporaAttributeInstance::Id,
                TemporaAttributeInstance::RecordId,
                TemporaAttributeInstance::ObservedAt,
                TemporaAttributeInstance::MeasuredValue,
                TemporaAttributeInstance::RawValue,
            ])
            .values_panic([
                id_value(self.backend, id).into(),
                id_value(self.backend, instance.record_id).into(),
                instance.observed_at.as_micros().into(),
                SeaValue::Double(instance.value.measured_value()).into(),
                SeaValue::String(instance.value.raw_value().map(str::to_string)).into(),
            ])
            .to_owned();
        exec(conn, &insert).await?;
        Ok(id)
    }

    /// Classifies, registers and stores one extracted attribute; returns the
    /// number of instances written.
    async fn persist_candidate<C: ConnectionTrait>(
        &self,
        conn: &C,
        entity_id: &str,
        entity_type: &str,
        candidate: &TemporalCandidate,
    ) -> TemporaResult<usize> {
        let (record_id, kind) = self
            .upsert_record(
                conn,
                RecordKey {
                    entity_id,
                    entity_type,
                    attribute_name: &candidate.attribute_name,
                    value_kind: candidate.value_kind(),
                },
            )
            .await?;
        self.maybe_failpoint(FAILPOINT_AFTER_RECORD_UPSERT)?;
        for observation in &candidate.observations {
            let value = instance_value(&candidate.attribute_name, kind, &observation.value)?;
            self.insert_instance(
                conn,
                &NewAttributeInstance {
                    record_id,
                    observed_at: observation.observed_at,
                    value,
                },
            )
            .await?;
            self.maybe_failpoint(FAILPOINT_AFTER_INSTANCE_INSERT)?;
        }
        Ok(candidate.observations.len())
    }

    async fn select_records<C: ConnectionTrait>(
        &self,
        conn: &C,
        entity_id: &str,
        attributes: &[String],
        limit: Option<u64>,
    ) -> TemporaResult<Vec<TemporalAttributeRecord>> {
        let mut select = Query::select()
            .from(TemporaTemporalAttribute::Table)
            .columns([
                (TemporaTemporalAttribute::Table, TemporaTemporalAttribute::Id),
                (
                    TemporaTemporalAttribute::Table,
                    TemporaTemporalAttribute::EntityId,
                ),
                (
                    TemporaTemporalAttribute::Table,
                    TemporaTemporalAttribute::EntityType,
                ),
                (
                    TemporaTemporalAttribute::Table,
                    TemporaTemporalAttribute::AttributeName,
                ),
                (
                    TemporaTemporalAttribute::Table,
                    TemporaTemporalAttribute::ValueKind,
                ),
                (
                    TemporaTemporalAttribute::Table,
                    TemporaTemporalAttribute::CreatedAtHlc,
                ),
            ])
            .columns([
                (TemporaEntitySnapshot::Table, TemporaEntitySnapshot::Payload),
                (TemporaEntitySnapshot::Table, TemporaEntitySnapshot::Version),
                (
                    TemporaEntitySnapshot::Table,
                    TemporaEntitySnapshot::UpdatedAtHlc,
                ),
            ])
            .left_join(
                TemporaEntitySnapshot::Table,
                Expr::col((TemporaEntitySnapshot::Table, TemporaEntitySnapshot::EntityId)).equals(
                    (
                        TemporaTemporalAttribute::Table,
                        TemporaTemporalAttribute::EntityId,
                    ),
                ),
            )
            .and_where(
                Expr::col((
                    TemporaTemporalAttribute::Table,
                    TemporaTemporalAttribute::EntityId,
                ))
                .eq(entity_id),
            )
            .order_by(
                (
                    TemporaTemporalAttribute::Table,
                    TemporaTemporalAttribute::CreatedAtHlc,
                ),
                Order::Asc,
            )
            .order_by(
                (TemporaTemporalAttribute::Table, TemporaTemporalAttribute::Id),
                Order::Asc,
            )
            .to_owned();
        if !attributes.is_empty() {
            select.and_where(
                Expr::col((
                    TemporaTemporalAttribute::Table,
                    TemporaTemporalAttribute::AttributeName,
                ))
                .is_in(attributes.iter().cloned()),
            );
        }
        if let Some(limit) = limit {
            select.limit(limit);
        }
        query_all(conn, &select)
            .await?
            .iter()
            .map(record_from_row)
            .collect()
    }

    async fn select_record_by_attribute<C: ConnectionTrait>(
        &self,
        conn: &C,
        entity_id: &str,
        attribute_name: &str,
    ) -> TemporaResult<Option<TemporalAttributeRecord>> {
        let mut records = self
            .select_records(conn, entity_id, &[attribute_name.to_string()], Some(1))
            .await?;
        Ok(records.pop())
    }

    async fn record_entity_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        record_id: Id,
    ) -> TemporaResult<Option<String>> {
        let select = Query::select()
            .from(TemporaTemporalAttribute::Table)
            .column(TemporaTemporalAttribute::EntityId)
            .and_where(Expr::col(TemporaTemporalAttribute::Id).eq(id_value(self.backend, record_id)))
            .limit(1)
            .to_owned();
        let Some(row) = query_one(conn, &select).await? else {
            return Ok(None);
        };
        read(&row, TemporaTemporalAttribute::EntityId).map(Some)
    }

    fn instance_select(&self, record_id: Id, range: &TimeRange) -> SelectStatement {
        let mut select = Query::select()
            .from(TemporaAttributeInstance::Table)
            .columns([
                TemporaAttributeInstance::Id,
                TemporaAttributeInstance::RecordId,
                TemporaAttributeInstance::ObservedAt,
                TemporaAttributeInstance::MeasuredValue,
                TemporaAttributeInstance::RawValue,
            ])
            .and_where(
                Expr::col(TemporaAttributeInstance::RecordId).eq(id_value(self.backend, record_id)),
            )
            .to_owned();
        if let Some(start) = range.start {
            select.and_where(Expr::col(TemporaAttributeInstance::ObservedAt).gte(start.as_micros()));
        }
        if let Some(end) = range.end {
            select.and_where(Expr::col(TemporaAttributeInstance::ObservedAt).lt(end.as_micros()));
        }
        select
    }

    async fn select_instances<C: ConnectionTrait>(
        &self,
        conn: &C,
        record_id: Id,
        range: &TimeRange,
        last_n: Option<u32>,
    ) -> TemporaResult<Vec<AttributeInstance>> {
        let mut select = self.instance_select(record_id, range);
        if let Some(last_n) = last_n {
            select
                .order_by(TemporaAttributeInstance::ObservedAt, Order::Desc)
                .order_by(TemporaAttributeInstance::Id, Order::Desc)
                .limit(u64::from(last_n));
            let mut instances = query_all(conn, &select)
                .await?
                .iter()
                .map(instance_from_row)
                .collect::<TemporaResult<Vec<_>>>()?;
            instances.reverse();
            return Ok(instances);
        }
        let cap = self.limits.max_fetch_instances;
        select
            .order_by(TemporaAttributeInstance::ObservedAt, Order::Asc)
            .order_by(TemporaAttributeInstance::Id, Order::Asc)
            .limit(cap as u64 + 1);
        let rows = query_all(conn, &select).await?;
        if rows.len() > cap {
            return Err(TemporaError::validation(format!(
                "record {record_id} holds more than {cap} instances in range; use paged reads"
            )));
        }
        rows.iter().map(instance_from_row).collect()
    }

    async fn select_instances_after<C: ConnectionTrait>(
        &self,
        conn: &C,
        record_id: Id,
        range: &TimeRange,
        after: Option<&InstanceCursor>,
        limit: usize,
    ) -> TemporaResult<Vec<AttributeInstance>> {
        let mut select = self.instance_select(record_id, range);
        if let Some(cursor) = after {
            let instance_id = cursor.instance_id()?;
            select.and_where(
                Expr::col(TemporaAttributeInstance::ObservedAt)
                    .gt(cursor.observed_at)
                    .or(Expr::col(TemporaAttributeInstance::ObservedAt)
                        .eq(cursor.observed_at)
                        .and(
                            Expr::col(TemporaAttributeInstance::Id)
                                .gt(id_value(self.backend, instance_id)),
                        )),
            );
        }
        select
            .order_by(TemporaAttributeInstance::ObservedAt, Order::Asc)
            .order_by(TemporaAttributeInstance::Id, Order::Asc)
            .limit(limit as u64);
        query_all(conn, &select)
            .await?
            .iter()
            .map(instance_from_row)
            .collect()
    }

    /// Whole in-range history of one record, read in pages of `fetch_page_size`.
    async fn page_through(
        &self,
        record_id: Id,
        range: TimeRange,
    ) -> TemporaResult<Vec<AttributeInstance>> {
        let query = InstanceQuery {
            record_ids: vec![record_id],
            range,
            last_n: None,
        };
        let mut instances = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .fetch_page(&query, self.limits.fetch_page_size, cursor.as_deref())
                .await?;
            instances.extend(page.instances);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(instances),
            }
        }
    }

    /// Groups the instances of `records`, dropping attributes with nothing in range.
    async fn groups_for_records(
        &self,
        records: &[TemporalAttributeRecord],
        range: TimeRange,
        last_n: Option<u32>,
    ) -> TemporaResult<Vec<ObservationGroup>> {
        let mut observed = Vec::with_capacity(records.len());
        for record in records {
            let instances = match last_n {
                Some(0) => continue,
                Some(_) => {
                    self.select_instances(&self.conn, record.id, &range, last_n)
                        .await?
                }
                None => self.page_through(record.id, range).await?,
            };
            if instances.is_empty() {
                continue;
            }
            observed.push(ObservationGroup {
                attribute_name: record.attribute_name.clone(),
                observations: instances.iter().map(Into::into).collect(),
            });
        }
        if observed.is_empty() {
            Ok(ObservationGroup::no_data())
        } else {
            Ok(observed)
        }
    }
}

#[async_trait]
impl TemporalAttributeRegistry for TemporaStore {
    async fn create(&self, record: NewTemporalAttribute) -> TemporaResult<Id> {
        let tx = self.conn.begin().await?;
        if let Some(payload) = &record.entity_payload {
            self.upsert_snapshot(&tx, &record.entity_id, payload, Hlc::now())
                .await?;
        }
        let (id, _) = self
            .upsert_record(
                &tx,
                RecordKey {
                    entity_id: &record.entity_id,
                    entity_type: &record.entity_type,
                    attribute_name: &record.attribute_name,
                    value_kind: record.value_kind,
                },
            )
            .await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn refresh_snapshot(&self, record_id: Id, payload: JsonValue) -> TemporaResult<bool> {
        let tx = self.conn.begin().await?;
        let Some(entity_id) = self.record_entity_id(&tx, record_id).await? else {
            return Ok(false);
        };
        self.upsert_snapshot(&tx, &entity_id, &payload, Hlc::now())
            .await?;
        tx.commit().await?;
        log::debug!("tempora snapshot refreshed entity={entity_id}");
        Ok(true)
    }

    async fn find_by_entity(
        &self,
        entity_id: &str,
        attributes: &[String],
    ) -> TemporaResult<Vec<TemporalAttributeRecord>> {
        self.select_records(&self.conn, entity_id, attributes, None)
            .await
    }

    async fn find_one(&self, entity_id: &str) -> TemporaResult<Option<TemporalAttributeRecord>> {
        let mut records = self
            .select_records(&self.conn, entity_id, &[], Some(1))
            .await?;
        Ok(records.pop())
    }

    async fn find_by_entity_and_attribute(
        &self,
        entity_id: &str,
        attribute_name: &str,
    ) -> TemporaResult<Option<TemporalAttributeRecord>> {
        self.select_record_by_attribute(&self.conn, entity_id, attribute_name)
            .await
    }
}

#[async_trait]
impl AttributeInstanceStore for TemporaStore {
    async fn create_instance(&self, instance: NewAttributeInstance) -> TemporaResult<Id> {
        if self
            .record_entity_id(&self.conn, instance.record_id)
            .await?
            .is_none()
        {
            return Err(TemporaError::not_found(format!(
                "temporal record {}",
                instance.record_id
            )));
        }
        self.insert_instance(&self.conn, &instance).await
    }

    async fn fetch_instances(&self, query: InstanceQuery) -> TemporaResult<Vec<InstanceGroup>> {
        let mut groups = Vec::with_capacity(query.record_ids.len());
        for record_id in &query.record_ids {
            let instances = match query.last_n {
                Some(0) => Vec::new(),
                last_n => {
                    self.select_instances(&self.conn, *record_id, &query.range, last_n)
                        .await?
                }
            };
            groups.push(InstanceGroup {
                record_id: *record_id,
                instances,
            });
        }
        Ok(groups)
    }

    async fn fetch_page(
        &self,
        query: &InstanceQuery,
        limit: u32,
        cursor: Option<&str>,
    ) -> TemporaResult<InstancePage> {
        if limit == 0 {
            return Err(TemporaError::validation("page limit must be positive"));
        }
        if query.last_n.is_some() {
            return Err(TemporaError::validation(
                "last_n is not supported for paged reads",
            ));
        }
        let limit = (limit as usize).min(self.limits.max_fetch_instances);
        let start = cursor.map(InstanceCursor::decode).transpose()?;
        let first_index = start.as_ref().map_or(0, |cursor| cursor.record_index);
        let mut instances: Vec<AttributeInstance> = Vec::with_capacity(limit);
        for (index, record_id) in query.record_ids.iter().enumerate().skip(first_index) {
            let remaining = limit - instances.len();
            let after = start
                .as_ref()
                .filter(|cursor| cursor.record_index == index);
            let mut rows = self
                .select_instances_after(&self.conn, *record_id, &query.range, after, remaining + 1)
                .await?;
            let more_in_record = rows.len() > remaining;
            rows.truncate(remaining);
            instances.extend(rows);
            let more_records = index + 1 < query.record_ids.len();
            if instances.len() == limit && (more_in_record || more_records) {
                let next_cursor = instances
                    .last()
                    .map(|last| InstanceCursor::after(index, last).encode())
                    .transpose()?;
                return Ok(InstancePage {
                    instances,
                    next_cursor,
                });
            }
        }
        Ok(InstancePage {
            instances,
            next_cursor: None,
        })
    }

    async fn stream_instances(
        &self,
        query: InstanceQuery,
    ) -> TemporaResult<mpsc::Receiver<TemporaResult<AttributeInstance>>> {
        let page_size = self.limits.fetch_page_size;
        let (tx, rx) = mpsc::channel(page_size as usize);
        let store = self.clone();
        tokio::spawn(async move {
            let mut cursor: Option<String> = None;
            loop {
                if tx.is_closed() {
                    break;
                }
                let page = match store.fetch_page(&query, page_size, cursor.as_deref()).await {
                    Ok(page) => page,
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        break;
                    }
                };
                for instance in page.instances {
                    if tx.send(Ok(instance)).await.is_err() {
                        return;
                    }
                }
                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
        });
        Ok(rx)
    }
}

#[async_trait]
impl TemporalService for TemporaStore {
    async fn ingest_temporal_references(&self, document: &JsonValue) -> TemporaResult<usize> {
        let context = LdContext::from_document(document)?;
        let expanded = self.codec.expand(document, &context)?;
        let candidates = extract(&expanded)?
            .into_iter()
            .collect::<TemporaResult<Vec<_>>>()?;
        if candidates.is_empty() {
            log::debug!("tempora ingest skipped: no temporal attributes");
            return Ok(0);
        }
        if candidates.len() > self.limits.max_attributes {
            return Err(TemporaError::validation(format!(
                "document carries {} temporal attributes, limit is {}",
                candidates.len(),
                self.limits.max_attributes
            )));
        }
        let entity_id = entity_id(&expanded)?;
        let entity_type = entity_type(&expanded)?;

        let tx = self.conn.begin().await?;
        let persisted = async {
            self.upsert_snapshot(&tx, &entity_id, document, Hlc::now())
                .await?;
            self.maybe_failpoint(FAILPOINT_AFTER_SNAPSHOT_UPSERT)?;
            try_join_all(candidates.iter().map(|candidate| {
                self.persist_candidate(&tx, &entity_id, &entity_type, candidate)
            }))
            .await
        }
        .await;
        let persisted = match persisted {
            Ok(counts) => counts.into_iter().sum::<usize>(),
            Err(err) => {
                log::warn!("tempora ingest rolled back entity={entity_id}: {err}");
                return Err(err);
            }
        };
        tx.commit().await?;
        log::info!(
            "tempora ingest committed entity={entity_id} attributes={} instances={persisted}",
            candidates.len()
        );
        Ok(persisted)
    }

    async fn get_records_for_entity(
        &self,
        entity_id: &str,
        attributes: &[String],
    ) -> TemporaResult<Vec<TemporalAttributeRecord>> {
        self.find_by_entity(entity_id, attributes).await
    }

    async fn get_first_record_for_entity(
        &self,
        entity_id: &str,
    ) -> TemporaResult<Option<TemporalAttributeRecord>> {
        self.find_one(entity_id).await
    }

    async fn get_record_for_entity_and_attribute(
        &self,
        entity_id: &str,
        attribute_name: &str,
    ) -> TemporaResult<Option<TemporalAttributeRecord>> {
        self.find_by_entity_and_attribute(entity_id, attribute_name)
            .await
    }

    async fn observation_groups(
        &self,
        entity_id: &str,
        attributes: &[String],
        range: TimeRange,
        last_n: Option<u32>,
    ) -> TemporaResult<Vec<ObservationGroup>> {
        let records = self.find_by_entity(entity_id, attributes).await?;
        if records.is_empty() {
            return Ok(ObservationGroup::no_data());
        }
        self.groups_for_records(&records, range, last_n).await
    }

    fn inject_temporal_values(
        &self,
        document: &JsonValue,
        context: &LdContext,
        groups: &[ObservationGroup],
    ) -> TemporaResult<JsonValue> {
        tempora_core::inject_temporal_values(document, context, groups, &self.codec)
    }

    async fn query_temporal_entity(
        &self,
        query: TemporalEntityQuery,
        context: &LdContext,
    ) -> TemporaResult<Option<JsonValue>> {
        let records = self.find_by_entity(&query.entity_id, &[]).await?;
        let Some(first) = records.first() else {
            return Ok(None);
        };
        let expanded = match &first.entity_snapshot {
            Some(snapshot) => {
                let snapshot_context = LdContext::from_document(&snapshot.payload)?;
                self.codec.expand(&snapshot.payload, &snapshot_context)?
            }
            None => entity_skeleton(first),
        };
        let wanted = query
            .attributes
            .iter()
            .map(|name| {
                self.codec
                    .resolve_key(name, context)
                    .ok_or_else(|| TemporaError::unresolved_key(name.as_str()))
            })
            .collect::<TemporaResult<HashSet<_>>>()?;
        let selected = records
            .into_iter()
            .filter(|record| wanted.is_empty() || wanted.contains(&record.attribute_name))
            .collect::<Vec<_>>();
        let groups = if selected.is_empty() {
            ObservationGroup::no_data()
        } else {
            self.groups_for_records(&selected, query.range, query.last_n)
                .await?
        };
        let injected = self.inject_temporal_values(&expanded, context, &groups)?;
        self.codec.compact(&injected, context).map(Some)
    }
}

/// Expanded `@id`/`@type` stand-in for an entity whose snapshot is gone.
fn entity_skeleton(record: &TemporalAttributeRecord) -> JsonValue {
    let mut entity = Map::new();
    entity.insert(
        JSONLD_ID.to_string(),
        JsonValue::String(record.entity_id.clone()),
    );
    entity.insert(
        JSONLD_TYPE.to_string(),
        JsonValue::Array(vec![JsonValue::String(record.entity_type.clone())]),
    );
    JsonValue::Object(entity)
}

fn record_from_row(row: &QueryResult) -> TemporaResult<TemporalAttributeRecord> {
    let entity_id: String = read(row, TemporaTemporalAttribute::EntityId)?;
    let payload: Option<String> = read(row, TemporaEntitySnapshot::Payload)?;
    let entity_snapshot = match payload {
        Some(payload) => {
            let payload = serde_json::from_str(&payload)
                .map_err(|err| TemporaError::persistence(format!("decode snapshot: {err}")))?;
            let version: i64 = read(row, TemporaEntitySnapshot::Version)?;
            Some(EntitySnapshot {
                entity_id: entity_id.clone(),
                payload,
                version,
                updated_at: read_hlc(row, TemporaEntitySnapshot::UpdatedAtHlc)?,
            })
        }
        None => None,
    };
    Ok(TemporalAttributeRecord {
        id: read_id(row, TemporaTemporalAttribute::Id)?,
        entity_id,
        entity_type: read(row, TemporaTemporalAttribute::EntityType)?,
        attribute_name: read(row, TemporaTemporalAttribute::AttributeName)?,
        value_kind: read_value_kind(row)?,
        created_at: read_hlc(row, TemporaTemporalAttribute::CreatedAtHlc)?,
        entity_snapshot,
    })
}

fn instance_from_row(row: &QueryResult) -> TemporaResult<AttributeInstance> {
    let measured: Option<f64> = read(row, TemporaAttributeInstance::MeasuredValue)?;
    let raw: Option<String> = read(row, TemporaAttributeInstance::RawValue)?;
    let value = match (measured, raw) {
        (Some(value), None) => InstanceValue::Measure(value),
        (None, Some(value)) => InstanceValue::Raw(value),
        _ => {
            return Err(TemporaError::persistence(
                "instance must hold exactly one of measured_value and raw_value",
            ));
        }
    };
    let observed_at: i64 = read(row, TemporaAttributeInstance::ObservedAt)?;
    Ok(AttributeInstance {
        id: read_id(row, TemporaAttributeInstance::Id)?,
        record_id: read_id(row, TemporaAttributeInstance::RecordId)?,
        observed_at: ObservedAt::from_micros(observed_at),
        value,
    })
}

fn read_value_kind(row: &QueryResult) -> TemporaResult<ValueKind> {
    let raw: i16 = read(row, TemporaTemporalAttribute::ValueKind)?;
    ValueKind::from_i16(raw).ok_or_else(|| TemporaError::persistence("invalid value_kind"))
}

fn id_value(backend: DatabaseBackend, id: Id) -> SeaValue {
    match backend {
        DatabaseBackend::Postgres => SeaValue::Uuid(Some(id.as_uuid())),
        DatabaseBackend::MySql => SeaValue::Bytes(Some(id.as_vec())),
        _ => SeaValue::String(Some(id.to_uuid_string())),
    }
}

/// Reads an id stored as text (SQLite), native uuid (Postgres) or 16 bytes (MySQL).
fn read_id(row: &QueryResult, column: impl sea_query::Iden) -> TemporaResult<Id> {
    let name = column.to_string();
    if let Ok(text) = row.try_get::<String>("", &name) {
        return Id::from_uuid_str(&text);
    }
    if let Ok(uuid) = row.try_get::<Uuid>("", &name) {
        return Ok(Id::from(uuid));
    }
    let bytes: Vec<u8> = row.try_get("", &name)?;
    <[u8; 16]>::try_from(bytes)
        .map(Id::from_bytes)
        .map_err(|bytes| TemporaError::persistence(format!("id {name} holds {} bytes", bytes.len())))
}

fn read_hlc(row: &QueryResult, column: impl sea_query::Iden) -> TemporaResult<Hlc> {
    read(row, column).map(Hlc::from_i64)
}

fn read<T: TryGetable>(row: &QueryResult, column: impl sea_query::Iden) -> TemporaResult<T> {
    Ok(row.try_get("", &column.to_string())?)
}

fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Sqlite => stmt.build(SqliteQueryBuilder),
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => stmt.build(MysqlQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

async fn exec<C, S>(conn: &C, stmt: &S) -> TemporaResult<()>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    conn.execute_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(())
}

async fn query_all<C, S>(conn: &C, stmt: &S) -> TemporaResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let rows = conn
        .query_all_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(rows)
}

async fn query_one<C, S>(conn: &C, stmt: &S) -> TemporaResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let row = conn
        .query_one_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(row)
}

fn pool_options(url: String, pool: PoolConfig) -> ConnectOptions {
    let mut options = ConnectOptions::new(url);
    if let Some(max) = pool.max_connections {
        options.max_connections(max);
    }
    if let Some(min) = pool.min_connections {
        options.min_connections(min);
    }
    if let Some(ms) = pool.connect_timeout_ms {
        options.connect_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = pool.acquire_timeout_ms {
        options.acquire_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = pool.idle_timeout_ms {
        options.idle_timeout(Duration::from_millis(ms));
    }
    options
}
