use std::path::Path;

use serde_json::{Value, json};
use tempfile::tempdir;
use tempora_store::vocab::NGSILD_DEFAULT_VOCAB;
use tempora_store::{
    AttributeInstanceStore, InstanceQuery, InstanceValue, ObservedAt, TemporaConfig,
    TemporaError, TemporaResult, TemporaStore, TemporalService, ValueKind,
};

const DEVICE: &str = "urn:ngsi-ld:Device:01234";

fn term(name: &str) -> String {
    format!("{NGSILD_DEFAULT_VOCAB}{name}")
}

fn device(value: Value, observed_at: &str) -> Value {
    json!({
        "id": DEVICE,
        "type": "Device",
        "temperature": {
            "type": "Property",
            "value": value,
            "unitCode": "CEL",
            "observedAt": observed_at
        },
        "@context": "https://uri.etsi.org/ngsi-ld/v1/ngsi-ld-core-context.jsonld"
    })
}

async fn open(base: &Path) -> TemporaResult<TemporaStore> {
    let config = TemporaConfig::default_sqlite(base.join("tempora.sqlite").to_string_lossy());
    TemporaStore::connect(&config, base).await
}

#[tokio::test]
async fn ingests_measure_attribute_with_snapshot() -> TemporaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;

    let persisted = store
        .ingest_temporal_references(&device(json!(23.5), "2023-01-01T00:00:00Z"))
        .await?;
    assert_eq!(persisted, 1);

    let records = store.get_records_for_entity(DEVICE, &[]).await?;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.entity_id, DEVICE);
    assert_eq!(record.entity_type, term("Device"));
    assert_eq!(record.attribute_name, term("temperature"));
    assert_eq!(record.value_kind, ValueKind::Measure);
    let snapshot = record.entity_snapshot.as_ref().expect("snapshot");
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.payload["id"], json!(DEVICE));

    let groups = store
        .fetch_instances(InstanceQuery {
            record_ids: vec![record.id],
            ..InstanceQuery::default()
        })
        .await?;
    assert_eq!(groups.len(), 1);
    let instances = &groups[0].instances;
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].value, InstanceValue::Measure(23.5));
    assert_eq!(
        instances[0].observed_at,
        ObservedAt::parse_rfc3339("2023-01-01T00:00:00Z")?
    );
    Ok(())
}

#[tokio::test]
async fn repeated_ingest_reuses_the_record() -> TemporaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;

    store
        .ingest_temporal_references(&device(json!(21.0), "2023-01-01T00:00:00Z"))
        .await?;
    store
        .ingest_temporal_references(&device(json!(22.0), "2023-01-01T01:00:00Z"))
        .await?;

    let records = store.get_records_for_entity(DEVICE, &[]).await?;
    assert_eq!(records.len(), 1);
    let snapshot = records[0].entity_snapshot.as_ref().expect("snapshot");
    assert_eq!(snapshot.version, 2);

    let groups = store
        .fetch_instances(InstanceQuery {
            record_ids: vec![records[0].id],
            ..InstanceQuery::default()
        })
        .await?;
    let values = groups[0]
        .instances
        .iter()
        .map(|instance| instance.value.measured_value())
        .collect::<Vec<_>>();
    assert_eq!(values, vec![Some(21.0), Some(22.0)]);
    Ok(())
}

#[tokio::test]
async fn string_values_are_stored_raw() -> TemporaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let document = json!({
        "id": "urn:ngsi-ld:Door:1",
        "type": "Door",
        "state": {"type": "Property", "value": "open", "observedAt": "2023-05-01T08:00:00Z"},
        "owner": {"type": "Relationship", "object": "urn:ngsi-ld:Person:7", "observedAt": "2023-05-01T08:00:00Z"},
        "label": {"type": "Property", "value": "front door"}
    });
    assert_eq!(store.ingest_temporal_references(&document).await?, 2);

    let records = store.get_records_for_entity("urn:ngsi-ld:Door:1", &[]).await?;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|record| record.value_kind == ValueKind::Any));
    let groups = store
        .fetch_instances(InstanceQuery {
            record_ids: records.iter().map(|record| record.id).collect(),
            ..InstanceQuery::default()
        })
        .await?;
    let mut raw = groups
        .iter()
        .flat_map(|group| group.instances.iter())
        .filter_map(|instance| instance.value.raw_value().map(str::to_string))
        .collect::<Vec<_>>();
    raw.sort();
    assert_eq!(raw, vec!["open".to_string(), "urn:ngsi-ld:Person:7".to_string()]);
    Ok(())
}

#[tokio::test]
async fn multi_instance_attribute_keeps_every_observation() -> TemporaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let document = json!({
        "id": "urn:ngsi-ld:Vehicle:A1",
        "type": "Vehicle",
        "speed": [
            {"type": "Property", "value": 80, "observedAt": "2023-02-01T10:00:00Z", "datasetId": "urn:ds:gps"},
            {"type": "Property", "value": 82, "observedAt": "2023-02-01T10:00:01Z", "datasetId": "urn:ds:obd"}
        ]
    });
    assert_eq!(store.ingest_temporal_references(&document).await?, 2);
    let record = store
        .get_record_for_entity_and_attribute("urn:ngsi-ld:Vehicle:A1", &term("speed"))
        .await?
        .expect("speed record");
    let groups = store
        .fetch_instances(InstanceQuery {
            record_ids: vec![record.id],
            ..InstanceQuery::default()
        })
        .await?;
    assert_eq!(groups[0].instances.len(), 2);
    Ok(())
}

#[tokio::test]
async fn documents_without_temporal_attributes_write_nothing() -> TemporaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let document = json!({
        "id": "urn:ngsi-ld:Room:1",
        "type": "Room",
        "name": {"type": "Property", "value": "lab"}
    });
    assert_eq!(store.ingest_temporal_references(&document).await?, 0);
    assert!(store.get_first_record_for_entity("urn:ngsi-ld:Room:1").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn missing_value_fails_before_any_write() -> TemporaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let document = json!({
        "id": DEVICE,
        "type": "Device",
        "temperature": {"type": "Property", "value": 20.0, "observedAt": "2023-01-01T00:00:00Z"},
        "humidity": {"type": "Property", "observedAt": "2023-01-01T00:00:00Z"}
    });
    let err = store
        .ingest_temporal_references(&document)
        .await
        .expect_err("missing value");
    assert!(
        matches!(err, TemporaError::MissingValue { ref attribute } if *attribute == term("humidity"))
    );
    assert!(store.get_records_for_entity(DEVICE, &[]).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn malformed_timestamp_is_a_parse_error() -> TemporaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let err = store
        .ingest_temporal_references(&device(json!(20.0), "yesterday"))
        .await
        .expect_err("bad timestamp");
    assert!(matches!(err, TemporaError::Parse { .. }));
    assert!(store.get_first_record_for_entity(DEVICE).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn kind_mismatch_rolls_back_the_whole_document() -> TemporaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    store
        .ingest_temporal_references(&device(json!(20.0), "2023-01-01T00:00:00Z"))
        .await?;

    let mut document = device(json!("warm"), "2023-01-01T01:00:00Z");
    document["pressure"] = json!({
        "type": "Property", "value": 1013, "observedAt": "2023-01-01T01:00:00Z"
    });
    let err = store
        .ingest_temporal_references(&document)
        .await
        .expect_err("kind mismatch");
    assert!(matches!(err, TemporaError::Validation { .. }));

    let records = store.get_records_for_entity(DEVICE, &[]).await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entity_snapshot.as_ref().map(|s| s.version), Some(1));
    let groups = store
        .fetch_instances(InstanceQuery {
            record_ids: vec![records[0].id],
            ..InstanceQuery::default()
        })
        .await?;
    assert_eq!(groups[0].instances.len(), 1);
    Ok(())
}

#[tokio::test]
async fn lookups_miss_without_errors() -> TemporaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    store
        .ingest_temporal_references(&device(json!(20.0), "2023-01-01T00:00:00Z"))
        .await?;
    assert!(store.get_records_for_entity("urn:ngsi-ld:Device:none", &[]).await?.is_empty());
    assert!(store.get_first_record_for_entity("urn:ngsi-ld:Device:none").await?.is_none());
    assert!(
        store
            .get_record_for_entity_and_attribute(DEVICE, &term("humidity"))
            .await?
            .is_none()
    );
    let filtered = store
        .get_records_for_entity(DEVICE, &[term("humidity")])
        .await?;
    assert!(filtered.is_empty());
    Ok(())
}

#[tokio::test]
async fn attribute_limit_rejects_oversized_documents() -> TemporaResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let mut config = TemporaConfig::default_sqlite(base.join("tempora.sqlite").to_string_lossy());
    if let Some(limits) = config.limits.as_mut() {
        limits.max_attributes = Some(1);
    }
    let store = TemporaStore::connect(&config, base).await?;
    let mut document = device(json!(20.0), "2023-01-01T00:00:00Z");
    document["pressure"] = json!({
        "type": "Property", "value": 1013, "observedAt": "2023-01-01T00:00:00Z"
    });
    let err = store
        .ingest_temporal_references(&document)
        .await
        .expect_err("too many attributes");
    assert!(matches!(err, TemporaError::Validation { .. }));
    assert!(store.get_first_record_for_entity(DEVICE).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn concurrent_ingests_for_different_entities() -> TemporaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let mut handles = Vec::new();
    for index in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let document = json!({
                "id": format!("urn:ngsi-ld:Device:{index}"),
                "type": "Device",
                "temperature": {"type": "Property", "value": index, "observedAt": "2023-01-01T00:00:00Z"}
            });
            store.ingest_temporal_references(&document).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.expect("join")?, 1);
    }
    for index in 0..8 {
        let records = store
            .get_records_for_entity(&format!("urn:ngsi-ld:Device:{index}"), &[])
            .await?;
        assert_eq!(records.len(), 1);
    }
    Ok(())
}

#[tokio::test]
async fn concurrent_ingests_for_one_entity_share_a_record() -> TemporaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let first = store.clone();
    let second = store.clone();
    let (a, b) = tokio::join!(
        async move {
            first
                .ingest_temporal_references(&device(json!(1.0), "2023-01-01T00:00:00Z"))
                .await
        },
        async move {
            second
                .ingest_temporal_references(&device(json!(2.0), "2023-01-01T00:00:01Z"))
                .await
        }
    );
    assert_eq!(a? + b?, 2);
    let records = store.get_records_for_entity(DEVICE, &[]).await?;
    assert_eq!(records.len(), 1);
    let groups = store
        .fetch_instances(InstanceQuery {
            record_ids: vec![records[0].id],
            ..InstanceQuery::default()
        })
        .await?;
    assert_eq!(groups[0].instances.len(), 2);
    Ok(())
}

#[tokio::test]
async fn nested_arrays_do_not_block_ingest() -> TemporaResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let road = "urn:ngsi-ld:Road:A7";
    let document = json!({
        "id": road,
        "type": "Road",
        "location": {
            "type": "GeoProperty",
            "value": {"type": "LineString", "coordinates": [[13.4, 52.5], [13.5, 52.6]]}
        },
        "traffic": {"type": "Property", "value": 412, "observedAt": "2023-03-01T08:00:00Z"},
        "laneMatrix": {"type": "Property", "value": [[1, 2], [3, 4]], "observedAt": "2023-03-01T08:00:00Z"}
    });
    assert_eq!(store.ingest_temporal_references(&document).await?, 2);

    let lanes = store
        .get_record_for_entity_and_attribute(road, &term("laneMatrix"))
        .await?
        .expect("lane record");
    assert_eq!(lanes.value_kind, ValueKind::Any);
    let snapshot = lanes.entity_snapshot.as_ref().expect("snapshot");
    assert_eq!(snapshot.payload["location"], document["location"]);

    let groups = store
        .fetch_instances(InstanceQuery {
            record_ids: vec![lanes.id],
            ..InstanceQuery::default()
        })
        .await?;
    assert_eq!(
        groups[0].instances[0].value,
        InstanceValue::Raw("[[1,2],[3,4]]".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn cancelled_ingest_leaves_nothing_behind() -> TemporaResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let mut config = TemporaConfig::default_sqlite(base.join("tempora.sqlite").to_string_lossy());
    if let Some(limits) = config.limits.as_mut() {
        limits.max_attributes = Some(5_000);
    }
    let store = TemporaStore::connect(&config, base).await?;

    let mut document = json!({"id": DEVICE, "type": "Device"});
    for index in 0..2_000 {
        document[format!("sensor{index}")] = json!({
            "type": "Property", "value": index, "observedAt": "2023-01-01T00:00:00Z"
        });
    }
    let outcome = tokio::time::timeout(
        std::time::Duration::from_millis(5),
        store.ingest_temporal_references(&document),
    )
    .await;
    assert!(outcome.is_err(), "ingest finished before the deadline");

    assert!(store.get_records_for_entity(DEVICE, &[]).await?.is_empty());
    let persisted = store
        .ingest_temporal_references(&device(json!(21.0), "2023-01-01T00:00:00Z"))
        .await?;
    assert_eq!(persisted, 1);
    let records = store.get_records_for_entity(DEVICE, &[]).await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entity_snapshot.as_ref().map(|s| s.version), Some(1));
    Ok(())
}
