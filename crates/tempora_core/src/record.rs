use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{Hlc, Id, InstanceValue, ObservedAt, TemporaError, TemporaResult, TimeRange, ValueKind};

/// Last known full document of an entity, shared by all of its temporal records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_id: String,
    pub payload: JsonValue,
    pub version: i64,
    pub updated_at: Hlc,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemporalAttributeRecord {
    pub id: Id,
    pub entity_id: String,
    pub entity_type: String,
    pub attribute_name: String,
    pub value_kind: ValueKind,
    pub created_at: Hlc,
    pub entity_snapshot: Option<EntitySnapshot>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewTemporalAttribute {
    pub entity_id: String,
    pub entity_type: String,
    pub attribute_name: String,
    pub value_kind: ValueKind,
    pub entity_payload: Option<JsonValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeInstance {
    pub id: Id,
    pub record_id: Id,
    pub observed_at: ObservedAt,
    pub value: InstanceValue,
}

impl AttributeInstance {
    pub fn value_kind(&self) -> ValueKind {
        self.value.kind()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewAttributeInstance {
    pub record_id: Id,
    pub observed_at: ObservedAt,
    pub value: InstanceValue,
}

/// Instances of one record, ascending by observation time.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceGroup {
    pub record_id: Id,
    pub instances: Vec<AttributeInstance>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstanceQuery {
    pub record_ids: Vec<Id>,
    pub range: TimeRange,
    /// Keep only the most recent `n` instances of each record.
    pub last_n: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InstancePage {
    pub instances: Vec<AttributeInstance>,
    pub next_cursor: Option<String>,
}

/// Keyset position inside an ordered instance scan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceCursor {
    pub record_index: usize,
    pub observed_at: i64,
    pub instance_id: String,
}

impl InstanceCursor {
    pub fn after(record_index: usize, instance: &AttributeInstance) -> Self {
        Self {
            record_index,
            observed_at: instance.observed_at.as_micros(),
            instance_id: instance.id.to_uuid_string(),
        }
    }

    pub fn encode(&self) -> TemporaResult<String> {
        let payload =
            serde_json::to_vec(self).map_err(|err| TemporaError::persistence(err.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(payload))
    }

    pub fn decode(cursor: &str) -> TemporaResult<Self> {
        let decoded = URL_SAFE_NO_PAD
            .decode(cursor.as_bytes())
            .map_err(|_| TemporaError::validation("invalid cursor"))?;
        let parsed: InstanceCursor = serde_json::from_slice(&decoded)
            .map_err(|_| TemporaError::validation("invalid cursor"))?;
        Id::from_uuid_str(&parsed.instance_id)
            .map_err(|_| TemporaError::validation("invalid cursor"))?;
        Ok(parsed)
    }

    pub fn instance_id(&self) -> TemporaResult<Id> {
        Id::from_uuid_str(&self.instance_id)
    }
}

/// One retrieved observation handed to the injector.
#[derive(Clone, Debug, PartialEq)]
pub enum Observation {
    /// Placeholder row produced when a query matched no instance.
    Missing,
    Measure { value: f64, observed_at: ObservedAt },
    Raw { value: String, observed_at: ObservedAt },
}

impl From<&AttributeInstance> for Observation {
    fn from(instance: &AttributeInstance) -> Self {
        match &instance.value {
            InstanceValue::Measure(value) => Observation::Measure {
                value: *value,
                observed_at: instance.observed_at,
            },
            InstanceValue::Raw(value) => Observation::Raw {
                value: value.clone(),
                observed_at: instance.observed_at,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObservationGroup {
    pub attribute_name: String,
    pub observations: Vec<Observation>,
}

impl ObservationGroup {
    /// The "no temporal data found" marker: one group holding one missing row.
    pub fn no_data() -> Vec<ObservationGroup> {
        vec![ObservationGroup {
            attribute_name: String::new(),
            observations: vec![Observation::Missing],
        }]
    }

    pub fn is_no_data(groups: &[ObservationGroup]) -> bool {
        matches!(groups, [group] if matches!(group.observations.as_slice(), [Observation::Missing]))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TemporalEntityQuery {
    pub entity_id: String,
    pub attributes: Vec<String>,
    pub range: TimeRange,
    pub last_n: Option<u32>,
}
