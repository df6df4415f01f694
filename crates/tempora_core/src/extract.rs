use serde_json::{Map, Value as JsonValue};

use crate::classify::classify;
use crate::vocab::{
    JSONLD_ID, JSONLD_JSON, JSONLD_TYPE, JSONLD_VALUE, NGSILD_OBSERVED_AT_PROPERTY,
    NGSILD_PROPERTY_VALUE, NGSILD_RELATIONSHIP_OBJECT,
};
use crate::{LdValue, Literal, ObservedAt, TemporaError, TemporaResult, ValueKind};

#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedObservation {
    pub value: LdValue,
    pub observed_at: ObservedAt,
}

/// A top-level attribute carrying `observedAt`, with every timestamped instance it lists.
#[derive(Clone, Debug, PartialEq)]
pub struct TemporalCandidate {
    pub attribute_name: String,
    pub observations: Vec<ExtractedObservation>,
}

impl TemporalCandidate {
    /// Kind of the first observation; it decides the kind of a new record.
    pub fn value_kind(&self) -> ValueKind {
        self.observations
            .first()
            .map(|observation| classify(&observation.value))
            .unwrap_or(ValueKind::Any)
    }
}

/// Scans an expanded entity for temporal attributes.
///
/// The outer error covers a document that is not an object; each candidate
/// carries its own result so one bad attribute does not hide the others.
pub fn extract(expanded: &JsonValue) -> TemporaResult<Vec<TemporaResult<TemporalCandidate>>> {
    let map = expanded
        .as_object()
        .ok_or_else(|| TemporaError::parse("expanded document must be a JSON object"))?;
    let mut candidates = Vec::new();
    for (name, value) in map {
        if name.starts_with('@') {
            continue;
        }
        let JsonValue::Array(instances) = value else {
            continue;
        };
        let Some(JsonValue::Object(first)) = instances.first() else {
            continue;
        };
        if !first.contains_key(NGSILD_OBSERVED_AT_PROPERTY) {
            continue;
        }
        candidates.push(extract_candidate(name, instances));
    }
    Ok(candidates)
}

pub fn entity_id(expanded: &JsonValue) -> TemporaResult<String> {
    expanded
        .get(JSONLD_ID)
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| TemporaError::parse("entity has no @id"))
}

pub fn entity_type(expanded: &JsonValue) -> TemporaResult<String> {
    let first = match expanded.get(JSONLD_TYPE) {
        Some(JsonValue::Array(types)) => types.first().and_then(JsonValue::as_str),
        Some(JsonValue::String(name)) => Some(name.as_str()),
        _ => None,
    };
    first
        .map(str::to_string)
        .ok_or_else(|| TemporaError::parse("entity has no @type"))
}

fn extract_candidate(name: &str, instances: &[JsonValue]) -> TemporaResult<TemporalCandidate> {
    let mut observations = Vec::new();
    for instance in instances {
        let JsonValue::Object(property) = instance else {
            continue;
        };
        let Some(marker) = property.get(NGSILD_OBSERVED_AT_PROPERTY) else {
            continue;
        };
        let observed_at = observed_at(name, marker)?;
        let value = bare_value(property).ok_or_else(|| TemporaError::missing_value(name))?;
        observations.push(ExtractedObservation { value, observed_at });
    }
    Ok(TemporalCandidate {
        attribute_name: name.to_string(),
        observations,
    })
}

fn observed_at(name: &str, marker: &JsonValue) -> TemporaResult<ObservedAt> {
    let literal = match marker {
        JsonValue::Array(items) => items.first(),
        other => Some(other),
    };
    let text = literal
        .and_then(|item| match item {
            JsonValue::Object(map) => map.get(JSONLD_VALUE),
            other => Some(other),
        })
        .and_then(JsonValue::as_str)
        .ok_or_else(|| TemporaError::parse(format!("attribute {name}: observedAt is not a string")))?;
    ObservedAt::parse_rfc3339(text)
        .map_err(|err| TemporaError::parse(format!("attribute {name}: {err}")))
}

fn bare_value(property: &Map<String, JsonValue>) -> Option<LdValue> {
    if let Some(JsonValue::Array(items)) = property.get(NGSILD_PROPERTY_VALUE) {
        return match items.as_slice() {
            [] => None,
            [single] => Some(value_item(single)),
            many => Some(LdValue::Array(many.iter().map(value_item).collect())),
        };
    }
    if let Some(JsonValue::Array(items)) = property.get(NGSILD_RELATIONSHIP_OBJECT) {
        return items
            .first()
            .and_then(|item| item.get(JSONLD_ID))
            .and_then(JsonValue::as_str)
            .map(|target| LdValue::Literal(Literal::String(target.to_string())));
    }
    None
}

fn value_item(item: &JsonValue) -> LdValue {
    let JsonValue::Object(map) = item else {
        return LdValue::from_json(item);
    };
    let json_literal = map.len() == 2
        && map.get(JSONLD_TYPE).and_then(JsonValue::as_str) == Some(JSONLD_JSON);
    match map.get(JSONLD_VALUE) {
        Some(value) if map.len() == 1 || json_literal => LdValue::from_json(value),
        _ => LdValue::from_json(item),
    }
}
