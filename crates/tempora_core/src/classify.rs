use crate::vocab::JSONLD_VALUE;
use crate::{InstanceValue, LdValue, Literal, TemporaError, TemporaResult, ValueKind};

/// Measure iff the bare value is a numeric literal, possibly inside a typed literal.
pub fn classify(value: &LdValue) -> ValueKind {
    if measured_value(value).is_some() {
        ValueKind::Measure
    } else {
        ValueKind::Any
    }
}

pub fn measured_value(value: &LdValue) -> Option<f64> {
    match value {
        LdValue::Literal(Literal::Integer(int)) => Some(*int as f64),
        LdValue::Literal(Literal::Float(float)) => Some(*float),
        LdValue::Object(map) if map.contains_key(JSONLD_VALUE) => match map.get(JSONLD_VALUE) {
            Some(inner @ LdValue::Literal(_)) => measured_value(inner),
            _ => None,
        },
        _ => None,
    }
}

/// Opaque text of a value: strings verbatim, everything else as compact JSON.
pub fn raw_value(value: &LdValue) -> String {
    match value {
        LdValue::Literal(Literal::String(text)) => text.clone(),
        LdValue::Object(map) if map.len() <= 2 && map.contains_key(JSONLD_VALUE) => {
            match map.get(JSONLD_VALUE) {
                Some(LdValue::Literal(Literal::String(text))) => text.clone(),
                Some(other) => other.to_json().to_string(),
                None => value.to_json().to_string(),
            }
        }
        other => other.to_json().to_string(),
    }
}

/// Converts a value for storage under a record of the given kind.
pub fn instance_value(
    attribute: &str,
    kind: ValueKind,
    value: &LdValue,
) -> TemporaResult<InstanceValue> {
    match kind {
        ValueKind::Measure => measured_value(value)
            .map(InstanceValue::Measure)
            .ok_or_else(|| {
                TemporaError::validation(format!(
                    "attribute {attribute} is a measure but received a non-numeric value"
                ))
            }),
        ValueKind::Any => Ok(InstanceValue::Raw(raw_value(value))),
    }
}
