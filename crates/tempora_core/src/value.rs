use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as JsonValue};

/// Scalar carried by a semantic property.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

/// Tagged view of a semantic value, produced once at the extraction boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum LdValue {
    Null,
    Literal(Literal),
    Array(Vec<LdValue>),
    Object(BTreeMap<String, LdValue>),
}

impl LdValue {
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => LdValue::Null,
            JsonValue::Bool(flag) => LdValue::Literal(Literal::Bool(*flag)),
            JsonValue::Number(number) => match number.as_i64() {
                Some(int) => LdValue::Literal(Literal::Integer(int)),
                None => number
                    .as_f64()
                    .map(|float| LdValue::Literal(Literal::Float(float)))
                    .unwrap_or_else(|| LdValue::Literal(Literal::String(number.to_string()))),
            },
            JsonValue::String(text) => LdValue::Literal(Literal::String(text.clone())),
            JsonValue::Array(items) => LdValue::Array(items.iter().map(LdValue::from_json).collect()),
            JsonValue::Object(map) => LdValue::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), LdValue::from_json(value)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            LdValue::Null => JsonValue::Null,
            LdValue::Literal(Literal::String(text)) => JsonValue::String(text.clone()),
            LdValue::Literal(Literal::Integer(int)) => JsonValue::Number((*int).into()),
            LdValue::Literal(Literal::Float(float)) => Number::from_f64(*float)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            LdValue::Literal(Literal::Bool(flag)) => JsonValue::Bool(*flag),
            LdValue::Array(items) => JsonValue::Array(items.iter().map(LdValue::to_json).collect()),
            LdValue::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            LdValue::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    pub fn member(&self, key: &str) -> Option<&LdValue> {
        match self {
            LdValue::Object(map) => map.get(key),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueKind {
    Measure = 1,
    Any = 2,
}

impl ValueKind {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            1 => Some(ValueKind::Measure),
            2 => Some(ValueKind::Any),
            _ => None,
        }
    }
}

/// Stored value of one observation: exactly one of measured or raw.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum InstanceValue {
    Measure(f64),
    Raw(String),
}

impl InstanceValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            InstanceValue::Measure(_) => ValueKind::Measure,
            InstanceValue::Raw(_) => ValueKind::Any,
        }
    }

    pub fn measured_value(&self) -> Option<f64> {
        match self {
            InstanceValue::Measure(value) => Some(*value),
            InstanceValue::Raw(_) => None,
        }
    }

    pub fn raw_value(&self) -> Option<&str> {
        match self {
            InstanceValue::Raw(value) => Some(value.as_str()),
            InstanceValue::Measure(_) => None,
        }
    }
}
