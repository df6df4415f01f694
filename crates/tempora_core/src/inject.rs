use serde_json::{Map, Number, Value as JsonValue};

use crate::codec::DocumentCodec;
use crate::context::LdContext;
use crate::vocab::{
    JSONLD_LIST, JSONLD_TYPE, NGSILD_PROPERTY_TYPE, NGSILD_PROPERTY_VALUE, NGSILD_PROPERTY_VALUES,
};
use crate::{Observation, ObservationGroup, TemporaError, TemporaResult};

/// Returns a copy of the expanded `document` where every attribute named by
/// `groups` carries its observation history under `hasValues`.
pub fn inject_temporal_values(
    document: &JsonValue,
    context: &LdContext,
    groups: &[ObservationGroup],
    codec: &dyn DocumentCodec,
) -> TemporaResult<JsonValue> {
    if ObservationGroup::is_no_data(groups) {
        return Ok(document.clone());
    }
    let mut entity = document
        .as_object()
        .cloned()
        .ok_or_else(|| TemporaError::parse("document must be a JSON object"))?;
    for group in groups {
        let key = codec
            .resolve_key(&group.attribute_name, context)
            .ok_or_else(|| TemporaError::unresolved_key(&group.attribute_name))?;
        let mut container = entity
            .get(&key)
            .and_then(existing_container)
            .unwrap_or_else(property_skeleton);
        container.remove(NGSILD_PROPERTY_VALUE);
        let values = group
            .observations
            .iter()
            .filter_map(|observation| value_pair(observation).transpose())
            .collect::<TemporaResult<Vec<_>>>()?;
        let mut list = Map::new();
        list.insert(JSONLD_LIST.to_string(), JsonValue::Array(values));
        container.insert(
            NGSILD_PROPERTY_VALUES.to_string(),
            JsonValue::Array(vec![JsonValue::Object(list)]),
        );
        entity.insert(key, JsonValue::Array(vec![JsonValue::Object(container)]));
    }
    Ok(JsonValue::Object(entity))
}

fn existing_container(value: &JsonValue) -> Option<Map<String, JsonValue>> {
    match value {
        JsonValue::Array(items) => items.first().and_then(JsonValue::as_object).cloned(),
        JsonValue::Object(map) => Some(map.clone()),
        _ => None,
    }
}

fn property_skeleton() -> Map<String, JsonValue> {
    let mut container = Map::new();
    container.insert(
        JSONLD_TYPE.to_string(),
        JsonValue::Array(vec![JsonValue::String(NGSILD_PROPERTY_TYPE.to_string())]),
    );
    container
}

fn value_pair(observation: &Observation) -> TemporaResult<Option<JsonValue>> {
    let (value, observed_at) = match observation {
        Observation::Missing => return Ok(None),
        Observation::Measure { value, observed_at } => (
            Number::from_f64(*value)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            observed_at,
        ),
        Observation::Raw { value, observed_at } => (JsonValue::String(value.clone()), observed_at),
    };
    Ok(Some(JsonValue::Array(vec![
        value,
        JsonValue::String(observed_at.to_rfc3339()?),
    ])))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::inject_temporal_values;
    use crate::codec::{DocumentCodec, TermCodec};
    use crate::context::LdContext;
    use crate::vocab::{
        NGSILD_DEFAULT_VOCAB, NGSILD_PROPERTY_TYPE, NGSILD_PROPERTY_VALUE, NGSILD_PROPERTY_VALUES,
        NGSILD_UNIT_CODE_PROPERTY,
    };
    use crate::{Observation, ObservationGroup, ObservedAt, TemporaError};

    fn at(text: &str) -> ObservedAt {
        ObservedAt::parse_rfc3339(text).expect("timestamp")
    }

    fn entity() -> serde_json::Value {
        let document = json!({
            "id": "urn:ngsi-ld:Device:01234",
            "type": "Device",
            "temperature": {"type": "Property", "value": 23.5, "unitCode": "CEL", "observedAt": "2023-01-01T00:00:00Z"},
            "name": {"type": "Property", "value": "probe"}
        });
        TermCodec
            .expand(&document, &LdContext::core())
            .expect("expand")
    }

    fn temperature_group() -> Vec<ObservationGroup> {
        vec![ObservationGroup {
            attribute_name: "temperature".to_string(),
            observations: vec![
                Observation::Measure {
                    value: 21.0,
                    observed_at: at("2023-01-01T00:00:00Z"),
                },
                Observation::Measure {
                    value: 22.5,
                    observed_at: at("2023-01-01T01:00:00Z"),
                },
            ],
        }]
    }

    #[test]
    fn replaces_bare_value_with_ordered_history() {
        let document = entity();
        let injected = inject_temporal_values(
            &document,
            &LdContext::core(),
            &temperature_group(),
            &TermCodec,
        )
        .expect("inject");
        let key = format!("{NGSILD_DEFAULT_VOCAB}temperature");
        let property = &injected[key.as_str()][0];
        assert!(property.get(NGSILD_PROPERTY_VALUE).is_none());
        assert_eq!(property[NGSILD_UNIT_CODE_PROPERTY], json!([{"@value": "CEL"}]));
        assert_eq!(
            property[NGSILD_PROPERTY_VALUES],
            json!([{"@list": [[21.0, "2023-01-01T00:00:00Z"], [22.5, "2023-01-01T01:00:00Z"]]}])
        );
        let name = format!("{NGSILD_DEFAULT_VOCAB}name");
        assert_eq!(injected[name.as_str()], document[name.as_str()]);
        assert_eq!(injected["@id"], document["@id"]);
    }

    #[test]
    fn is_pure_and_deterministic() {
        let document = entity();
        let snapshot = document.clone();
        let groups = temperature_group();
        let first =
            inject_temporal_values(&document, &LdContext::core(), &groups, &TermCodec).expect("first");
        let second =
            inject_temporal_values(&document, &LdContext::core(), &groups, &TermCodec).expect("second");
        assert_eq!(document, snapshot);
        assert_eq!(
            serde_json::to_string(&first).expect("json"),
            serde_json::to_string(&second).expect("json")
        );
    }

    #[test]
    fn no_data_marker_returns_document_unchanged() {
        let document = entity();
        let injected = inject_temporal_values(
            &document,
            &LdContext::core(),
            &ObservationGroup::no_data(),
            &TermCodec,
        )
        .expect("inject");
        assert_eq!(injected, document);
    }

    #[test]
    fn synthesizes_property_for_unknown_attribute() {
        let groups = vec![ObservationGroup {
            attribute_name: "state".to_string(),
            observations: vec![
                Observation::Raw {
                    value: "open".to_string(),
                    observed_at: at("2023-03-01T00:00:00Z"),
                },
                Observation::Missing,
            ],
        }];
        let injected =
            inject_temporal_values(&entity(), &LdContext::core(), &groups, &TermCodec)
                .expect("inject");
        let key = format!("{NGSILD_DEFAULT_VOCAB}state");
        assert_eq!(
            injected[key.as_str()],
            json!([{
                "@type": [NGSILD_PROPERTY_TYPE],
                (NGSILD_PROPERTY_VALUES): [{"@list": [["open", "2023-03-01T00:00:00Z"]]}]
            }])
        );
    }

    #[test]
    fn unresolvable_attribute_is_surfaced() {
        let groups = vec![ObservationGroup {
            attribute_name: "speed".to_string(),
            observations: vec![],
        }];
        let err = inject_temporal_values(&entity(), &LdContext::empty(), &groups, &TermCodec)
            .expect_err("unresolved");
        assert!(matches!(err, TemporaError::InjectionKeyResolution { attribute } if attribute == "speed"));
    }

    #[test]
    fn compacts_into_values_member() {
        let context = LdContext::core();
        let injected =
            inject_temporal_values(&entity(), &context, &temperature_group(), &TermCodec)
                .expect("inject");
        let compacted = TermCodec.compact(&injected, &context).expect("compact");
        assert_eq!(
            compacted["temperature"],
            json!({
                "type": "Property",
                "unitCode": "CEL",
                "observedAt": "2023-01-01T00:00:00Z",
                "values": [[21.0, "2023-01-01T00:00:00Z"], [22.5, "2023-01-01T01:00:00Z"]]
            })
        );
    }
}
