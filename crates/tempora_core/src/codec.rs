use serde_json::{Map, Value as JsonValue};

use crate::context::LdContext;
use crate::vocab::{
    DATE_TIME_PROPERTIES, JSONLD_CONTEXT, JSONLD_ID, JSONLD_JSON, JSONLD_LIST, JSONLD_TYPE, JSONLD_VALUE,
    NGSILD_DATE_TIME_TYPE, NGSILD_PROPERTY_VALUES, REFERENCE_PROPERTIES,
};
use crate::{TemporaError, TemporaResult};

/// Expansion and compaction of semantic documents.
pub trait DocumentCodec: Send + Sync {
    fn expand(&self, document: &JsonValue, context: &LdContext) -> TemporaResult<JsonValue>;
    fn compact(&self, expanded: &JsonValue, context: &LdContext) -> TemporaResult<JsonValue>;
    fn resolve_key(&self, term: &str, context: &LdContext) -> Option<String>;
}

/// Term-map codec covering the NGSI-LD entity shapes: properties,
/// relationships, typed literals, `DateTime` members and `@list` histories.
#[derive(Clone, Copy, Debug, Default)]
pub struct TermCodec;

impl DocumentCodec for TermCodec {
    fn expand(&self, document: &JsonValue, context: &LdContext) -> TemporaResult<JsonValue> {
        match document {
            JsonValue::Object(map) => expand_object(map, context),
            _ => Err(TemporaError::parse("document must be a JSON object")),
        }
    }

    fn compact(&self, expanded: &JsonValue, context: &LdContext) -> TemporaResult<JsonValue> {
        match expanded {
            JsonValue::Object(map) => Ok(compact_object(map, context)),
            _ => Err(TemporaError::parse("expanded document must be a JSON object")),
        }
    }

    fn resolve_key(&self, term: &str, context: &LdContext) -> Option<String> {
        context.expand_term(term)
    }
}

fn expand_object(map: &Map<String, JsonValue>, context: &LdContext) -> TemporaResult<JsonValue> {
    let mut expanded = Map::new();
    for (key, value) in map {
        match key.as_str() {
            JSONLD_CONTEXT => {}
            "id" | JSONLD_ID => {
                let id = value
                    .as_str()
                    .ok_or_else(|| TemporaError::parse("id must be a string"))?;
                expanded.insert(JSONLD_ID.to_string(), JsonValue::String(id.to_string()));
            }
            "type" | JSONLD_TYPE => {
                expanded.insert(JSONLD_TYPE.to_string(), expand_types(value, context)?);
            }
            _ => {
                let iri = context
                    .expand_term(key)
                    .ok_or_else(|| TemporaError::parse(format!("cannot expand term '{key}'")))?;
                if let Some(items) = expand_member(&iri, value, context)? {
                    expanded.insert(iri, items);
                }
            }
        }
    }
    Ok(JsonValue::Object(expanded))
}

fn expand_types(value: &JsonValue, context: &LdContext) -> TemporaResult<JsonValue> {
    let names: Vec<&str> = match value {
        JsonValue::String(name) => vec![name.as_str()],
        JsonValue::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| TemporaError::parse("type entries must be strings"))
            })
            .collect::<TemporaResult<_>>()?,
        _ => return Err(TemporaError::parse("type must be a string or a list of strings")),
    };
    names
        .into_iter()
        .map(|name| {
            context
                .expand_term(name)
                .map(JsonValue::String)
                .ok_or_else(|| TemporaError::parse(format!("cannot expand type '{name}'")))
        })
        .collect::<TemporaResult<Vec<_>>>()
        .map(JsonValue::Array)
}

fn expand_member(
    iri: &str,
    value: &JsonValue,
    context: &LdContext,
) -> TemporaResult<Option<JsonValue>> {
    if value.is_null() {
        return Ok(None);
    }
    if iri == NGSILD_PROPERTY_VALUES {
        let list = match value {
            JsonValue::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        let mut wrapper = Map::new();
        wrapper.insert(JSONLD_LIST.to_string(), JsonValue::Array(list));
        return Ok(Some(JsonValue::Array(vec![JsonValue::Object(wrapper)])));
    }
    if let JsonValue::Array(items) = value
        && items.iter().any(JsonValue::is_array)
    {
        // Nested arrays (GeoJSON coordinates, matrices) are kept whole as a JSON literal.
        return Ok(Some(JsonValue::Array(vec![json_literal(value)])));
    }
    let items: Vec<&JsonValue> = match value {
        JsonValue::Array(items) => items.iter().filter(|item| !item.is_null()).collect(),
        other => vec![other],
    };
    let mut expanded = Vec::with_capacity(items.len());
    for item in items {
        expanded.push(expand_item(iri, item, context)?);
    }
    Ok(Some(JsonValue::Array(expanded)))
}

fn expand_item(iri: &str, item: &JsonValue, context: &LdContext) -> TemporaResult<JsonValue> {
    let mut node = Map::new();
    match item {
        JsonValue::String(text) if DATE_TIME_PROPERTIES.contains(&iri) => {
            node.insert(
                JSONLD_TYPE.to_string(),
                JsonValue::String(NGSILD_DATE_TIME_TYPE.to_string()),
            );
            node.insert(JSONLD_VALUE.to_string(), JsonValue::String(text.clone()));
        }
        JsonValue::String(text) if REFERENCE_PROPERTIES.contains(&iri) => {
            node.insert(JSONLD_ID.to_string(), JsonValue::String(text.clone()));
        }
        JsonValue::Object(map) if map.contains_key(JSONLD_VALUE) => {
            for (key, value) in map {
                if key == JSONLD_TYPE {
                    let type_name = value
                        .as_str()
                        .ok_or_else(|| TemporaError::parse("literal @type must be a string"))?;
                    let type_iri = context.expand_term(type_name).ok_or_else(|| {
                        TemporaError::parse(format!("cannot expand type '{type_name}'"))
                    })?;
                    node.insert(JSONLD_TYPE.to_string(), JsonValue::String(type_iri));
                } else {
                    node.insert(key.clone(), value.clone());
                }
            }
        }
        JsonValue::Object(map) => return expand_object(map, context),
        literal => {
            node.insert(JSONLD_VALUE.to_string(), literal.clone());
        }
    }
    Ok(JsonValue::Object(node))
}

fn json_literal(value: &JsonValue) -> JsonValue {
    let mut node = Map::new();
    node.insert(JSONLD_TYPE.to_string(), JsonValue::String(JSONLD_JSON.to_string()));
    node.insert(JSONLD_VALUE.to_string(), value.clone());
    JsonValue::Object(node)
}

fn compact_object(map: &Map<String, JsonValue>, context: &LdContext) -> JsonValue {
    let mut compacted = Map::new();
    for (key, value) in map {
        match key.as_str() {
            JSONLD_ID => {
                compacted.insert("id".to_string(), value.clone());
            }
            JSONLD_TYPE => {
                compacted.insert("type".to_string(), compact_types(value, context));
            }
            _ => {
                compacted.insert(context.compact_iri(key), compact_member(key, value, context));
            }
        }
    }
    JsonValue::Object(compacted)
}

fn compact_types(value: &JsonValue, context: &LdContext) -> JsonValue {
    match value {
        JsonValue::String(iri) => JsonValue::String(context.compact_iri(iri)),
        JsonValue::Array(items) if items.len() == 1 => compact_types(&items[0], context),
        JsonValue::Array(items) => {
            JsonValue::Array(items.iter().map(|item| compact_types(item, context)).collect())
        }
        other => other.clone(),
    }
}

fn compact_member(iri: &str, value: &JsonValue, context: &LdContext) -> JsonValue {
    let JsonValue::Array(items) = value else {
        return value.clone();
    };
    let mut compacted: Vec<JsonValue> = items
        .iter()
        .map(|item| compact_item(iri, item, context))
        .collect();
    if compacted.len() == 1 {
        compacted.remove(0)
    } else {
        JsonValue::Array(compacted)
    }
}

fn compact_item(iri: &str, item: &JsonValue, context: &LdContext) -> JsonValue {
    let JsonValue::Object(map) = item else {
        return item.clone();
    };
    if let Some(list) = map.get(JSONLD_LIST) {
        return list.clone();
    }
    if let Some(value) = map.get(JSONLD_VALUE) {
        let type_iri = map.get(JSONLD_TYPE).and_then(JsonValue::as_str);
        let plain = map.len() == 1 || (map.len() == 2 && type_iri == Some(JSONLD_JSON));
        let date_time = DATE_TIME_PROPERTIES.contains(&iri)
            && map.len() == 2
            && type_iri == Some(NGSILD_DATE_TIME_TYPE);
        if plain || date_time {
            return value.clone();
        }
        let mut literal = Map::new();
        for (key, value) in map {
            if key == JSONLD_TYPE {
                let compact = value
                    .as_str()
                    .map(|iri| JsonValue::String(context.compact_iri(iri)))
                    .unwrap_or_else(|| value.clone());
                literal.insert(JSONLD_TYPE.to_string(), compact);
            } else {
                literal.insert(key.clone(), value.clone());
            }
        }
        return JsonValue::Object(literal);
    }
    if REFERENCE_PROPERTIES.contains(&iri)
        && map.len() == 1
        && let Some(id) = map.get(JSONLD_ID)
    {
        return id.clone();
    }
    compact_object(map, context)
}
