use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::vocab::{CORE_TERMS, JSONLD_ID, JSONLD_VOCAB, NGSILD_DEFAULT_VOCAB};
use crate::{TemporaError, TemporaResult};

/// Term definitions used to expand and compact NGSI-LD documents.
///
/// Remote context URLs are recorded but never dereferenced; terms they would
/// define fall back to `@vocab` when one is set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LdContext {
    terms: BTreeMap<String, String>,
    vocab: Option<String>,
    remote: Vec<String>,
}

impl LdContext {
    /// No terms and no vocabulary: only absolute IRIs resolve.
    pub fn empty() -> Self {
        Self::default()
    }

    /// NGSI-LD core terms plus the default vocabulary.
    pub fn core() -> Self {
        let terms = CORE_TERMS
            .iter()
            .map(|(term, iri)| ((*term).to_string(), (*iri).to_string()))
            .collect();
        Self {
            terms,
            vocab: Some(NGSILD_DEFAULT_VOCAB.to_string()),
            remote: Vec::new(),
        }
    }

    /// Core context extended with the document's own `@context` member.
    pub fn from_document(document: &JsonValue) -> TemporaResult<Self> {
        let mut context = Self::core();
        if let Some(inline) = document.get(crate::vocab::JSONLD_CONTEXT) {
            context.merge_json(inline)?;
        }
        Ok(context)
    }

    pub fn with_term(mut self, term: impl Into<String>, iri: impl Into<String>) -> Self {
        self.terms.insert(term.into(), iri.into());
        self
    }

    pub fn with_vocab(mut self, vocab: Option<String>) -> Self {
        self.vocab = vocab;
        self
    }

    pub fn remote_contexts(&self) -> &[String] {
        &self.remote
    }

    pub fn merge_json(&mut self, context: &JsonValue) -> TemporaResult<()> {
        match context {
            JsonValue::Null => Ok(()),
            JsonValue::String(url) => {
                self.remote.push(url.clone());
                Ok(())
            }
            JsonValue::Array(items) => items.iter().try_for_each(|item| self.merge_json(item)),
            JsonValue::Object(map) => {
                for (term, definition) in map {
                    if term == JSONLD_VOCAB {
                        self.vocab = definition.as_str().map(str::to_string);
                        continue;
                    }
                    let iri = match definition {
                        JsonValue::String(iri) => iri.clone(),
                        JsonValue::Object(def) => def
                            .get(JSONLD_ID)
                            .and_then(JsonValue::as_str)
                            .map(str::to_string)
                            .ok_or_else(|| {
                                TemporaError::parse(format!("term '{term}' has no @id"))
                            })?,
                        JsonValue::Null => {
                            self.terms.remove(term);
                            continue;
                        }
                        _ => {
                            return Err(TemporaError::parse(format!(
                                "unsupported definition for term '{term}'"
                            )));
                        }
                    };
                    let iri = self.expand_term(&iri).unwrap_or(iri);
                    self.terms.insert(term.clone(), iri);
                }
                Ok(())
            }
            _ => Err(TemporaError::parse("@context must be a string, array or object")),
        }
    }

    /// Expanded IRI for `term`, or `None` when nothing in the context resolves it.
    pub fn expand_term(&self, term: &str) -> Option<String> {
        if term.starts_with('@') {
            return Some(term.to_string());
        }
        if let Some(iri) = self.terms.get(term) {
            return Some(iri.clone());
        }
        if let Some((prefix, suffix)) = term.split_once(':') {
            return match self.terms.get(prefix) {
                Some(base) if !suffix.starts_with("//") => Some(format!("{base}{suffix}")),
                _ => Some(term.to_string()),
            };
        }
        self.vocab.as_ref().map(|vocab| format!("{vocab}{term}"))
    }

    /// Shortest form of `iri` that expands back to the same IRI.
    pub fn compact_iri(&self, iri: &str) -> String {
        if iri.starts_with('@') {
            return iri.to_string();
        }
        if let Some((term, _)) = self
            .terms
            .iter()
            .filter(|(_, value)| value.as_str() == iri)
            .min_by_key(|(term, _)| term.len())
        {
            return term.clone();
        }
        if let Some(vocab) = &self.vocab
            && let Some(rest) = iri.strip_prefix(vocab.as_str())
            && !rest.is_empty()
            && !rest.contains([':', '/', '#'])
            && !self.terms.contains_key(rest)
        {
            return rest.to_string();
        }
        for (term, base) in &self.terms {
            if (base.ends_with('/') || base.ends_with('#'))
                && let Some(rest) = iri.strip_prefix(base.as_str())
                && !rest.is_empty()
                && !term.contains(':')
            {
                return format!("{term}:{rest}");
            }
        }
        iri.to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::LdContext;
    use crate::vocab::{NGSILD_DEFAULT_VOCAB, NGSILD_OBSERVED_AT_PROPERTY};

    #[test]
    fn core_context_resolves_core_terms_and_vocab() {
        let context = LdContext::core();
        assert_eq!(
            context.expand_term("observedAt").as_deref(),
            Some(NGSILD_OBSERVED_AT_PROPERTY)
        );
        assert_eq!(
            context.expand_term("temperature"),
            Some(format!("{NGSILD_DEFAULT_VOCAB}temperature"))
        );
        assert_eq!(
            context.expand_term("urn:ngsi-ld:Device:01").as_deref(),
            Some("urn:ngsi-ld:Device:01")
        );
    }

    #[test]
    fn empty_context_only_resolves_absolute_iris() {
        let context = LdContext::empty();
        assert_eq!(context.expand_term("temperature"), None);
        assert_eq!(
            context.expand_term("https://example.org/speed").as_deref(),
            Some("https://example.org/speed")
        );
    }

    #[test]
    fn inline_context_defines_terms_and_prefixes() {
        let document = json!({
            "@context": [
                "https://uri.etsi.org/ngsi-ld/v1/ngsi-ld-core-context.jsonld",
                {"ex": "https://example.org/", "speed": "ex:speed", "fuel": {"@id": "https://example.org/fuel"}}
            ]
        });
        let context = LdContext::from_document(&document).expect("context");
        assert_eq!(context.remote_contexts().len(), 1);
        assert_eq!(
            context.expand_term("speed").as_deref(),
            Some("https://example.org/speed")
        );
        assert_eq!(
            context.expand_term("ex:wheels").as_deref(),
            Some("https://example.org/wheels")
        );
        assert_eq!(context.compact_iri("https://example.org/fuel"), "fuel");
        assert_eq!(context.compact_iri("https://example.org/wheels"), "ex:wheels");
    }

    #[test]
    fn compaction_inverts_expansion() {
        let context = LdContext::core().with_term("ex", "https://example.org/");
        for term in ["temperature", "observedAt", "ex:speed", "https://other.org/x"] {
            let iri = context.expand_term(term).expect("expand");
            let compacted = context.compact_iri(&iri);
            assert_eq!(context.expand_term(&compacted).as_deref(), Some(iri.as_str()));
        }
    }

    #[test]
    fn rejects_malformed_context() {
        let mut context = LdContext::core();
        assert!(context.merge_json(&json!(42)).is_err());
        assert!(context.merge_json(&json!({"bad": 1})).is_err());
        assert!(context.merge_json(&json!({"bad": {"@type": "x"}})).is_err());
    }
}
