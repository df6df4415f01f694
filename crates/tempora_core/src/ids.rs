use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{TemporaError, TemporaResult};

/// Identifier of a temporal attribute record or an attribute instance.
///
/// Serializes as the hyphenated UUID string; byte order matches the string
/// order, so sorting either form agrees.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(Uuid);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid_str(value: &str) -> TemporaResult<Self> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|err| TemporaError::parse(format!("invalid uuid '{value}': {err}")))
    }

    pub fn to_uuid_string(self) -> String {
        self.0.hyphenated().to_string()
    }

    pub fn as_bytes(self) -> [u8; 16] {
        *self.0.as_bytes()
    }

    pub fn as_vec(self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for Id {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::Id;

    #[test]
    fn uuid_text_roundtrips() {
        let id = Id::new();
        let parsed = Id::from_uuid_str(&id.to_uuid_string()).expect("parse");
        assert_eq!(parsed, id);
        assert_eq!(Id::from_bytes(id.as_bytes()), id);
        assert!(Id::from_uuid_str("not-a-uuid").is_err());
    }

    #[test]
    fn text_order_follows_byte_order() {
        let mut ids = (0..32).map(|_| Id::new()).collect::<Vec<_>>();
        let mut texts = ids.iter().map(|id| id.to_uuid_string()).collect::<Vec<_>>();
        ids.sort();
        texts.sort();
        assert_eq!(
            ids.iter().map(|id| id.to_uuid_string()).collect::<Vec<_>>(),
            texts
        );
    }

    #[test]
    fn serializes_as_string() {
        let id = Id::from_uuid_str("67e55044-10b1-426f-9247-bb680e5fe0c8").expect("parse");
        let encoded = serde_json::to_string(&id).expect("encode");
        assert_eq!(encoded, "\"67e55044-10b1-426f-9247-bb680e5fe0c8\"");
        let decoded: Id = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, id);
    }
}
