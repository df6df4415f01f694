use std::fmt;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ::time::OffsetDateTime;
use ::time::format_description::well_known::Rfc3339;

use crate::{TemporaError, TemporaResult};

/// Caller-supplied observation timestamp, microseconds since the Unix epoch (UTC).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ObservedAt(pub i64);

impl ObservedAt {
    pub fn parse_rfc3339(value: &str) -> TemporaResult<Self> {
        let parsed = OffsetDateTime::parse(value, &Rfc3339)
            .map_err(|err| TemporaError::parse(format!("invalid timestamp '{value}': {err}")))?;
        Ok(Self::from_datetime(parsed))
    }

    pub fn from_datetime(value: OffsetDateTime) -> Self {
        Self((value.unix_timestamp_nanos() / 1_000) as i64)
    }

    pub fn to_datetime(self) -> TemporaResult<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * 1_000)
            .map_err(|err| TemporaError::parse(format!("timestamp out of range: {err}")))
    }

    pub fn to_rfc3339(self) -> TemporaResult<String> {
        self.to_datetime()?
            .format(&Rfc3339)
            .map_err(|err| TemporaError::parse(format!("format timestamp: {err}")))
    }

    pub fn as_micros(self) -> i64 {
        self.0
    }

    pub fn from_micros(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ObservedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rfc3339() {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "{}us", self.0),
        }
    }
}

impl Serialize for ObservedAt {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let text = self.to_rfc3339().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }
}

impl<'de> Deserialize<'de> for ObservedAt {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        ObservedAt::parse_rfc3339(&value).map_err(serde::de::Error::custom)
    }
}

/// Half-open observation window: `start <= observed_at < end`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TimeRange {
    pub start: Option<ObservedAt>,
    pub end: Option<ObservedAt>,
}

impl TimeRange {
    pub fn after(start: ObservedAt) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn before(end: ObservedAt) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    pub fn between(start: ObservedAt, end: ObservedAt) -> TemporaResult<Self> {
        if end < start {
            return Err(TemporaError::validation("time range end precedes its start"));
        }
        Ok(Self {
            start: Some(start),
            end: Some(end),
        })
    }

    pub fn contains(&self, at: ObservedAt) -> bool {
        self.start.is_none_or(|start| at >= start) && self.end.is_none_or(|end| at < end)
    }
}

/// Hybrid logical clock reading used to order registry inserts.
///
/// The value packs wall-clock microseconds above a 12-bit logical counter so a
/// plain `i64` column sorts readings correctly.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hlc(i64);

const LOGICAL_BITS: u32 = 12;
const LOGICAL_MAX: u64 = (1 << LOGICAL_BITS) - 1;

#[derive(Default)]
struct ClockState {
    physical: u64,
    logical: u64,
}

static CLOCK: Lazy<Mutex<ClockState>> = Lazy::new(|| Mutex::new(ClockState::default()));

impl Hlc {
    /// Next reading; strictly greater than every earlier one in this process.
    pub fn now() -> Self {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_micros() as u64)
            .unwrap_or_default();
        let mut state = CLOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if wall > state.physical {
            state.physical = wall;
            state.logical = 0;
        } else if state.logical == LOGICAL_MAX {
            state.physical += 1;
            state.logical = 0;
        } else {
            state.logical += 1;
        }
        Hlc(((state.physical << LOGICAL_BITS) | state.logical) as i64)
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }

    pub fn from_i64(value: i64) -> Self {
        Hlc(value)
    }

    pub fn physical_micros(self) -> i64 {
        self.0 >> LOGICAL_BITS
    }
}

#[cfg(test)]
mod tests {
    use super::{Hlc, ObservedAt, TimeRange};

    #[test]
    fn observed_at_formats_utc_without_fraction() {
        let at = ObservedAt::parse_rfc3339("2023-01-01T00:00:00Z").expect("parse");
        assert_eq!(at.as_micros(), 1_672_531_200_000_000);
        assert_eq!(at.to_rfc3339().expect("format"), "2023-01-01T00:00:00Z");
    }

    #[test]
    fn observed_at_normalizes_offsets_to_utc() {
        let at = ObservedAt::parse_rfc3339("2023-01-01T02:00:00.250+02:00").expect("parse");
        assert_eq!(at.to_rfc3339().expect("format"), "2023-01-01T00:00:00.25Z");
    }

    #[test]
    fn observed_at_rejects_non_rfc3339() {
        assert!(ObservedAt::parse_rfc3339("yesterday").is_err());
        assert!(ObservedAt::parse_rfc3339("2023-01-01").is_err());
    }

    #[test]
    fn time_range_is_half_open() {
        let start = ObservedAt::from_micros(10);
        let end = ObservedAt::from_micros(20);
        let range = TimeRange::between(start, end).expect("range");
        assert!(range.contains(start));
        assert!(range.contains(ObservedAt::from_micros(19)));
        assert!(!range.contains(end));
        assert!(TimeRange::between(end, start).is_err());
        assert!(TimeRange::default().contains(ObservedAt::from_micros(-5)));
    }

    #[test]
    fn hlc_is_strictly_increasing() {
        let readings = (0..5_000).map(|_| Hlc::now()).collect::<Vec<_>>();
        assert!(readings.windows(2).all(|pair| pair[0] < pair[1]));
        let last = readings[readings.len() - 1];
        assert_eq!(Hlc::from_i64(last.as_i64()), last);
        assert!(last.physical_micros() > 0);
    }
}
