pub mod api;
pub mod classify;
pub mod clock;
pub mod codec;
pub mod context;
pub mod error;
pub mod extract;
pub mod ids;
pub mod inject;
pub mod record;
pub mod value;
pub mod vocab;

pub use api::*;
pub use classify::{classify, instance_value, measured_value, raw_value};
pub use clock::*;
pub use codec::{DocumentCodec, TermCodec};
pub use context::LdContext;
pub use error::{TemporaError, TemporaResult};
pub use extract::{ExtractedObservation, TemporalCandidate, entity_id, entity_type, extract};
pub use ids::*;
pub use inject::inject_temporal_values;
pub use record::*;
pub use value::*;
