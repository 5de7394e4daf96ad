//! The event record: the unit of distribution.
//!
//! A record is built once by a producer, validated, serialized to JSON and
//! never mutated afterwards. Consumers decode it back with the same checks.

pub mod kinds;
pub mod payload;
pub mod record;

pub use kinds::{EventType, Severity, SourceAgent, UiTarget};
pub use payload::{Citation, Content, GeoReference, ProofLayer, SuggestedAction, UiBinding};
pub use record::{EventRecord, EventRecordBuilder};
