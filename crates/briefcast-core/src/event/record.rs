//! The immutable, versioned event record and its builder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::{EVENT_SCHEMA_VERSION, SUPPORTED_SCHEMA_MAJOR};
use crate::errors::ValidationError;
use crate::ids::{CorrelationId, EventId};

use super::kinds::{EventType, Severity, SourceAgent, UiTarget};
use super::payload::{Citation, Content, GeoReference, ProofLayer, SuggestedAction, UiBinding};

/// One briefing from one producer.
///
/// Fields are private: a record is validated once, at construction or decode,
/// and is never mutated afterwards. Share it behind an `Arc` for fan-out.
///
/// `parent_event_id` is tri-state on the wire: absent, explicit `null`, or an
/// id. The distinction survives a decode/encode round trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    schema_version: String,
    event_id: EventId,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    parent_event_id: Option<Option<EventId>>,
    correlation_id: CorrelationId,
    timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    event_type: EventType,
    source_agent: SourceAgent,
    severity: Severity,
    ui_binding: UiBinding,
    content: Content,
    proof_layer: ProofLayer,
}

/// Map a present field (value or `null`) to `Some(..)`; absence is handled
/// by `#[serde(default)]`.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl EventRecord {
    /// Start building a record with its four mandatory classifiers.
    pub fn builder(
        event_type: EventType,
        source_agent: SourceAgent,
        severity: Severity,
        correlation_id: impl Into<CorrelationId>,
    ) -> EventRecordBuilder {
        EventRecordBuilder::new(event_type, source_agent, severity, correlation_id.into())
    }

    /// Decode and validate a record from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let record: Self = serde_json::from_str(json)?;
        record.validate()?;
        Ok(record)
    }

    /// Encode to the JSON wire form.
    pub fn to_json(&self) -> Result<String, ValidationError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check every invariant a record must satisfy.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_schema_version(&self.schema_version)?;
        if self.content.summary.trim().is_empty() {
            return Err(ValidationError::EmptyField("content.summary"));
        }
        if self.correlation_id.is_empty() {
            return Err(ValidationError::EmptyField("correlation_id"));
        }
        self.proof_layer.validate()
    }

    /// Semantic schema version the record was produced with.
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Unique id of this record.
    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    /// Causally prior event, if one was named.
    pub fn parent_event_id(&self) -> Option<&EventId> {
        self.parent_event_id.as_ref().and_then(Option::as_ref)
    }

    /// Whether `parent_event_id` was present on the wire (even as `null`).
    pub fn has_parent_field(&self) -> bool {
        self.parent_event_id.is_some()
    }

    /// Incident/workflow grouping key.
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Creation time (UTC).
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Event classification.
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Producer that emitted the record.
    pub fn source_agent(&self) -> SourceAgent {
        self.source_agent
    }

    /// Urgency.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Presentation hint.
    pub fn ui_binding(&self) -> &UiBinding {
        &self.ui_binding
    }

    /// Human-readable content.
    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Confidence and audit trail.
    pub fn proof_layer(&self) -> &ProofLayer {
        &self.proof_layer
    }
}

/// Accept any `1.x.y`, with an optional semver pre-release (`-beta`) or
/// build (`+sha`) suffix; reject other majors and malformed strings.
fn check_schema_version(version: &str) -> Result<(), ValidationError> {
    let core = match version.split_once(['-', '+']) {
        Some((core, suffix)) if !suffix.is_empty() => core,
        Some(_) => return Err(ValidationError::MalformedSchemaVersion(version.to_owned())),
        None => version,
    };
    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
        return Err(ValidationError::MalformedSchemaVersion(version.to_owned()));
    }
    let major: u64 = parts[0]
        .parse()
        .map_err(|_| ValidationError::MalformedSchemaVersion(version.to_owned()))?;
    if major == SUPPORTED_SCHEMA_MAJOR {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedSchemaVersion(version.to_owned()))
    }
}

/// Fluent builder for [`EventRecord`]. `build()` validates.
#[derive(Clone, Debug)]
pub struct EventRecordBuilder {
    event_id: Option<EventId>,
    parent_event_id: Option<Option<EventId>>,
    correlation_id: CorrelationId,
    timestamp: Option<DateTime<Utc>>,
    event_type: EventType,
    source_agent: SourceAgent,
    severity: Severity,
    ui_binding: UiBinding,
    content: Content,
    proof_layer: ProofLayer,
}

impl EventRecordBuilder {
    fn new(
        event_type: EventType,
        source_agent: SourceAgent,
        severity: Severity,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            event_id: None,
            parent_event_id: None,
            correlation_id,
            timestamp: None,
            event_type,
            source_agent,
            severity,
            ui_binding: UiBinding::default(),
            content: Content::default(),
            proof_layer: ProofLayer::default(),
        }
    }

    /// Use a fixed event id instead of generating one.
    #[must_use]
    pub fn event_id(mut self, id: impl Into<EventId>) -> Self {
        self.event_id = Some(id.into());
        self
    }

    /// Reference a causally prior event.
    #[must_use]
    pub fn parent(mut self, id: impl Into<EventId>) -> Self {
        self.parent_event_id = Some(Some(id.into()));
        self
    }

    /// Emit `"parent_event_id": null` explicitly.
    #[must_use]
    pub fn explicit_null_parent(mut self) -> Self {
        self.parent_event_id = Some(None);
        self
    }

    /// Override the creation time.
    #[must_use]
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// One-line summary.
    #[must_use]
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.content.summary = summary.into();
        self
    }

    /// Longer explanation.
    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.content.detail = detail.into();
        self
    }

    /// Append a suggested follow-up.
    #[must_use]
    pub fn action(mut self, action: SuggestedAction) -> Self {
        self.content.suggested_actions.push(action);
        self
    }

    /// Presentation target.
    #[must_use]
    pub fn ui_target(mut self, target: UiTarget) -> Self {
        self.ui_binding.target = target;
        self
    }

    /// Map anchor.
    #[must_use]
    pub fn geo_reference(mut self, geo: GeoReference) -> Self {
        self.ui_binding.geo_reference = Some(geo);
        self
    }

    /// Producer confidence in `[0, 1]` (checked by `build`).
    #[must_use]
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.proof_layer.confidence = Some(confidence);
        self
    }

    /// Append a citation.
    #[must_use]
    pub fn citation(mut self, citation: Citation) -> Self {
        self.proof_layer.citations.push(citation);
        self
    }

    /// Append a reasoning step.
    #[must_use]
    pub fn reasoning_step(mut self, step: impl Into<String>) -> Self {
        self.proof_layer.reasoning_chain.push(step.into());
        self
    }

    /// Validate and produce the record.
    pub fn build(self) -> Result<EventRecord, ValidationError> {
        let record = EventRecord {
            schema_version: EVENT_SCHEMA_VERSION.to_owned(),
            event_id: self.event_id.unwrap_or_default(),
            parent_event_id: self.parent_event_id,
            correlation_id: self.correlation_id,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            event_type: self.event_type,
            source_agent: self.source_agent,
            severity: self.severity,
            ui_binding: self.ui_binding,
            content: self.content,
            proof_layer: self.proof_layer,
        };
        record.validate()?;
        Ok(record)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
