//! Nested structures of an event record: presentation hint, content, and
//! the proof layer (confidence + audit trail).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ValidationError;

use super::kinds::{SourceAgent, UiTarget};

/// Optional geospatial anchor for a briefing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoReference {
    /// Identifier of the map feature (trail segment, burn unit, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,
    /// WGS84 latitude.
    pub latitude: f64,
    /// WGS84 longitude.
    pub longitude: f64,
    /// Optional GeoJSON geometry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
}

/// Presentation hint for clients.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UiBinding {
    /// Where the client should surface the event.
    pub target: UiTarget,
    /// Optional map anchor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_reference: Option<GeoReference>,
}

/// A follow-up the operator may hand to another agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedAction {
    /// Stable identifier of the action.
    pub action_id: String,
    /// Button label.
    pub label: String,
    /// Agent that would carry the action out.
    pub target_agent: SourceAgent,
    /// What the action does.
    pub description: String,
    /// Why it is suggested.
    pub rationale: String,
}

/// Human-readable body of an event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    /// One-line summary. Never empty.
    pub summary: String,
    /// Longer explanation.
    #[serde(default)]
    pub detail: String,
    /// Ordered suggested follow-ups.
    #[serde(default)]
    pub suggested_actions: Vec<SuggestedAction>,
}

/// A source backing a claim in the event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Kind of source (`"imagery"`, `"field_report"`, `"regulation"`, ...).
    pub source_type: String,
    /// Identifier within that source.
    pub id: String,
    /// Optional link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Optional quoted excerpt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

/// Confidence and audit trail for an event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProofLayer {
    /// Producer confidence in `[0, 1]`, when the producer states one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Ordered citations.
    #[serde(default)]
    pub citations: Vec<Citation>,
    /// Ordered reasoning steps.
    #[serde(default)]
    pub reasoning_chain: Vec<String>,
}

impl ProofLayer {
    /// Create a proof layer, rejecting a confidence outside `[0, 1]`.
    pub fn new(confidence: f64) -> Result<Self, ValidationError> {
        let layer = Self {
            confidence: Some(confidence),
            citations: Vec::new(),
            reasoning_chain: Vec::new(),
        };
        layer.validate()?;
        Ok(layer)
    }

    /// Check the confidence bound if one is present. NaN is rejected.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.confidence {
            Some(c) if !(0.0..=1.0).contains(&c) => Err(ValidationError::ConfidenceOutOfRange(c)),
            _ => Ok(()),
        }
    }
}
