//! Closed enumerations carried by every event record.
//!
//! Membership is enforced by the type system at construction and by serde at
//! decode time: an unknown wire string is a decode failure, never a silent
//! fallback.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What kind of briefing an event is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Something the operator must look at now.
    Alert,
    /// An analytical finding.
    Insight,
    /// The operator has to decide or act.
    ActionRequired,
    /// Progress or state report from an agent.
    StatusUpdate,
}

impl EventType {
    /// Every variant, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Alert,
        Self::Insight,
        Self::ActionRequired,
        Self::StatusUpdate,
    ];

    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alert => "ALERT",
            Self::Insight => "INSIGHT",
            Self::ActionRequired => "ACTION_REQUIRED",
            Self::StatusUpdate => "STATUS_UPDATE",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The producer that emitted an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceAgent {
    /// Orchestrates the other agents and summarizes for the operator.
    RecoveryCoordinator,
    /// Burn severity analysis.
    BurnAnalyst,
    /// Trail damage assessment.
    TrailAssessor,
    /// Timber cruising support.
    CruisingAssistant,
    /// Environmental compliance guidance.
    NepaAdvisor,
}

impl SourceAgent {
    /// Every variant, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::RecoveryCoordinator,
        Self::BurnAnalyst,
        Self::TrailAssessor,
        Self::CruisingAssistant,
        Self::NepaAdvisor,
    ];

    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RecoveryCoordinator => "recovery_coordinator",
            Self::BurnAnalyst => "burn_analyst",
            Self::TrailAssessor => "trail_assessor",
            Self::CruisingAssistant => "cruising_assistant",
            Self::NepaAdvisor => "nepa_advisor",
        }
    }
}

impl fmt::Display for SourceAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How urgent an event is. Ordered: `Info < Warning < Critical`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Informational.
    Info,
    /// Needs attention soon.
    Warning,
    /// Needs attention now.
    Critical,
}

impl Severity {
    /// Every variant, lowest first.
    pub const ALL: [Self; 3] = [Self::Info, Self::Warning, Self::Critical];

    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a client should surface an event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiTarget {
    /// Append to the briefing panel.
    #[default]
    PanelInject,
    /// Highlight a feature on the map.
    MapHighlight,
    /// Pulse the agent's indicator in the side rail.
    RailPulse,
    /// Interrupt with a modal dialog.
    ModalInterrupt,
}

impl UiTarget {
    /// Every variant, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::PanelInject,
        Self::MapHighlight,
        Self::RailPulse,
        Self::ModalInterrupt,
    ];
}
