//! Allow-list admission filter over source agent and event type.

use briefcast_core::{EventRecord, EventType, SourceAgent};

/// Admits an event iff its agent is allowed (or no agents are listed) and
/// its type is allowed (or no types are listed).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdmissionFilter {
    /// Allowed producers; empty allows all.
    pub agents: Vec<SourceAgent>,
    /// Allowed event types; empty allows all.
    pub event_types: Vec<EventType>,
}

impl AdmissionFilter {
    /// Build a filter from the two allow-lists.
    pub fn new(agents: Vec<SourceAgent>, event_types: Vec<EventType>) -> Self {
        Self {
            agents,
            event_types,
        }
    }

    /// Whether `event` passes.
    pub fn admits(&self, event: &EventRecord) -> bool {
        (self.agents.is_empty() || self.agents.contains(&event.source_agent()))
            && (self.event_types.is_empty() || self.event_types.contains(&event.event_type()))
    }

    /// Whether the filter admits everything.
    pub fn is_open(&self) -> bool {
        self.agents.is_empty() && self.event_types.is_empty()
    }
}

/// `None` admits everything.
pub(crate) fn admits(filter: Option<&AdmissionFilter>, event: &EventRecord) -> bool {
    filter.is_none_or(|f| f.admits(event))
}
