//! Event Types - records exchanged between the host and rendered fragments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Event ID
// ============================================================================

/// Unique event id (uuid v4)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Direction
// ============================================================================

/// Which side produced the event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDirection {
    /// Fragment → host
    #[default]
    Inbound,
    /// Host → fragment
    Outbound,
}

impl EventDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

// ============================================================================
// Event
// ============================================================================

/// Event payload
pub type Payload = Map<String, Value>;

/// Immutable event record
///
/// Fields are private; an event never changes after [`EventLog`](super::EventLog)
/// records it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    component: String,
    event_type: String,
    #[serde(default)]
    payload: Payload,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    direction: EventDirection,
}

impl Event {
    pub fn new(
        component: impl Into<String>,
        event_type: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            id: EventId::new(),
            component: component.into(),
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
            direction: EventDirection::Inbound,
        }
    }

    pub fn outbound(
        component: impl Into<String>,
        event_type: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self::new(component, event_type, payload).with_direction(EventDirection::Outbound)
    }

    pub fn with_direction(mut self, direction: EventDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn direction(&self) -> EventDirection {
        self.direction
    }

    pub fn is_inbound(&self) -> bool {
        self.direction == EventDirection::Inbound
    }
}

// ============================================================================
// Query
// ============================================================================

/// Filter for history, replay and export
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub component: Option<String>,
    pub event_type: Option<String>,
    pub direction: Option<EventDirection>,
    /// Keep only the last N matches
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn component(name: impl Into<String>) -> Self {
        Self::new().with_component(name)
    }

    pub fn with_component(mut self, name: impl Into<String>) -> Self {
        self.component = Some(name.into());
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_direction(mut self, direction: EventDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref component) = self.component {
            if event.component != *component {
                return false;
            }
        }
        if let Some(ref event_type) = self.event_type {
            if event.event_type != *event_type {
                return false;
            }
        }
        if let Some(direction) = self.direction {
            if event.direction != direction {
                return false;
            }
        }
        true
    }
}
