//! Event Log - bounded, append-only, replayable event record
//!
//! Events are kept in arrival order. When the log is full the oldest event
//! is dropped; the relative order of what remains never changes.
//!
//! Replay clones the matching events under the lock and invokes the caller's
//! closure after releasing it, so a closure may record new events without
//! deadlocking. Replaying the same sequence through the same closure is
//! deterministic only if the closure itself is.

use super::types::{Event, EventQuery, Payload};
use crate::config::EventLogConfig;
use crate::Result;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::trace;

/// Bounded event log
#[derive(Debug)]
pub struct EventLog {
    events: Mutex<VecDeque<Event>>,
    max_events: usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self::bounded(EventLogConfig::default().max_events)
    }

    /// Fails with [`Error::Config`](crate::Error::Config) when `max_events` is 0
    pub fn with_config(config: &EventLogConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::bounded(config.max_events))
    }

    pub fn with_capacity(max_events: usize) -> Result<Self> {
        Self::with_config(&EventLogConfig { max_events })
    }

    fn bounded(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events,
        }
    }

    /// Record an inbound event stamped with the current time
    pub fn record(
        &self,
        component: impl Into<String>,
        event_type: impl Into<String>,
        payload: Payload,
    ) -> Event {
        self.append(Event::new(component, event_type, payload))
    }

    /// Append a prebuilt event
    pub fn append(&self, event: Event) -> Event {
        let mut events = self.events.lock();
        while events.len() >= self.max_events {
            events.pop_front();
        }
        trace!(
            component = %event.component(),
            event_type = %event.event_type(),
            direction = event.direction().as_str(),
            "event recorded"
        );
        events.push_back(event.clone());
        event
    }

    /// Matching events, oldest first
    pub fn history(&self, query: &EventQuery) -> Vec<Event> {
        let events = self.events.lock();
        let mut matched: Vec<Event> = events.iter().filter(|e| query.matches(e)).cloned().collect();
        if let Some(limit) = query.limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        matched
    }

    /// Call `apply` for every matching event in chronological order.
    /// Returns the number of events replayed.
    pub fn replay<F>(&self, query: &EventQuery, mut apply: F) -> usize
    where
        F: FnMut(&Event),
    {
        let events = self.history(query);
        for event in &events {
            apply(event);
        }
        events.len()
    }

    /// Like [`replay`](Self::replay) but stops at the first error
    pub fn try_replay<F, E>(
        &self,
        query: &EventQuery,
        mut apply: F,
    ) -> std::result::Result<usize, E>
    where
        F: FnMut(&Event) -> std::result::Result<(), E>,
    {
        let events = self.history(query);
        for event in &events {
            apply(event)?;
        }
        Ok(events.len())
    }

    /// Serializable copy of one component's events
    pub fn export(&self, component: &str) -> Vec<Event> {
        self.history(&EventQuery::component(component))
    }

    pub fn export_json(&self, component: &str) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export(component))?)
    }

    /// Clear one component's events, or everything. Returns how many were removed.
    pub fn clear(&self, component: Option<&str>) -> usize {
        let mut events = self.events.lock();
        let before = events.len();
        match component {
            Some(name) => events.retain(|e| e.component() != name),
            None => events.clear(),
        }
        before - events.len()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_events
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
