//! Bridge - message passing between the host and rendered fragments
//!
//! ## Architecture
//!
//! ```text
//! fragment ──(origin, {event_type, payload})──▶ Bridge::receive
//!                                                 │ origin check
//!                                                 ▼
//!                                          handle_inbound
//!                                     ┌───────────┼─────────────┐
//!                                     ▼           ▼             ▼
//!                                 EventLog   state_sync?    callback
//!                                            StateStore
//!
//! Bridge::push_state ──▶ TransportInstruction ──▶ (external transport)
//! ```
//!
//! The bridge never delivers anything itself. Outbound instructions name an
//! explicit target origin, never a wildcard.

mod origin;
mod script;

pub use origin::{OriginPolicy, TargetOrigin};
pub use script::{bridge_script, inject_script, SEND_FN, STATE_HOOK, SYNC_FN};

use crate::sync::{RemoteUpdate, StateMap, StateStore, SyncOutcome};
use chrono::{DateTime, Utc};
use fragkit_foundation::{
    Error, Event, EventDirection, EventLog, EventQuery, KitConfig, Payload, Result,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Event type whose payload carries `{ "state": {...}, "version": n }` and
/// optionally the client's RFC 3339 `"timestamp"` for the edit
pub const STATE_SYNC_EVENT: &str = "state_sync";

/// Event type recorded for every outbound state push
pub const STATE_PUSH_EVENT: &str = "state_push";

/// Callback for one `(component, event_type)` pair
pub type EventCallback = Arc<dyn Fn(&Payload) -> anyhow::Result<()> + Send + Sync>;

// ============================================================================
// Messages
// ============================================================================

/// Message delivered by the transport from a fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub event_type: String,
    #[serde(default)]
    pub payload: Payload,
}

impl InboundMessage {
    pub fn new(event_type: impl Into<String>, payload: Payload) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    /// A `state_sync` message built on `version`
    pub fn state_sync(state: StateMap, version: u64) -> Self {
        let mut payload = Payload::new();
        payload.insert("state".into(), Value::Object(state));
        payload.insert("version".into(), json!(version));
        Self::new(STATE_SYNC_EVENT, payload)
    }

    /// A `state_sync` message carrying the time the client made the edit
    pub fn state_sync_at(state: StateMap, version: u64, timestamp: DateTime<Utc>) -> Self {
        let mut message = Self::state_sync(state, version);
        message
            .payload
            .insert("timestamp".into(), json!(timestamp.to_rfc3339()));
        message
    }
}

/// What the transport must deliver to update a fragment's state
#[derive(Debug, Clone, PartialEq)]
pub struct TransportInstruction {
    pub component: String,
    pub target_origin: TargetOrigin,
    /// `postMessage` payload
    pub message: Value,
    /// Equivalent script for transports that evaluate JavaScript in the frame
    pub script: String,
}

// ============================================================================
// Bridge
// ============================================================================

pub struct Bridge {
    state: Arc<StateStore>,
    events: Arc<EventLog>,
    policy: OriginPolicy,
    callbacks: RwLock<HashMap<(String, String), EventCallback>>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("policy", &self.policy)
            .field("callbacks", &self.callbacks.read().len())
            .finish()
    }
}

impl Bridge {
    pub fn new(state: Arc<StateStore>, events: Arc<EventLog>, policy: OriginPolicy) -> Self {
        Self {
            state,
            events,
            policy,
            callbacks: RwLock::new(HashMap::new()),
        }
    }

    /// Fresh state store and event log sized by `config`
    pub fn from_config(config: &KitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            Arc::new(StateStore::new(config.state.clone())?),
            Arc::new(EventLog::with_config(&config.events)?),
            OriginPolicy::from_config(&config.bridge)?,
        ))
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub fn policy(&self) -> &OriginPolicy {
        &self.policy
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    /// Register (or replace) the callback for `component:event_type`
    pub fn register_callback<F>(&self, component: &str, event_type: &str, callback: F)
    where
        F: Fn(&Payload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback: EventCallback = Arc::new(callback);
        self.callbacks
            .write()
            .insert((component.to_string(), event_type.to_string()), callback);
        debug!(component = %component, event_type = %event_type, "Callback registered");
    }

    pub fn unregister_callback(&self, component: &str, event_type: &str) -> bool {
        self.callbacks
            .write()
            .remove(&(component.to_string(), event_type.to_string()))
            .is_some()
    }

    /// Remove one component's callbacks, or all of them
    pub fn clear_callbacks(&self, component: Option<&str>) -> usize {
        let mut callbacks = self.callbacks.write();
        let before = callbacks.len();
        match component {
            Some(name) => callbacks.retain(|(c, _), _| c != name),
            None => callbacks.clear(),
        }
        before - callbacks.len()
    }

    pub fn has_callback(&self, component: &str, event_type: &str) -> bool {
        self.callbacks
            .read()
            .contains_key(&(component.to_string(), event_type.to_string()))
    }

    fn callback(&self, component: &str, event_type: &str) -> Option<EventCallback> {
        self.callbacks
            .read()
            .get(&(component.to_string(), event_type.to_string()))
            .cloned()
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Validate the sender's origin, then handle the message
    pub fn receive(
        &self,
        component: &str,
        message: InboundMessage,
        origin: &str,
    ) -> Result<Option<SyncOutcome>> {
        self.policy.check(origin)?;
        self.handle_inbound(component, message)
    }

    /// Record, apply `state_sync` payloads, then run the registered callback
    ///
    /// Callback errors propagate as [`Error::Callback`].
    pub fn handle_inbound(
        &self,
        component: &str,
        message: InboundMessage,
    ) -> Result<Option<SyncOutcome>> {
        let InboundMessage {
            event_type,
            payload,
        } = message;
        info!(component = %component, event_type = %event_type, "Inbound event");
        self.events.record(component, event_type.as_str(), payload.clone());

        let outcome = if event_type == STATE_SYNC_EVENT {
            let update = parse_state_sync(&payload)?;
            Some(self.state.sync_from_client(component, update)?)
        } else {
            None
        };

        self.invoke(component, &event_type, &payload)?;
        Ok(outcome)
    }

    fn invoke(&self, component: &str, event_type: &str, payload: &Payload) -> Result<bool> {
        let Some(callback) = self.callback(component, event_type) else {
            return Ok(false);
        };
        callback(payload).map_err(|e| Error::callback(component, event_type, e))?;
        Ok(true)
    }

    /// Re-run recorded inbound events through the registered callbacks, in
    /// order. Returns how many callbacks ran. Events are not re-recorded and
    /// `state_sync` payloads are not re-applied.
    pub fn replay_events(&self, component: &str, event_type: Option<&str>) -> Result<usize> {
        let mut query = EventQuery::component(component).with_direction(EventDirection::Inbound);
        if let Some(event_type) = event_type {
            query = query.with_event_type(event_type);
        }
        let mut invoked = 0;
        self.events.try_replay(&query, |event| {
            if self.invoke(event.component(), event.event_type(), event.payload())? {
                invoked += 1;
            }
            Ok::<(), Error>(())
        })?;
        Ok(invoked)
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Build the instruction that pushes the component's current state
    pub fn push_state(&self, component: &str) -> Result<TransportInstruction> {
        let snapshot = self
            .state
            .snapshot(component)
            .ok_or_else(|| Error::ComponentNotFound(component.to_string()))?;

        let state = Value::Object(snapshot.state);
        let message = json!({
            "type": "fragkit:state",
            "component": component,
            "state": state,
            "version": snapshot.version,
        });
        let script = format!(
            concat!(
                "<script>if (typeof window.{hook} === 'function') ",
                "{{ window.{hook}({state}, {version}); }}</script>"
            ),
            hook = STATE_HOOK,
            state = js_json(&state),
            version = snapshot.version,
        );

        let mut payload = Payload::new();
        payload.insert("version".into(), json!(snapshot.version));
        self.events
            .append(Event::outbound(component, STATE_PUSH_EVENT, payload));
        debug!(component = %component, version = snapshot.version, "State push prepared");

        Ok(TransportInstruction {
            component: component.to_string(),
            target_origin: self.policy.target(),
            message,
            script,
        })
    }

    /// Add the client-side bridge script to rendered HTML
    pub fn inject_bridge(&self, html: &str, component: &str) -> String {
        inject_script(html, &bridge_script(component, &self.policy))
    }

    pub fn export_events(&self, component: &str) -> Result<String> {
        self.events.export_json(component)
    }
}

fn parse_state_sync(payload: &Payload) -> Result<RemoteUpdate> {
    let state = match payload.get("state") {
        Some(Value::Object(map)) => map.clone(),
        _ => {
            return Err(Error::InvalidInput(
                "state_sync payload needs a 'state' object".to_string(),
            ))
        }
    };
    let version = payload
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| {
            Error::InvalidInput("state_sync payload needs a non-negative 'version'".to_string())
        })?;

    let update = RemoteUpdate::from_client(state, version);
    match payload.get("timestamp") {
        None | Some(Value::Null) => Ok(update),
        Some(Value::String(text)) => {
            let timestamp = DateTime::parse_from_rfc3339(text).map_err(|e| {
                Error::InvalidInput(format!("state_sync 'timestamp' is not RFC 3339: {}", e))
            })?;
            Ok(update.with_timestamp(timestamp.with_timezone(&Utc)))
        }
        Some(_) => Err(Error::InvalidInput(
            "state_sync 'timestamp' must be an RFC 3339 string".to_string(),
        )),
    }
}

/// JSON literal safe to embed in a `<script>` element
fn js_json(value: &Value) -> String {
    value
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::state_from_json;
    use fragkit_foundation::ConflictStrategy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bridge() -> Bridge {
        Bridge::from_config(&KitConfig::default()).unwrap()
    }

    #[test]
    fn test_callback_invoked_with_payload() {
        let bridge = bridge();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        bridge.register_callback("btn", "click", move |payload| {
            counter.fetch_add(payload["n"].as_u64().unwrap_or(0) as usize, Ordering::SeqCst);
            Ok(())
        });

        let payload = state_from_json(json!({"n": 3}));
        bridge
            .handle_inbound("btn", InboundMessage::new("click", payload))
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(bridge.events().len(), 1);
    }

    #[test]
    fn test_callback_error_propagates() {
        let bridge = bridge();
        bridge.register_callback("btn", "click", |_| Err(anyhow::anyhow!("handler broke")));
        let err = bridge
            .handle_inbound("btn", InboundMessage::new("click", Payload::new()))
            .unwrap_err();
        assert!(matches!(err, Error::Callback { ref event_type, .. } if event_type == "click"));
        // Still recorded
        assert_eq!(bridge.events().len(), 1);
    }

    #[test]
    fn test_receive_checks_origin() {
        let config = KitConfig::default().with_allowed_origins(vec!["https://app.example".into()]);
        let bridge = Bridge::from_config(&config).unwrap();

        let err = bridge
            .receive("btn", InboundMessage::new("click", Payload::new()), "https://evil.example")
            .unwrap_err();
        assert!(matches!(err, Error::OriginNotAllowed { .. }));
        assert!(bridge.events().is_empty());

        assert!(bridge
            .receive("btn", InboundMessage::new("click", Payload::new()), "https://app.example")
            .is_ok());
    }

    #[test]
    fn test_same_origin_sender_accepted_with_host_origin() {
        let config = KitConfig::default().with_host_origin("http://localhost:8501");
        let bridge = Bridge::from_config(&config).unwrap();
        assert!(bridge.policy().is_same_origin_only());

        let click = || InboundMessage::new("click", Payload::new());
        assert!(bridge.receive("btn", click(), "http://localhost:8501").is_ok());
        assert!(matches!(
            bridge.receive("btn", click(), "https://evil.example"),
            Err(Error::OriginNotAllowed { .. })
        ));
        assert_eq!(bridge.events().len(), 1);
    }

    #[test]
    fn test_default_config_without_host_rejects_all() {
        let err = bridge()
            .receive("btn", InboundMessage::new("click", Payload::new()), "http://localhost:8501")
            .unwrap_err();
        assert!(matches!(err, Error::OriginNotAllowed { .. }));
    }

    #[test]
    fn test_latest_wins_uses_client_timestamp() {
        let config = KitConfig::default().with_conflict_strategy(ConflictStrategy::LatestWins);
        let bridge = Bridge::from_config(&config).unwrap();
        bridge.state().set_state("form", state_from_json(json!({"n": 1})));
        bridge.state().set_state("form", state_from_json(json!({"n": 2})));

        let mut payload = state_from_json(json!({"state": {"n": 99}, "version": 1}));
        payload.insert("timestamp".into(), json!("2000-01-01T00:00:00Z"));
        let outcome = bridge
            .handle_inbound("form", InboundMessage::new(STATE_SYNC_EVENT, payload))
            .unwrap();
        assert!(matches!(outcome, Some(SyncOutcome::Rejected { .. })));
        assert_eq!(
            bridge.state().get_state("form"),
            Some(state_from_json(json!({"n": 2})))
        );

        let later = Utc::now() + chrono::Duration::seconds(1);
        let outcome = bridge
            .handle_inbound(
                "form",
                InboundMessage::state_sync_at(state_from_json(json!({"n": 7})), 1, later),
            )
            .unwrap();
        assert!(outcome.is_some_and(|o| o.accepted()));
        assert_eq!(
            bridge.state().get_state("form"),
            Some(state_from_json(json!({"n": 7})))
        );
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        let bridge = bridge();
        let payload = state_from_json(json!({"state": {}, "version": 1, "timestamp": "yesterday"}));
        let err = bridge
            .handle_inbound("c", InboundMessage::new(STATE_SYNC_EVENT, payload))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_state_sync_applies() {
        let bridge = bridge();
        bridge.state().set_state("counter", state_from_json(json!({"count": 1})));

        let outcome = bridge
            .handle_inbound(
                "counter",
                InboundMessage::state_sync(state_from_json(json!({"count": 2})), 1),
            )
            .unwrap();
        assert!(matches!(outcome, Some(SyncOutcome::Applied(_))));
        assert_eq!(
            bridge.state().get_state("counter"),
            Some(state_from_json(json!({"count": 2})))
        );
    }

    #[test]
    fn test_malformed_state_sync() {
        let bridge = bridge();
        let err = bridge
            .handle_inbound(
                "c",
                InboundMessage::new(STATE_SYNC_EVENT, state_from_json(json!({"state": 1}))),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_push_state_instruction() {
        let bridge = bridge();
        assert!(matches!(
            bridge.push_state("missing"),
            Err(Error::ComponentNotFound(_))
        ));

        bridge.state().set_state("counter", state_from_json(json!({"count": 5})));
        let instruction = bridge.push_state("counter").unwrap();

        assert_eq!(instruction.target_origin, TargetOrigin::SameOrigin);
        assert_eq!(instruction.message["version"], 1);
        assert_eq!(instruction.message["state"]["count"], 5);
        assert!(instruction.script.contains(STATE_HOOK));

        let outbound = bridge
            .events()
            .history(&EventQuery::new().with_direction(EventDirection::Outbound));
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].event_type(), STATE_PUSH_EVENT);
    }

    #[test]
    fn test_replay_events_through_callbacks() {
        let bridge = bridge();
        for _ in 0..3 {
            bridge
                .handle_inbound("counter", InboundMessage::new("increment", Payload::new()))
                .unwrap();
        }
        bridge.state().set_state("counter", Payload::new());
        bridge.push_state("counter").unwrap();

        let total = Arc::new(AtomicUsize::new(0));
        let t = total.clone();
        bridge.register_callback("counter", "increment", move |_| {
            t.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(bridge.replay_events("counter", None).unwrap(), 3);
        assert_eq!(bridge.replay_events("counter", Some("increment")).unwrap(), 3);
        assert_eq!(total.load(Ordering::SeqCst), 6);
        assert_eq!(bridge.events().len(), 4);
    }

    #[test]
    fn test_clear_callbacks() {
        let bridge = bridge();
        bridge.register_callback("a", "x", |_| Ok(()));
        bridge.register_callback("a", "y", |_| Ok(()));
        bridge.register_callback("b", "x", |_| Ok(()));

        assert!(bridge.unregister_callback("a", "y"));
        assert!(!bridge.has_callback("a", "y"));
        assert_eq!(bridge.clear_callbacks(Some("a")), 1);
        assert_eq!(bridge.clear_callbacks(None), 1);
    }

    #[test]
    fn test_inject_and_export() {
        let bridge = bridge();
        let html = bridge.inject_bridge("<body><button>Go</button></body>", "btn");
        assert!(html.contains(SEND_FN));
        assert!(html.ends_with("</body>"));

        bridge
            .handle_inbound("btn", InboundMessage::new("click", Payload::new()))
            .unwrap();
        let exported: Vec<Event> =
            serde_json::from_str(&bridge.export_events("btn").unwrap()).unwrap();
        assert_eq!(exported.len(), 1);
    }
}
