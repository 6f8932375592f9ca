//! Client-side bridge script and HTML injection

use super::origin::{js_string, OriginPolicy};
use regex::Regex;
use std::sync::OnceLock;

/// Global hook the fragment defines to receive pushed state
pub const STATE_HOOK: &str = "onFragkitState";

/// Global function the fragment calls to send events to the host
pub const SEND_FN: &str = "sendToHost";

/// Global function the fragment calls to push its own state edits
pub const SYNC_FN: &str = "syncStateToHost";

fn body_close() -> Option<&'static Regex> {
    static BODY_CLOSE: OnceLock<Option<Regex>> = OnceLock::new();
    BODY_CLOSE
        .get_or_init(|| Regex::new(r"(?i)</body\s*>").ok())
        .as_ref()
}

/// Build the `<script>` element for one component
///
/// The script posts events to the parent frame at the policy's target
/// origin and accepts state pushes only from allow-listed origins. State
/// edits go out as `state_sync` events stamped with the client's clock.
pub fn bridge_script(component: &str, policy: &OriginPolicy) -> String {
    let component = js_string(component);
    let allowed = policy.js_allowed_list();
    let target = policy.target().js_expr();

    format!(
        r#"<script>
(function() {{
    const COMPONENT = {component};
    const ALLOWED_ORIGINS = {allowed};
    const TARGET_ORIGIN = {target};

    function post(message) {{
        if (!window.parent || window.parent === window) {{
            return;
        }}
        window.parent.postMessage(message, TARGET_ORIGIN);
    }}

    window.{send} = function(eventType, payload) {{
        if (typeof eventType !== 'string') {{
            console.error('[fragkit] event type must be a string');
            return;
        }}
        post({{
            type: 'fragkit:event',
            component: COMPONENT,
            event_type: eventType,
            payload: payload || {{}},
            timestamp: Date.now()
        }});
    }};

    window.{sync} = function(state, version) {{
        window.{send}('state_sync', {{
            state: state || {{}},
            version: version,
            timestamp: new Date().toISOString()
        }});
    }};

    window.addEventListener('message', function(event) {{
        if (!ALLOWED_ORIGINS.includes(event.origin)) {{
            console.warn('[fragkit] ignoring message from', event.origin);
            return;
        }}
        const data = event.data || {{}};
        if (data.type === 'fragkit:state' && data.component === COMPONENT
                && typeof window.{hook} === 'function') {{
            window.{hook}(data.state, data.version);
        }}
    }});

    post({{ type: 'fragkit:ready', component: COMPONENT }});
}})();
</script>"#,
        component = component,
        allowed = allowed,
        target = target,
        send = SEND_FN,
        sync = SYNC_FN,
        hook = STATE_HOOK,
    )
}

/// Insert `script` before the first `</body>` (any case), or append it
pub fn inject_script(html: &str, script: &str) -> String {
    match body_close().and_then(|re| re.find(html)) {
        Some(m) => {
            let mut out = String::with_capacity(html.len() + script.len());
            out.push_str(&html[..m.start()]);
            out.push_str(script);
            out.push_str(&html[m.start()..]);
            out
        }
        None => format!("{}{}", html, script),
    }
}
