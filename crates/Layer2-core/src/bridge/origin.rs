//! Origin allow-list
//!
//! Wildcards are never accepted. An empty allow-list means same-origin only:
//! the client script targets `window.location.origin`, and inbound messages
//! are accepted only from the host's own origin when one is configured.

use fragkit_foundation::config::validate_origin;
use fragkit_foundation::{BridgeConfig, Error, Result};
use tracing::warn;

/// Where outbound messages are posted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOrigin {
    Explicit(String),
    /// The page's own origin, resolved client-side
    SameOrigin,
}

impl TargetOrigin {
    /// JavaScript expression evaluating to the origin string
    pub fn js_expr(&self) -> String {
        match self {
            TargetOrigin::Explicit(origin) => js_string(origin),
            TargetOrigin::SameOrigin => "window.location.origin".to_string(),
        }
    }
}

/// Validated set of trusted origins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginPolicy {
    allowed: Vec<String>,
    host_origin: Option<String>,
}

impl OriginPolicy {
    /// Same-origin only
    pub fn same_origin() -> Self {
        Self::default()
    }

    pub fn new<I, S>(allowed: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut normalized = Vec::new();
        for origin in allowed {
            let origin = normalize(&origin.into())?;
            if !normalized.contains(&origin) {
                normalized.push(origin);
            }
        }
        Ok(Self {
            allowed: normalized,
            host_origin: None,
        })
    }

    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let policy = Self::new(config.allowed_origins.iter().cloned())?;
        match &config.host_origin {
            Some(origin) => policy.with_host_origin(origin.as_str()),
            None => Ok(policy),
        }
    }

    /// The origin the host itself is served from
    pub fn with_host_origin(mut self, origin: impl Into<String>) -> Result<Self> {
        self.host_origin = Some(normalize(&origin.into())?);
        Ok(self)
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    pub fn host_origin(&self) -> Option<&str> {
        self.host_origin.as_deref()
    }

    pub fn is_same_origin_only(&self) -> bool {
        self.allowed.is_empty()
    }

    /// First allow-listed origin, or the page's own
    pub fn target(&self) -> TargetOrigin {
        match self.allowed.first() {
            Some(origin) => TargetOrigin::Explicit(origin.clone()),
            None => TargetOrigin::SameOrigin,
        }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        let Ok(origin) = normalize(origin) else {
            return false;
        };
        self.allowed.contains(&origin) || self.host_origin.as_deref() == Some(origin.as_str())
    }

    /// Fail with [`Error::OriginNotAllowed`] for untrusted senders
    pub fn check(&self, origin: &str) -> Result<()> {
        if self.is_allowed(origin) {
            Ok(())
        } else {
            warn!(origin = %origin, "Rejected message from untrusted origin");
            Err(Error::OriginNotAllowed {
                origin: origin.to_string(),
            })
        }
    }

    /// JavaScript array literal of trusted origins for the client script
    ///
    /// The host origin is included so state pushes from the host page pass
    /// the client-side check.
    pub fn js_allowed_list(&self) -> String {
        let mut origins: Vec<&str> = self.allowed.iter().map(String::as_str).collect();
        if let Some(host) = self.host_origin.as_deref() {
            if !origins.contains(&host) {
                origins.push(host);
            }
        }
        if origins.is_empty() {
            return "[window.location.origin]".to_string();
        }
        let items: Vec<String> = origins.into_iter().map(js_string).collect();
        format!("[{}]", items.join(", "))
    }
}

fn normalize(origin: &str) -> Result<String> {
    validate_origin(origin)?;
    Ok(origin.trim_end_matches('/').to_string())
}

/// JSON-escaped string literal, safe inside a `<script>` element
pub(crate) fn js_string(value: &str) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}
