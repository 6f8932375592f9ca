//! Error types for fragkit
//!
//! Every fallible operation in the workspace returns [`Error`]. Variants carry
//! enough context (component, path, version) for a host to build richer
//! diagnostics without re-deriving it.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by caller-supplied code (render functions, callbacks)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// fragkit error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Content addressing
    // ========================================================================
    /// A parameter value has no canonical form (live handles, sockets, ...)
    #[error("Unsupported parameter type '{type_name}' at {path}")]
    UnsupportedType { path: String, type_name: String },

    /// A dependency file could not be read while fingerprinting
    #[error("Cannot read dependency file {}: {source}", path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ========================================================================
    // State
    // ========================================================================
    #[error("Component has no state: {0}")]
    ComponentNotFound(String),

    /// Requested version fell out of the bounded history window
    #[error("Version {version} of '{component}' is not in history")]
    VersionNotFound { component: String, version: u64 },

    #[error("Custom conflict strategy selected for '{component}' but no resolver is registered")]
    NoResolverConfigured { component: String },

    // ========================================================================
    // Bridge
    // ========================================================================
    #[error("Origin not allowed: {origin}")]
    OriginNotAllowed { origin: String },

    #[error("Callback for {component}:{event_type} failed: {source}")]
    Callback {
        component: String,
        event_type: String,
        #[source]
        source: BoxError,
    },

    // ========================================================================
    // Rendering
    // ========================================================================
    #[error("Rendering '{component}' failed: {source}")]
    Render {
        component: String,
        #[source]
        source: BoxError,
    },

    // ========================================================================
    // General
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // External conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Errors a host can show verbatim to the person using the app
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::OriginNotAllowed { .. }
                | Error::VersionNotFound { .. }
                | Error::ComponentNotFound(_)
                | Error::InvalidInput(_)
        )
    }

    /// Misconfiguration that will fail again until the setup changes
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::NoResolverConfigured { .. } | Error::Toml(_)
        )
    }

    /// Component the error refers to, if any
    pub fn component(&self) -> Option<&str> {
        match self {
            Error::ComponentNotFound(name) => Some(name),
            Error::VersionNotFound { component, .. }
            | Error::NoResolverConfigured { component }
            | Error::Callback { component, .. }
            | Error::Render { component, .. } => Some(component),
            _ => None,
        }
    }

    pub fn unsupported_type(path: impl Into<String>, type_name: impl Into<String>) -> Self {
        Error::UnsupportedType {
            path: path.into(),
            type_name: type_name.into(),
        }
    }

    pub fn file_unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::FileUnreadable {
            path: path.into(),
            source,
        }
    }

    pub fn render(component: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Render {
            component: component.into(),
            source: source.into(),
        }
    }

    pub fn callback(
        component: impl Into<String>,
        event_type: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Error::Callback {
            component: component.into(),
            event_type: event_type.into(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_context() {
        let err = Error::VersionNotFound {
            component: "editor".into(),
            version: 2,
        };
        assert_eq!(err.component(), Some("editor"));
        assert!(err.is_user_facing());
        assert!(err.to_string().contains("Version 2"));
    }

    #[test]
    fn test_callback_from_anyhow() {
        let err = Error::callback("btn", "click", anyhow::anyhow!("boom"));
        assert!(err.to_string().contains("btn:click"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_config_classification() {
        let err = Error::NoResolverConfigured {
            component: "form".into(),
        };
        assert!(err.is_config_error());
        assert!(!err.is_user_facing());
    }
}
