//! Kit Config - top-level configuration
//!
//! One immutable structure with a fixed set of sections. Every loader
//! validates before returning, so an invalid combination never reaches
//! the stores that consume it.

use crate::cache::CacheConfig;
use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file name inside a [`JsonStore`]
pub const KIT_CONFIG_FILE: &str = "fragkit.json";

// ============================================================================
// KitConfig
// ============================================================================

/// Combined configuration for caches, state, events and the bridge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KitConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub events: EventLogConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl KitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendering always bypasses the cache; longer history for debugging
    pub fn development() -> Self {
        Self {
            cache: CacheConfig::disabled(),
            state: StateConfig {
                max_history: 200,
                ..Default::default()
            },
            events: EventLogConfig { max_events: 5000 },
            bridge: BridgeConfig::default(),
        }
    }

    /// Small footprint for tests and embedded hosts
    pub fn minimal() -> Self {
        Self {
            cache: CacheConfig::minimal(),
            state: StateConfig {
                max_history: 10,
                ..Default::default()
            },
            events: EventLogConfig { max_events: 100 },
            bridge: BridgeConfig::default(),
        }
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Parse TOML and validate
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load JSON from a store; a missing file yields validated defaults
    pub fn load_json(store: &JsonStore, filename: &str) -> Result<Self> {
        let config = store.load_optional::<Self>(filename)?.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn save_json(&self, store: &JsonStore, filename: &str) -> Result<()> {
        self.validate()?;
        store.save(filename, self)
    }

    // ========================================================================
    // Validation
    // ========================================================================

    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.state.validate()?;
        self.events.validate()?;
        self.bridge.validate()?;
        Ok(())
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.state.conflict_strategy = strategy;
        self
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.bridge.allowed_origins = origins;
        self
    }

    pub fn with_host_origin(mut self, origin: impl Into<String>) -> Self {
        self.bridge.host_origin = Some(origin.into());
        self
    }
}

// ============================================================================
// State
// ============================================================================

/// Policy for choosing a winner when a remote update races a local change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Remote update always replaces current
    ClientWins,
    /// Current state is kept, remote update discarded
    #[default]
    ServerWins,
    /// Later timestamp wins; ties go to the remote update
    LatestWins,
    /// Key union; local value wins on shared keys
    Merge,
    /// Caller-registered resolver
    Custom,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::ClientWins => "client_wins",
            ConflictStrategy::ServerWins => "server_wins",
            ConflictStrategy::LatestWins => "latest_wins",
            ConflictStrategy::Merge => "merge",
            ConflictStrategy::Custom => "custom",
        }
    }
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    /// Prior snapshots kept per component
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
}

fn default_max_history() -> usize {
    50
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            conflict_strategy: ConflictStrategy::default(),
        }
    }
}

impl StateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_history == 0 {
            return Err(Error::Config("state.max_history must be at least 1".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogConfig {
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

fn default_max_events() -> usize {
    1000
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
        }
    }
}

impl EventLogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_events == 0 {
            return Err(Error::Config("events.max_events must be at least 1".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// Origins the bridge accepts messages from and posts messages to.
/// Empty means same-origin only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Origin the host page is served from. Same-origin senders are only
    /// recognised when this is set; without it and with an empty allow-list
    /// every inbound origin is rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_origin: Option<String>,
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        for origin in &self.allowed_origins {
            validate_origin(origin)?;
        }
        if let Some(origin) = &self.host_origin {
            validate_origin(origin)?;
        }
        Ok(())
    }
}

/// Accept only `scheme://host[:port]` with no path, query or wildcard
pub fn validate_origin(origin: &str) -> Result<()> {
    if origin.contains('*') {
        return Err(Error::Config(format!(
            "Wildcard origin '{}' is not allowed",
            origin
        )));
    }

    let parsed = url::Url::parse(origin)
        .map_err(|e| Error::Config(format!("Invalid origin '{}': {}", origin, e)))?;

    if parsed.host_str().is_none() {
        return Err(Error::Config(format!("Origin '{}' has no host", origin)));
    }
    // Url::parse normalizes a bare origin to a "/" path
    let extra = parsed.path() != "/"
        || parsed.query().is_some()
        || parsed.fragment().is_some()
        || !parsed.username().is_empty()
        || origin.trim_end_matches('/') != parsed.origin().ascii_serialization();
    if extra {
        return Err(Error::Config(format!(
            "Origin '{}' must be scheme://host[:port]",
            origin
        )));
    }
    Ok(())
}
