//! Render cache configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Error, Result};

/// Render cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// Cache renders by default (a request can still opt out)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Byte budget for all cached artifacts
    #[serde(default = "default_budget_bytes")]
    pub budget_bytes: usize,

    /// Default time-to-live for entries (seconds, `None` = no expiry)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_ttl_secs: Option<u64>,

    /// Optional bound on entry count in addition to the byte budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            budget_bytes: default_budget_bytes(),
            default_ttl_secs: None,
            max_entries: None,
        }
    }
}

impl CacheConfig {
    /// Small footprint for constrained hosts
    pub fn minimal() -> Self {
        Self {
            budget_bytes: 4 * 1024 * 1024,
            max_entries: Some(256),
            ..Default::default()
        }
    }

    /// Caching off; every render goes to the template engine
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn with_budget_mb(mut self, megabytes: usize) -> Self {
        self.budget_bytes = megabytes * 1024 * 1024;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_secs = Some(ttl.as_secs());
        self
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.budget_bytes == 0 {
            return Err(Error::Config("cache.budget_bytes must be greater than 0".into()));
        }
        if self.max_entries == Some(0) {
            return Err(Error::Config("cache.max_entries must be greater than 0".into()));
        }
        if self.default_ttl_secs == Some(0) {
            return Err(Error::Config(
                "cache.default_ttl_secs must be greater than 0 (omit it to disable expiry)".into(),
            ));
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}

fn default_budget_bytes() -> usize {
    50 * 1024 * 1024
} // 50MB
