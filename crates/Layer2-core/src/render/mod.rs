//! RenderCache - cached rendering around an external template engine
//!
//! ```text
//! RenderRequest ─▶ fingerprint(component, params, files)
//!                        │
//!                        ▼
//!                 EvictionStore::get ──hit──▶ cached text
//!                        │ miss
//!                        ▼
//!                 render_fn(component, params) ──▶ put ──▶ text
//! ```
//!
//! Fingerprinting reads dependency files before any lock is taken. A failed
//! render is returned as [`Error::Render`] and nothing is cached.

use fragkit_foundation::cache::{fingerprint, CacheConfig, EvictionStore, EvictionStoreStats};
use fragkit_foundation::{BoxError, Error, Fingerprint, ParamValue, Params, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

// ============================================================================
// Request / Result
// ============================================================================

/// One render call
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub component: String,
    pub params: Params,
    /// Template, style and script files, in a fixed order
    pub files: Vec<PathBuf>,
    /// Per-call caching flag (`None` = the cache's default)
    pub cache: Option<bool>,
    /// Overrides the cache's default TTL
    pub ttl: Option<Duration>,
}

impl RenderRequest {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            params: Params::new(),
            files: Vec::new(),
            cache: None,
            ttl: None,
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    pub fn with_files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.files.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Turn caching on or off for this call
    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = Some(enabled);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Output of [`RenderCache::render`]
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub text: Arc<str>,
    /// `None` when the call bypassed the cache
    pub fingerprint: Option<Fingerprint>,
    pub from_cache: bool,
}

// ============================================================================
// RenderCache
// ============================================================================

#[derive(Debug, Clone)]
pub struct RenderCache {
    store: Arc<EvictionStore>,
    enabled: bool,
}

impl RenderCache {
    /// Fails with [`Error::Config`] when the cache config does not validate
    pub fn new(config: CacheConfig) -> Result<Self> {
        let enabled = config.enabled;
        Ok(Self {
            store: Arc::new(EvictionStore::new(config)?),
            enabled,
        })
    }

    /// Share an existing store (e.g. across sessions)
    pub fn with_store(store: Arc<EvictionStore>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    pub fn store(&self) -> &Arc<EvictionStore> {
        &self.store
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Render through the cache (or around it when the request opts out)
    pub fn render<F, E>(&self, request: &RenderRequest, render_fn: F) -> Result<Rendered>
    where
        F: FnOnce(&str, &Params) -> std::result::Result<String, E>,
        E: Into<BoxError>,
    {
        let component = request.component.as_str();

        if !request.cache.unwrap_or(self.enabled) {
            trace!(component = %component, "Cache bypassed");
            let text =
                render_fn(component, &request.params).map_err(|e| Error::render(component, e))?;
            return Ok(Rendered {
                text: text.into(),
                fingerprint: None,
                from_cache: false,
            });
        }

        let key = fingerprint(component, &request.params, &request.files)?;

        if let Some(text) = self.store.get(&key) {
            debug!(component = %component, fingerprint = %key, "Render cache hit");
            return Ok(Rendered {
                text,
                fingerprint: Some(key),
                from_cache: true,
            });
        }

        debug!(component = %component, fingerprint = %key, "Render cache miss");
        let text: Arc<str> = render_fn(component, &request.params)
            .map_err(|e| Error::render(component, e))?
            .into();
        self.store
            .put(key.clone(), Arc::clone(&text), component, request.ttl);

        Ok(Rendered {
            text,
            fingerprint: Some(key),
            from_cache: false,
        })
    }

    /// Caching-on shorthand returning only the text
    pub fn render_cached<F, E>(
        &self,
        component: &str,
        params: &Params,
        files: &[PathBuf],
        render_fn: F,
    ) -> Result<Arc<str>>
    where
        F: FnOnce(&str, &Params) -> std::result::Result<String, E>,
        E: Into<BoxError>,
    {
        let request = RenderRequest::new(component)
            .with_params(params.clone())
            .with_files(files.iter().cloned())
            .cache(true);
        Ok(self.render(&request, render_fn)?.text)
    }

    /// Drop one component's entries, or everything when `component` is `None`
    pub fn invalidate(&self, component: Option<&str>) -> usize {
        match component {
            Some(name) => self.invalidate_component(name),
            None => {
                let count = self.store.len();
                self.store.invalidate_all();
                count
            }
        }
    }

    pub fn invalidate_component(&self, component: &str) -> usize {
        self.store.invalidate_component(component)
    }

    pub fn invalidate_all(&self) {
        self.store.invalidate_all();
    }

    pub fn stats(&self) -> EvictionStoreStats {
        self.store.stats()
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        Self {
            store: Arc::new(EvictionStore::default()),
            enabled: CacheConfig::default().enabled,
        }
    }
}
