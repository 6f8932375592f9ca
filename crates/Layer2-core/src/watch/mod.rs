//! Dependency watcher - invalidates cached renders when their files change
//!
//! Polling based. Each [`poll`](DependencyWatcher::poll) re-hashes every
//! registered file without holding any lock, compares against the digest
//! seen last time and invalidates each affected component once.

use crate::render::RenderCache;
use fragkit_foundation::cache::{fingerprint_file, ContentDigest};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// One file change attributed to one component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub component: String,
    pub path: PathBuf,
    pub kind: ChangeKind,
}

pub struct DependencyWatcher {
    cache: RenderCache,
    /// component -> ordered dependency files
    registrations: RwLock<BTreeMap<String, Vec<PathBuf>>>,
    /// last digest per file (`None` = missing)
    digests: Mutex<HashMap<PathBuf, Option<ContentDigest>>>,
}

impl std::fmt::Debug for DependencyWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyWatcher")
            .field("components", &self.registrations.read().len())
            .finish()
    }
}

/// What one hashing pass saw for a file
#[derive(Debug, Clone, PartialEq, Eq)]
enum FileState {
    Present(ContentDigest),
    Missing,
    /// Exists but could not be read; keeps the previous digest
    Unreadable,
}

fn digest_of(path: &Path) -> FileState {
    match fingerprint_file(path) {
        Ok(digest) => FileState::Present(digest),
        Err(_) if !path.exists() => FileState::Missing,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Dependency unreadable, skipping");
            FileState::Unreadable
        }
    }
}

impl FileState {
    fn into_digest(self) -> Option<ContentDigest> {
        match self {
            FileState::Present(digest) => Some(digest),
            FileState::Missing | FileState::Unreadable => None,
        }
    }
}

impl DependencyWatcher {
    pub fn new(cache: RenderCache) -> Self {
        Self {
            cache,
            registrations: RwLock::new(BTreeMap::new()),
            digests: Mutex::new(HashMap::new()),
        }
    }

    /// Watch `files` for `component`, replacing any earlier registration.
    /// Current contents become the baseline.
    pub fn register<I, P>(&self, component: &str, files: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let files: Vec<PathBuf> = files.into_iter().map(Into::into).collect();
        let baseline: Vec<(PathBuf, Option<ContentDigest>)> = files
            .iter()
            .map(|path| (path.clone(), digest_of(path).into_digest()))
            .collect();

        {
            let mut digests = self.digests.lock();
            for (path, digest) in baseline {
                digests.entry(path).or_insert(digest);
            }
        }
        debug!(component = %component, files = files.len(), "Watching dependencies");
        self.registrations.write().insert(component.to_string(), files);
    }

    pub fn unregister(&self, component: &str) -> bool {
        let removed = self.registrations.write().remove(component).is_some();
        if removed {
            let still_watched: BTreeSet<PathBuf> = self
                .registrations
                .read()
                .values()
                .flatten()
                .cloned()
                .collect();
            self.digests.lock().retain(|path, _| still_watched.contains(path));
        }
        removed
    }

    pub fn components(&self) -> Vec<String> {
        self.registrations.read().keys().cloned().collect()
    }

    /// Check every watched file once
    pub fn poll(&self) -> Vec<FileChange> {
        let registrations = self.registrations.read().clone();
        let paths: BTreeSet<&PathBuf> = registrations.values().flatten().collect();

        // Hash outside any lock
        let current: Vec<(PathBuf, FileState)> = paths
            .into_iter()
            .map(|path| (path.clone(), digest_of(path)))
            .collect();

        let mut changed: HashMap<PathBuf, ChangeKind> = HashMap::new();
        {
            let mut digests = self.digests.lock();
            for (path, state) in current {
                if state == FileState::Unreadable {
                    continue;
                }
                let digest = state.into_digest();
                let previous = digests.insert(path.clone(), digest.clone()).flatten();
                let kind = match (previous, digest) {
                    (None, Some(_)) => ChangeKind::Created,
                    (Some(_), None) => ChangeKind::Removed,
                    (Some(old), Some(new)) if old != new => ChangeKind::Modified,
                    _ => continue,
                };
                changed.insert(path, kind);
            }
        }

        let mut changes = Vec::new();
        for (component, files) in &registrations {
            let before = changes.len();
            for path in files {
                if let Some(kind) = changed.get(path) {
                    changes.push(FileChange {
                        component: component.clone(),
                        path: path.clone(),
                        kind: *kind,
                    });
                }
            }
            if changes.len() > before {
                let dropped = self.cache.invalidate_component(component);
                info!(
                    component = %component,
                    files_changed = changes.len() - before,
                    entries_dropped = dropped,
                    "Dependencies changed, cache invalidated"
                );
            }
        }
        changes
    }

    /// Run [`poll`](Self::poll) every `interval` on the tokio runtime
    pub fn spawn(self: Arc<Self>, interval: Duration) -> WatcherHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let changes = self.poll();
                        if !changes.is_empty() {
                            debug!("Watcher cycle: {} change(s)", changes.len());
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
        });
        WatcherHandle {
            stop: Some(stop_tx),
            handle,
        }
    }
}

/// Handle to a running watcher loop
#[derive(Debug)]
pub struct WatcherHandle {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl WatcherHandle {
    /// Signal the loop to end and wait for it
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = (&mut self.handle).await;
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        if self.stop.is_some() {
            self.handle.abort();
        }
    }
}
