//! JSON file store

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

/// Directory name used under the user config dir and inside projects
pub const STORE_DIR_NAME: &str = "fragkit";

/// Directory-scoped JSON file store
///
/// Used for configuration files and persisted state snapshots.
#[derive(Debug, Clone)]
pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Per-user store (`<config dir>/fragkit/`)
    pub fn global() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Cannot find config directory".to_string()))?
            .join(STORE_DIR_NAME);
        Ok(Self::new(dir))
    }

    /// Per-project store (`<root>/.fragkit/`)
    pub fn project(root: impl Into<PathBuf>) -> Self {
        Self::new(root.into().join(format!(".{}", STORE_DIR_NAME)))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            std::fs::create_dir_all(&self.base_dir)?;
        }
        Ok(())
    }

    /// Read a file as raw text
    pub fn load_raw(&self, filename: &str) -> Result<String> {
        let path = self.file_path(filename);
        std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))
    }

    /// Load and deserialize a JSON file
    pub fn load<T: DeserializeOwned>(&self, filename: &str) -> Result<T> {
        let content = self.load_raw(filename)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load, falling back to `T::default()` when missing or malformed
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, filename: &str) -> T {
        match self.load(filename) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("Using defaults for {}: {}", filename, e);
                T::default()
            }
        }
    }

    /// Load if the file exists
    pub fn load_optional<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        if !self.exists(filename) {
            return Ok(None);
        }
        self.load(filename).map(Some)
    }

    /// Serialize as pretty JSON and write
    pub fn save<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(data)?;
        self.save_raw(filename, &content)
    }

    /// Write raw text, creating the directory if needed
    pub fn save_raw(&self, filename: &str, content: &str) -> Result<()> {
        self.ensure_dir()?;
        let path = self.file_path(filename);
        std::fs::write(&path, content)
            .map_err(|e| Error::Config(format!("Failed to write {}: {}", path.display(), e)))
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.file_path(filename).exists()
    }

    /// Remove a file; missing files are not an error
    pub fn remove(&self, filename: &str) -> Result<()> {
        let path = self.file_path(filename);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path().join("nested"));
        let sample = Sample {
            name: "grid".into(),
            count: 3,
        };

        store.save("sample.json", &sample).unwrap();
        assert!(store.exists("sample.json"));
        assert_eq!(store.load::<Sample>("sample.json").unwrap(), sample);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path());

        assert!(store.load_optional::<Sample>("none.json").unwrap().is_none());
        assert_eq!(store.load_or_default::<Sample>("none.json"), Sample::default());
        assert!(store.remove("none.json").is_ok());
    }

    #[test]
    fn test_malformed_json() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path());
        store.save_raw("bad.json", "{ not json").unwrap();

        assert!(matches!(store.load::<Sample>("bad.json"), Err(Error::Json(_))));
    }

    #[test]
    fn test_project_dir() {
        let store = JsonStore::project("/work/app");
        assert_eq!(store.base_dir(), Path::new("/work/app/.fragkit"));
    }
}
