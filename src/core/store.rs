//! Persistent key/value preference storage

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::core::errors::{Result, TranslationError};
use crate::core::lock_utils::{read_recover, write_recover};

/// Key/value storage the engine reads its configuration from and writes
/// model switches and catalog caches back to.
///
/// Writers are serialized behind the implementation's lock; the last write wins.
pub trait PreferenceStore: Send + Sync {
    /// Read a raw value
    fn get(&self, key: &str) -> Option<String>;

    /// Write a raw value
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Read a string, falling back to `default` when unset
    fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Read a boolean stored as `true`/`false`
    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                other => {
                    warn!("Failed to parse bool preference {}: {}", key, other);
                    default
                }
            },
            None => default,
        }
    }

    /// Read an integer stored as a string; unparsable values yield `default`
    fn get_u64(&self, key: &str, default: u64) -> u64 {
        match self.get(key) {
            Some(value) if !value.trim().is_empty() => match value.trim().parse::<u64>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    warn!("Failed to parse int preference {}: {}", key, value);
                    default
                }
            },
            _ => default,
        }
    }
}

/// Volatile store, used by tests and one-shot CLI sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-filled with `pairs`
    pub fn with_values<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        read_recover(&self.values, "memory_store").get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        write_recover(&self.values, "memory_store").insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        write_recover(&self.values, "memory_store").remove(key);
        Ok(())
    }
}

/// Store backed by a pretty-printed JSON object on disk
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };

        debug!("Opened preference store {} ({} keys)", path.display(), values.len());

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    /// `<config_dir>/lingua-dispatch/preferences.json`
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| TranslationError::Storage {
            message: "Failed to determine config directory".to_string(),
        })?;
        Ok(dir.join("lingua-dispatch").join("preferences.json"))
    }

    /// Open the store at [`JsonFileStore::default_path`]
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl PreferenceStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        read_recover(&self.values, "json_file_store").get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut values = write_recover(&self.values, "json_file_store");
        let mut updated = values.clone();
        updated.insert(key.to_string(), value.to_string());
        self.flush(&updated)?;
        *values = updated;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = write_recover(&self.values, "json_file_store");
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut updated = values.clone();
        updated.remove(key);
        self.flush(&updated)?;
        *values = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_typed_reads() {
        let store = MemoryStore::with_values([
            ("flag", "true"),
            ("count", " 5 "),
            ("broken", "five"),
        ]);

        assert!(store.get_bool("flag", false));
        assert!(!store.get_bool("missing", false));
        assert_eq!(store.get_u64("count", 1), 5);
        assert_eq!(store.get_u64("broken", 2), 2);
        assert_eq!(store.get_string("missing", "fallback"), "fallback");
    }

    #[test]
    fn test_json_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.put("claude_model_name", "claude-3-sonnet-20240229").unwrap();
            store.put("temp", "x").unwrap();
            store.remove("temp").unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("claude_model_name").as_deref(),
            Some("claude-3-sonnet-20240229")
        );
        assert_eq!(reopened.get("temp"), None);
    }

    #[test]
    fn test_json_file_store_failed_write_keeps_memory() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("nested");
        let store = JsonFileStore::open(parent.join("prefs.json")).unwrap();
        store.put("kept", "1").unwrap();

        std::fs::remove_dir_all(&parent).unwrap();
        std::fs::write(&parent, "not a directory").unwrap();

        assert!(store.put("added", "2").is_err());
        assert_eq!(store.get("added"), None);
        assert!(store.remove("kept").is_err());
        assert_eq!(store.get("kept").as_deref(), Some("1"));
    }

    #[test]
    fn test_json_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            JsonFileStore::open(&path),
            Err(TranslationError::Storage { .. })
        ));
    }
}
