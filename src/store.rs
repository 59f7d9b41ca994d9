//! Persistent key-value storage backing settings, transforms, and history.
//!
//! Two scopes mirror the two lifetimes the rest of the app cares about:
//! `Sync` holds user configuration that would roam with the user
//! (settings, transforms, the API key fallback), `Local` holds per-machine
//! state (current transform, history, the request debounce marker).
//! Each scope is a flat JSON object in one file under the platform config
//! directory, rewritten atomically on every `set`.

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const SYNC_STORE_FILE: &str = "settings.json";
pub const LOCAL_STORE_FILE: &str = "state.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Sync,
    Local,
}

impl Scope {
    fn file_name(self) -> &'static str {
        match self {
            Scope::Sync => SYNC_STORE_FILE,
            Scope::Local => LOCAL_STORE_FILE,
        }
    }
}

pub struct Store {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl Store {
    /// Opens a store scope rooted at `dir`, reading the existing file if any.
    /// A corrupt file is logged and replaced with an empty store rather than
    /// failing startup.
    pub fn open(dir: &Path, scope: Scope) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating config directory {}", dir.display()))?;
        let path = dir.join(scope.file_name());

        let values = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Discarding unreadable store {}: {}", path.display(), e);
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };

        debug!("Opened store {} ({} keys)", path.display(), values.len());
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        let value = values.get(key)?.clone();
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Failed to decode store key '{}': {}", key, e);
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_value(value)
            .with_context(|| format!("encoding store key '{}'", key))?;
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), encoded);
        self.persist(&values)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.contains_key(key)
    }

    // Write-then-rename so a crash mid-write never truncates the store.
    fn persist(&self, values: &Map<String, Value>) -> Result<()> {
        let raw = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| anyhow!("replacing {}: {}", self.path.display(), e))
    }
}

/// Both scopes, opened together at startup.
pub struct Stores {
    pub sync: Store,
    pub local: Store,
}

impl Stores {
    pub fn open(dir: &Path) -> Result<Self> {
        Ok(Self {
            sync: Store::open(dir, Scope::Sync)?,
            local: Store::open(dir, Scope::Local)?,
        })
    }
}

/// Default config directory: `<platform config dir>/retext`.
pub fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("retext"))
        .ok_or_else(|| anyhow!("no config directory available on this platform"))
}
