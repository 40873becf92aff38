//! Persisted state: the signed-in session and user settings.
//!
//! Both stores are plain files under the platform data/config directories.
//! A session is written wholesale on sign-in and removed on sign-out; there
//! is never more than one.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::probe::{EndpointMap, ProbeRecord};
use crate::error::{DashError, Result};

const APP_DIR: &str = "screepsdash";

/// Everything a signed-in session needs to serve the dashboard without
/// re-probing: credentials plus the endpoint map the probe resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub base_url: String,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub endpoints: EndpointMap,
    #[serde(default)]
    pub probe_log: Vec<ProbeRecord>,
    pub verified_at: DateTime<Utc>,
}

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn open_default() -> Result<Self> {
        let dir = dirs::data_dir()
            .ok_or_else(|| DashError::Store("no data directory on this platform".to_string()))?;
        Ok(Self::at(dir.join(APP_DIR).join("session.json")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored session, if any. A corrupt file is treated as
    /// signed out, not as a fatal error.
    pub fn load(&self) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&text) {
            Ok(session) => Ok(Some(session)),
            Err(error) => {
                warn!("session file unreadable, ignoring it: {}", error);
                Ok(None)
            }
        }
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, text)?;
        debug!("session saved to {}", self.path.display());
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_room_limit() -> usize {
    crate::api::extract::ROOM_CAP
}

/// User-tunable settings. Unknown keys in the file are ignored so older
/// builds can read newer files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    /// Route requests through the in-memory response cache.
    pub request_cache: bool,
    pub default_shard: Option<String>,
    pub room_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_cache: default_true(),
            default_shard: None,
            room_limit: default_room_limit(),
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn open_default() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| DashError::Store("no config directory on this platform".to_string()))?;
        Ok(Self::at(dir.join(APP_DIR).join("settings.toml")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load settings, falling back to defaults when the file is missing
    /// or unreadable.
    pub fn load(&self) -> Settings {
        let Ok(text) = fs::read_to_string(&self.path) else {
            return Settings::default();
        };
        match toml::from_str(&text) {
            Ok(settings) => settings,
            Err(error) => {
                warn!("settings file unreadable, using defaults: {}", error);
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(settings)
            .map_err(|error| DashError::Store(error.to_string()))?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}
