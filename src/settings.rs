use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::messages::DEFAULT_DIALING_CODE;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WalkDefaults {
    pub walk_minutes: u64,
    pub check_in_minutes: u64,
    /// Grace window after a missed check-in. `None` means "same as the
    /// check-in interval".
    pub grace_minutes: Option<u64>,
}

impl Default for WalkDefaults {
    fn default() -> Self {
        Self {
            walk_minutes: 30,
            check_in_minutes: 5,
            grace_minutes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlarmSettings {
    pub enabled: bool,
    pub volume: f32,
}

impl Default for AlarmSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserSettings {
    pub emergency_contact: Option<String>,
    pub dialing_code: String,
    pub walk: WalkDefaults,
    pub alarm: AlarmSettings,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            emergency_contact: None,
            dialing_code: DEFAULT_DIALING_CODE.into(),
            walk: WalkDefaults::default(),
            alarm: AlarmSettings::default(),
        }
    }
}

/// JSON-backed user settings, cached in memory and written through on update.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {}", path.display(), err);
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn snapshot(&self) -> UserSettings {
        self.read().clone()
    }

    pub fn emergency_contact(&self) -> Option<String> {
        self.read()
            .emergency_contact
            .clone()
            .filter(|contact| !contact.trim().is_empty())
    }

    pub fn set_emergency_contact(&self, contact: Option<String>) -> Result<()> {
        let mut guard = self.write();
        guard.emergency_contact = contact
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        self.persist(&guard)
    }

    pub fn update(&self, settings: UserSettings) -> Result<()> {
        let mut guard = self.write();
        *guard = settings;
        self.persist(&guard)
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
