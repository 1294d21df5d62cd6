//! User settings
//!
//! Settings are read-only from the measurement core's perspective, but the
//! recorder writes back the last saved position per modality. Values are read
//! on every access, never cached by callers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::PersistenceError;
use crate::export::{DecimalSeparator, ExportFormat};
use crate::reset::ResetBehavior;
use crate::types::{Modality, SliderPosition};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub reset_behavior: ResetBehavior,
    /// Last saved position per modality, used by `KeepPosition`
    pub last_positions: HashMap<Modality, SliderPosition>,
    pub export_format: ExportFormat,
    pub include_metadata: bool,
    pub decimal_separator: DecimalSeparator,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reset_behavior: ResetBehavior::default(),
            last_positions: HashMap::new(),
            export_format: ExportFormat::default(),
            include_metadata: true,
            decimal_separator: DecimalSeparator::default(),
        }
    }
}

/// Shared settings, optionally backed by a JSON file
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    data: RwLock<Settings>,
}

impl SettingsStore {
    /// Load settings from `path`; a missing or unreadable file yields defaults
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = if path.exists() {
            match fs::read_to_string(&path)
                .map_err(PersistenceError::from)
                .and_then(|contents| serde_json::from_str(&contents).map_err(PersistenceError::from))
            {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!(
                        "ignoring settings at {}: {}; using defaults",
                        path.display(),
                        e
                    );
                    Settings::default()
                }
            }
        } else {
            Settings::default()
        };

        Self {
            path: Some(path),
            data: RwLock::new(data),
        }
    }

    /// Settings that live only for this process
    pub fn in_memory() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            path: None,
            data: RwLock::new(settings),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Settings {
        self.read().clone()
    }

    pub fn reset_behavior(&self) -> ResetBehavior {
        self.read().reset_behavior
    }

    pub fn last_position(&self, modality: Modality) -> Option<SliderPosition> {
        self.read().last_positions.get(&modality).copied()
    }

    pub fn set_reset_behavior(&self, behavior: ResetBehavior) -> Result<(), PersistenceError> {
        self.update(|s| s.reset_behavior = behavior)
    }

    pub fn set_last_position(
        &self,
        modality: Modality,
        position: SliderPosition,
    ) -> Result<(), PersistenceError> {
        self.update(|s| {
            s.last_positions.insert(modality, position);
        })
    }

    /// Apply a change and persist it. On a failed write the change is reverted.
    pub fn update(&self, change: impl FnOnce(&mut Settings)) -> Result<(), PersistenceError> {
        let mut guard = self.write();
        let previous = (*guard).clone();
        change(&mut *guard);
        if let Err(e) = self.persist(&*guard) {
            *guard = previous;
            return Err(e);
        }
        Ok(())
    }

    fn persist(&self, data: &Settings) -> Result<(), PersistenceError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(path, serialized).map_err(|e| {
            PersistenceError::Settings(format!("failed to write {}: {}", path.display(), e))
        })
    }

    /// Re-read the backing file, replacing the in-memory settings
    pub fn reload(&self) -> Result<(), PersistenceError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let contents = fs::read_to_string(path)?;
        let data: Settings = serde_json::from_str(&contents)?;
        *self.write() = data;
        Ok(())
    }
}
