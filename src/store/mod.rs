//! Mapping persistence and lookup.
//!
//! Mappings live in a plain text file under the platform config dir, one
//! canonical mapping string per line; blank lines and `#` comments are
//! tolerated on load. The in-memory store answers lookups by device GUID
//! with checksum-aware priority: an exact GUID+CRC match wins over a
//! CRC-less match for the same device, which wins over the `*` wildcard.
//!
//! Loading follows a fail-safe philosophy: a missing file is an empty
//! store, a malformed line is logged and skipped, and broken settings
//! degrade to defaults rather than preventing startup.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::calibration::SessionSettings;
use crate::mapping::parts::{guid_crc, strip_guid_crc};
use crate::mapping::MappingParts;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed mapping line: {0}")]
    MalformedMapping(String),

    #[error("No configuration directory available")]
    NoConfigDir,

    #[error("Invalid settings file: {0}")]
    InvalidSettings(#[from] toml::de::Error),

    #[error("Failed to encode settings: {0}")]
    SettingsEncode(#[from] toml::ser::Error),
}

/// One stored mapping line with its precomputed lookup identity.
#[derive(Debug, Clone)]
struct StoredMapping {
    /// GUID with the checksum field cleared.
    guid: String,
    /// Device checksum, from the `crc:` entry or the GUID itself; 0 when
    /// the mapping applies to every revision.
    crc: u16,
    line: String,
}

/// In-memory database of mapping strings, keyed by device GUID.
#[derive(Debug, Default)]
pub struct MappingStore {
    entries: Vec<StoredMapping>,
}

impl MappingStore {
    /// Reads a mapping file. A missing file yields an empty store;
    /// malformed lines are skipped with a warning.
    pub fn load(path: &Path) -> Result<MappingStore, StoreError> {
        let mut store = MappingStore::default();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No mapping file at {}", path.display());
                return Ok(store);
            }
            Err(e) => return Err(e.into()),
        };

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Err(e) = store.add(line) {
                warn!("Skipping mapping line: {}", e);
            }
        }
        info!(
            "Loaded {} mappings from {}",
            store.entries.len(),
            path.display()
        );
        Ok(store)
    }

    /// Writes every stored mapping back out, one per line.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut text = String::new();
        for entry in &self.entries {
            text.push_str(&entry.line);
            text.push('\n');
        }
        fs::write(path, text)?;
        info!("Saved {} mappings to {}", self.entries.len(), path.display());
        Ok(())
    }

    /// Adds a mapping line, replacing any existing entry for the same
    /// GUID and checksum. A line without a GUID is rejected.
    pub fn add(&mut self, line: &str) -> Result<(), StoreError> {
        let parts = MappingParts::parse(line);
        if parts.guid.is_empty() {
            return Err(StoreError::MalformedMapping(line.to_string()));
        }

        let crc = match parts.get_value("crc") {
            Some(value) => u16::from_str_radix(value, 16).unwrap_or(0),
            None => guid_crc(&parts.guid),
        };
        let entry = StoredMapping {
            guid: strip_guid_crc(&parts.guid),
            crc,
            line: line.to_string(),
        };

        match self
            .entries
            .iter_mut()
            .find(|existing| existing.guid == entry.guid && existing.crc == entry.crc)
        {
            Some(existing) => {
                debug!("Replacing mapping for {}", entry.guid);
                *existing = entry;
            }
            None => self.entries.push(entry),
        }
        Ok(())
    }

    /// Finds the best mapping line for a device GUID (checksum field
    /// included): exact GUID+CRC first, then the device ignoring its
    /// revision checksum, then the wildcard.
    pub fn lookup(&self, device_guid: &str) -> Option<&str> {
        let crc = guid_crc(device_guid);
        let guid = strip_guid_crc(device_guid);

        if crc != 0 {
            if let Some(entry) = self
                .entries
                .iter()
                .find(|entry| entry.guid == guid && entry.crc == crc)
            {
                return Some(&entry.line);
            }
        }
        if let Some(entry) = self
            .entries
            .iter()
            .find(|entry| entry.guid == guid && entry.crc == 0)
        {
            return Some(&entry.line);
        }
        self.entries
            .iter()
            .find(|entry| entry.guid == "*")
            .map(|entry| entry.line.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored mapping lines in insertion order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.line.as_str())
    }
}

/// Persisted application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub calibration: SessionSettings,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Settings, StoreError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Loads settings, degrading to defaults when the file is missing or
    /// broken.
    pub fn load_or_default(path: &Path) -> Settings {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Settings::default()
            }
            Err(e) => {
                warn!("Falling back to default settings: {}", e);
                Settings::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Application config directory under the platform convention.
pub fn config_dir() -> Result<PathBuf, StoreError> {
    dirs::config_dir()
        .map(|dir| dir.join("padmap"))
        .ok_or(StoreError::NoConfigDir)
}

pub fn mappings_path() -> Result<PathBuf, StoreError> {
    Ok(config_dir()?.join("mappings.txt"))
}

pub fn settings_path() -> Result<PathBuf, StoreError> {
    Ok(config_dir()?.join("settings.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_replaces_same_device_entries() {
        let mut store = MappingStore::default();
        store
            .add("03000000deadbeef0000000000000000,Pad,a:b0,")
            .unwrap();
        store
            .add("03000000deadbeef0000000000000000,Pad,a:b5,")
            .unwrap();
        assert_eq!(store.len(), 1);
        assert!(store
            .lookup("03000000deadbeef0000000000000000")
            .unwrap()
            .contains("a:b5"));
    }

    #[test]
    fn lines_without_a_guid_are_rejected() {
        let mut store = MappingStore::default();
        assert!(matches!(
            store.add(""),
            Err(StoreError::MalformedMapping(_))
        ));
    }

    #[test]
    fn lookup_prefers_matching_checksum() {
        let mut store = MappingStore::default();
        store
            .add("03000000deadbeef0000000000000000,Generic,a:b0,")
            .unwrap();
        store
            .add("03000000deadbeef0000000000000000,Rev2,a:b1,crc:b2a1,")
            .unwrap();
        store.add("*,Fallback,a:b9,").unwrap();

        // Device reporting checksum a1/b2 embedded in its GUID.
        let exact = store.lookup("0300a1b2deadbeef0000000000000000").unwrap();
        assert!(exact.contains("Rev2"));

        // Different revision: falls back to the CRC-less entry.
        let other = store.lookup("0300ffffdeadbeef0000000000000000").unwrap();
        assert!(other.contains("Generic"));

        // Unknown device: wildcard.
        let unknown = store.lookup("03000000aaaaaaaa0000000000000000").unwrap();
        assert!(unknown.contains("Fallback"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.txt");

        let mut store = MappingStore::default();
        store
            .add("03000000deadbeef0000000000000000,Pad,a:b0,dpup:h0.1,")
            .unwrap();
        store.add("*,Fallback,a:b9,").unwrap();
        store.save(&path).unwrap();

        let reloaded = MappingStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            reloaded.lines().collect::<Vec<_>>(),
            store.lines().collect::<Vec<_>>()
        );
    }

    #[test]
    fn load_skips_comments_and_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.txt");
        fs::write(
            &path,
            "# pads\n\n03000000deadbeef0000000000000000,Pad,a:b0,\n",
        )
        .unwrap();

        let store = MappingStore::load(&path).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MappingStore::load(&dir.path().join("absent.txt")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn settings_degrade_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        let missing = Settings::load_or_default(&path);
        assert_eq!(missing.calibration.debounce_ms, 30);

        fs::write(&path, "not toml at all [").unwrap();
        let broken = Settings::load_or_default(&path);
        assert_eq!(broken.calibration.excursion_threshold, 16000);
    }

    #[test]
    fn settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        let mut settings = Settings::default();
        settings.calibration.bind_touchpad = true;
        settings.calibration.debounce_ms = 45;
        settings.save(&path).unwrap();

        let reloaded = Settings::load_or_default(&path);
        assert!(reloaded.calibration.bind_touchpad);
        assert_eq!(reloaded.calibration.debounce_ms, 45);
    }
}
