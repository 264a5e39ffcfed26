//! Named key/value persistence, abstracted behind a trait so swapping
//! backends never perturbs `elm`'s command semantics (spec.md §4.I).
//!
//! Ported from `original_source/settings.h`'s `SettingsRepository`
//! (a `LittleFS`-backed singleton in the original). Gated to `std`
//! because both provided implementations — an in-memory map for tests
//! and hosts with no filesystem, and a one-file-per-key repository —
//! lean on `String`/`HashMap`/`std::fs`.

use thiserror::Error;

/// Storage failures surface to the command interpreter as `!ERROR`
/// (spec.md §7); this type exists so the boundary between "couldn't
/// persist" and "persisted fine" is a real `Result`, not a sentinel int
/// like the original's `read`/`write` returning `-1`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("settings key not found")]
    NotFound,
    #[error("settings backend unavailable")]
    Unavailable,
    #[error("short read or write")]
    ShortIo,
}

/// Key/value repository contract. `name` is a short ASCII slot name
/// (`elm-0A`, `elm-tz`, ...); `value` is the opaque line-delimited
/// `KEY=VALUE` blob `elm::Config::serialize` produces, or a single
/// string like a POSIX TZ name.
pub trait Settings {
    fn read(&self, name: &str) -> Result<String, SettingsError>;
    fn write(&mut self, name: &str, value: &str) -> Result<usize, SettingsError>;
}

/// In-memory repository: used by tests, and by hosts built without a
/// filesystem. Never fails except `NotFound`.
#[derive(Debug, Default, Clone)]
pub struct InMemorySettings {
    entries: std::collections::HashMap<String, String>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Settings for InMemorySettings {
    fn read(&self, name: &str) -> Result<String, SettingsError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or(SettingsError::NotFound)
    }

    fn write(&mut self, name: &str, value: &str) -> Result<usize, SettingsError> {
        self.entries.insert(name.to_string(), value.to_string());
        Ok(value.len())
    }
}

/// One file per key under a fixed root directory, created on first use —
/// the Rust-shaped equivalent of the original's `LittleFS`-backed
/// repository (`SETTINGS_PATH` / `elm-<hex>` files).
#[derive(Debug, Clone)]
pub struct FsSettings {
    root: std::path::PathBuf,
}

impl FsSettings {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        FsSettings { root: root.into() }
    }

    fn path_for(&self, name: &str) -> std::path::PathBuf {
        self.root.join(name)
    }
}

impl Settings for FsSettings {
    fn read(&self, name: &str) -> Result<String, SettingsError> {
        std::fs::read_to_string(self.path_for(name)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SettingsError::NotFound
            } else {
                SettingsError::Unavailable
            }
        })
    }

    fn write(&mut self, name: &str, value: &str) -> Result<usize, SettingsError> {
        std::fs::create_dir_all(&self.root).map_err(|_| SettingsError::Unavailable)?;
        std::fs::write(self.path_for(name), value).map_err(|_| SettingsError::Unavailable)?;
        Ok(value.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_read_before_write_is_not_found() {
        let s = InMemorySettings::new();
        assert_eq!(s.read("elm-0A"), Err(SettingsError::NotFound));
    }

    #[test]
    fn in_memory_round_trips() {
        let mut s = InMemorySettings::new();
        s.write("elm-0A", "SH=686ATT\nE=Y").unwrap();
        assert_eq!(s.read("elm-0A").unwrap(), "SH=686ATT\nE=Y");
    }

    #[test]
    fn fs_settings_round_trips_in_a_temp_dir() {
        let dir = std::env::temp_dir().join(format!("vpw-elm-test-{}", std::process::id()));
        let mut s = FsSettings::new(&dir);
        s.write("elm-tz", "America/New_York").unwrap();
        assert_eq!(s.read("elm-tz").unwrap(), "America/New_York");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
