//! On-disk configuration.
//!
//! Two small JSON files, both optional: `settings.json` for engine behavior
//! and `networkSettings.json` for the capture adapter. Keys are camelCase
//! for compatibility with the overlay UI that edits them.

use std::{io, path::Path};

use argus_capture::DeviceSelection;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const SETTINGS_FILE: &str = "settings.json";
pub const NETWORK_SETTINGS_FILE: &str = "networkSettings.json";

pub const DEFAULT_FIGHT_TIMEOUT_MS: u64 = 15_000;

/// Engine behavior switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Fight ends after this much silence (milliseconds).
    pub fight_timeout: u64,
    pub auto_clear_on_timeout: bool,
    pub auto_clear_on_server_change: bool,
    pub auto_clear_on_boss_spawn: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fight_timeout: DEFAULT_FIGHT_TIMEOUT_MS,
            auto_clear_on_timeout: true,
            auto_clear_on_server_change: true,
            auto_clear_on_boss_spawn: true,
        }
    }
}

/// Which capture adapter to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkSettings {
    pub selected_adapter: AdapterChoice,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            selected_adapter: AdapterChoice::Keyword("auto".to_owned()),
        }
    }
}

/// `selectedAdapter` is either a stable device index or the string `"auto"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdapterChoice {
    Index(usize),
    Keyword(String),
}

impl AdapterChoice {
    #[must_use]
    pub fn to_selection(&self) -> DeviceSelection {
        match self {
            Self::Index(index) => DeviceSelection::Index(*index),
            Self::Keyword(_) => DeviceSelection::Auto,
        }
    }
}

/// Load a JSON config, falling back to defaults when the file is missing or
/// unreadable (a corrupt config should not keep telemetry down).
pub fn load_or_default<T>(path: &Path) -> T
where
    T: Default + for<'de> Deserialize<'de>,
{
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(path = %path.display(), %err, "malformed config; using defaults");
                T::default()
            }
        },
        Err(err) if err.kind() == io::ErrorKind::NotFound => T::default(),
        Err(err) => {
            warn!(path = %path.display(), %err, "unreadable config; using defaults");
            T::default()
        }
    }
}

pub fn save<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let raw = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.fight_timeout, 15_000);
        assert!(settings.auto_clear_on_timeout);
        assert!(settings.auto_clear_on_server_change);
        assert!(settings.auto_clear_on_boss_spawn);
    }

    #[test]
    fn settings_keys_are_camel_case() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["fightTimeout"], 15_000);
        assert_eq!(json["autoClearOnBossSpawn"], true);
    }

    #[test]
    fn adapter_choice_accepts_index_and_auto() {
        let parsed: NetworkSettings = serde_json::from_str(r#"{"selectedAdapter": 3}"#).unwrap();
        assert_eq!(
            parsed.selected_adapter.to_selection(),
            argus_capture::DeviceSelection::Index(3)
        );

        let parsed: NetworkSettings =
            serde_json::from_str(r#"{"selectedAdapter": "auto"}"#).unwrap();
        assert_eq!(
            parsed.selected_adapter.to_selection(),
            argus_capture::DeviceSelection::Auto
        );
    }

    #[test]
    fn load_round_trips_and_tolerates_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);

        let mut settings = Settings::default();
        settings.fight_timeout = 3000;
        save(&path, &settings).unwrap();
        assert_eq!(load_or_default::<Settings>(&path), settings);

        std::fs::write(&path, b"{not json").unwrap();
        assert_eq!(load_or_default::<Settings>(&path), Settings::default());

        let missing = dir.path().join("nope.json");
        assert_eq!(load_or_default::<Settings>(&missing), Settings::default());
    }
}
