//! Process settings and the asteroid map catalog.
//!
//! Settings are plain JSON. Every field has a default, so an empty object
//! (or no file at all) yields a working configuration:
//!
//! ```json
//! {
//!   "store_dir": "/var/lib/serenity",
//!   "lock_timeout_ms": 2000,
//!   "map_width": 20,
//!   "map_height": 20,
//!   "sonar": { "torpedo_damage": 3 },
//!   "asteroid_map_dir": "maps"
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serenity_grid::GridPosition;
use tracing::{debug, info};

use crate::error::ServiceError;
use crate::sonar::SonarConfig;
use crate::switch::Switch;

/// Environment variable naming the settings file.
pub const CONFIG_ENV: &str = "SERENITY_CONFIG";

// =============================================================================
// Settings
// =============================================================================

/// Process-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory for persisted snapshots. `None` keeps them in memory.
    pub store_dir: Option<PathBuf>,
    /// How long a service waits for its own lock.
    pub lock_timeout_ms: u64,
    /// Battle map width.
    pub map_width: u32,
    /// Battle map height.
    pub map_height: u32,
    /// Minimum distance between a spawn position and the map edge.
    pub spawn_margin: u32,
    /// Name of the players' ship.
    pub serenity_name: String,
    /// Default sonar configuration.
    pub sonar: SonarConfig,
    /// Codes of every panel switch.
    pub switch_codes: Vec<String>,
    /// Directory of asteroid maps. `None` offers only open water.
    pub asteroid_map_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_dir: None,
            lock_timeout_ms: 2000,
            map_width: 20,
            map_height: 20,
            spawn_margin: 2,
            serenity_name: "Serenity".to_string(),
            sonar: SonarConfig::default(),
            switch_codes: [
                "NFW0R", "SFR0R", "EFS0B", "WFN0B", "NNW1G", "SNR1G", "ENS0N", "WNN1N",
            ]
            .map(String::from)
            .to_vec(),
            asteroid_map_dir: None,
        }
    }
}

impl Settings {
    /// Parses settings from JSON and validates them.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Json`] for malformed JSON and
    /// [`ServiceError::InvalidConfig`] for values that fail validation.
    pub fn from_json(text: &str) -> Result<Self, ServiceError> {
        let settings: Self = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads settings from a JSON file.
    ///
    /// # Errors
    ///
    /// I/O, JSON or validation failures.
    pub async fn load(path: &Path) -> Result<Self, ServiceError> {
        let text = tokio::fs::read_to_string(path).await?;
        let settings = Self::from_json(&text)?;
        info!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Reads the file named by `SERENITY_CONFIG`, or falls back to defaults
    /// when the variable is unset.
    ///
    /// # Errors
    ///
    /// I/O, JSON or validation failures of the named file.
    pub async fn from_env() -> Result<Self, ServiceError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)).await,
            None => {
                debug!("{CONFIG_ENV} not set, using default settings");
                Ok(Self::default())
            }
        }
    }

    /// Lock acquisition timeout.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidConfig`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), ServiceError> {
        let invalid = |reason: String| Err(ServiceError::InvalidConfig { reason });

        if self.map_width == 0 || self.map_height == 0 {
            return invalid(format!(
                "map dimensions must be positive, got {}x{}",
                self.map_width, self.map_height
            ));
        }
        let margin = u64::from(self.spawn_margin) * 2;
        if margin >= u64::from(self.map_width) || margin >= u64::from(self.map_height) {
            return invalid(format!(
                "spawn margin {} leaves no room on a {}x{} map",
                self.spawn_margin, self.map_width, self.map_height
            ));
        }
        if self.lock_timeout_ms == 0 {
            return invalid("lock timeout must be positive".to_string());
        }
        self.sonar.validate()?;
        for code in &self.switch_codes {
            if Switch::parse(code).is_err() {
                return invalid(format!("invalid switch code {code:?}"));
            }
        }
        Ok(())
    }
}

// =============================================================================
// MapCatalog
// =============================================================================

/// Name of the asteroid-free map every catalog contains.
pub const OPEN_WATER: &str = "open";

#[derive(Deserialize)]
struct AsteroidMapFile {
    asteroids: Vec<GridPosition>,
}

/// Named asteroid layouts, stored with 0-indexed positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapCatalog {
    maps: BTreeMap<String, Vec<GridPosition>>,
}

impl Default for MapCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MapCatalog {
    /// A catalog holding only [`OPEN_WATER`].
    #[must_use]
    pub fn new() -> Self {
        let mut maps = BTreeMap::new();
        maps.insert(OPEN_WATER.to_string(), Vec::new());
        Self { maps }
    }

    /// Adds or replaces a layout.
    pub fn insert(&mut self, name: impl Into<String>, asteroids: Vec<GridPosition>) {
        self.maps.insert(name.into(), asteroids);
    }

    /// Asteroid positions of the named layout.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[GridPosition]> {
        self.maps.get(name).map(Vec::as_slice)
    }

    /// Names of every layout.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.maps.keys().map(String::as_str)
    }

    /// Parses a map file: `{"asteroids": [{"x": 1, "y": 1}, ...]}` with
    /// 1-indexed coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Json`] for malformed files and
    /// [`ServiceError::InvalidConfig`] for coordinates below 1.
    pub fn parse_map(text: &str) -> Result<Vec<GridPosition>, ServiceError> {
        let file: AsteroidMapFile = serde_json::from_str(text)?;
        file.asteroids
            .into_iter()
            .map(|p| {
                if p.x < 1 || p.y < 1 {
                    return Err(ServiceError::InvalidConfig {
                        reason: format!("asteroid {p} is not 1-indexed"),
                    });
                }
                Ok(GridPosition::new(p.x - 1, p.y - 1))
            })
            .collect()
    }

    /// Loads every `<name>.json` file of `dir` as layout `<name>`.
    ///
    /// # Errors
    ///
    /// I/O failures or any malformed map file.
    pub async fn load_dir(dir: &Path) -> Result<Self, ServiceError> {
        let mut catalog = Self::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = tokio::fs::read_to_string(&path).await?;
            let asteroids = Self::parse_map(&text)?;
            debug!(map = name, asteroids = asteroids.len(), "loaded asteroid map");
            catalog.insert(name, asteroids);
        }
        info!(dir = %dir.display(), maps = catalog.maps.len(), "loaded map catalog");
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod settings_tests {
        use super::*;

        #[test]
        fn defaults_are_valid() {
            let settings = Settings::default();
            assert!(settings.validate().is_ok());
            assert_eq!(settings.lock_timeout(), Duration::from_secs(2));
        }

        #[test]
        fn partial_json_keeps_defaults() {
            let settings =
                Settings::from_json(r#"{"map_width": 12, "sonar": {"mine_damage": 5}}"#).unwrap();
            assert_eq!(settings.map_width, 12);
            assert_eq!(settings.map_height, 20);
            assert_eq!(settings.sonar.mine_damage, 5);
            assert_eq!(settings.sonar.torpedo_damage, 2);
        }

        #[test]
        fn rejects_oversized_margin() {
            let err = Settings::from_json(r#"{"map_width": 4, "spawn_margin": 2}"#).unwrap_err();
            assert!(matches!(err, ServiceError::InvalidConfig { .. }));
        }

        #[test]
        fn rejects_hpless_player_ship() {
            let err =
                Settings::from_json(r#"{"sonar": {"player_default_hp": 0}}"#).unwrap_err();
            assert!(err.to_string().contains("player_default_hp"));
        }

        #[test]
        fn rejects_bad_switch_code() {
            let err = Settings::from_json(r#"{"switch_codes": ["XXXXX"]}"#).unwrap_err();
            assert!(matches!(err, ServiceError::InvalidConfig { .. }));
        }
    }

    mod catalog_tests {
        use super::*;

        #[test]
        fn open_water_is_always_present() {
            let catalog = MapCatalog::new();
            assert_eq!(catalog.get(OPEN_WATER), Some(&[][..]));
        }

        #[test]
        fn map_files_are_one_indexed() {
            let asteroids =
                MapCatalog::parse_map(r#"{"asteroids": [{"x": 1, "y": 1}, {"x": 3, "y": 2}]}"#)
                    .unwrap();
            assert_eq!(asteroids, vec![GridPosition::new(0, 0), GridPosition::new(2, 1)]);

            assert!(MapCatalog::parse_map(r#"{"asteroids": [{"x": 0, "y": 1}]}"#).is_err());
        }

        #[tokio::test]
        async fn load_dir_reads_json_files() {
            let dir = std::env::temp_dir().join(format!("serenity-maps-{}", std::process::id()));
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("alpha.json"), r#"{"asteroids": [{"x": 2, "y": 2}]}"#)
                .unwrap();
            std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

            let catalog = MapCatalog::load_dir(&dir).await.unwrap();
            assert_eq!(catalog.get("alpha"), Some(&[GridPosition::new(1, 1)][..]));
            assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["alpha", OPEN_WATER]);

            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
