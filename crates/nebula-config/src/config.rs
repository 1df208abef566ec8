//! Configuration structs with defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Tile selection and load scheduling.
    pub quadtree: QuadtreeConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
    /// Globe demo settings.
    pub demo: DemoConfig,
}

/// Tunables of the quadtree primitive. Changes take effect on the next selection pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuadtreeConfig {
    /// A tile is refined while its screen-space error, in pixels, is at least this.
    pub maximum_screen_space_error: f64,
    /// How many not-yet-renderable descendants a tile may wait on before it
    /// is loaded and rendered itself instead.
    pub loading_descendant_limit: usize,
    /// Keep loading the ancestors of rendered tiles at low priority.
    pub preload_ancestors: bool,
    /// Load culled siblings of visible tiles at low priority.
    pub preload_siblings: bool,
    /// Wall-clock budget for dispatching tile loads each frame, in milliseconds.
    pub load_queue_time_slice_ms: f64,
    /// Log selection statistics whenever they change.
    pub debug_output: bool,
    /// Freeze the current selection; no loads are dispatched.
    pub suspend_lod_update: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

/// Headless globe demo configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of frames to simulate.
    pub frames: u32,
    /// Globe radius in meters.
    pub radius_m: f64,
    /// Camera altitude on the first frame, in meters.
    pub start_altitude_m: f64,
    /// Camera altitude on the last frame, in meters.
    pub end_altitude_m: f64,
    /// Longitude the camera descends towards, in degrees.
    pub target_longitude_deg: f64,
    /// Latitude the camera descends towards, in degrees.
    pub target_latitude_deg: f64,
    /// Deepest level the procedural terrain has data for.
    pub max_level: u32,
    /// Frames a tile stays loading before its data arrives.
    pub load_latency_frames: u32,
    /// Probability (0.0 - 1.0) that a tile load fails.
    pub failure_rate: f64,
    /// Number of random height queries registered at start.
    pub height_queries: u32,
    /// Seed for latency, failures and query placement.
    pub seed: u64,
}

impl Default for QuadtreeConfig {
    fn default() -> Self {
        Self {
            maximum_screen_space_error: 2.0,
            loading_descendant_limit: 20,
            preload_ancestors: true,
            preload_siblings: false,
            load_queue_time_slice_ms: 5.0,
            debug_output: false,
            suspend_lod_update: false,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frames: 240,
            radius_m: 6_378_137.0,
            start_altitude_m: 20_000_000.0,
            end_altitude_m: 5_000.0,
            target_longitude_deg: -72.0,
            target_latitude_deg: 40.0,
            max_level: 14,
            load_latency_frames: 2,
            failure_rate: 0.01,
            height_queries: 8,
            seed: 42,
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let config = read_config(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let config_path = config_dir.join("config.ron");
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let quadtree = &self.quadtree;
        if !(quadtree.maximum_screen_space_error > 0.0) {
            return Err(ConfigError::Invalid {
                field: "quadtree.maximum_screen_space_error",
                reason: "must be positive",
            });
        }
        let time_slice = quadtree.load_queue_time_slice_ms;
        if !(time_slice.is_finite() && time_slice >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "quadtree.load_queue_time_slice_ms",
                reason: "must be a finite, non-negative number of milliseconds",
            });
        }

        let demo = &self.demo;
        if !(demo.radius_m > 0.0) {
            return Err(ConfigError::Invalid {
                field: "demo.radius_m",
                reason: "must be positive",
            });
        }
        if !(demo.end_altitude_m > 0.0) || demo.start_altitude_m < demo.end_altitude_m {
            return Err(ConfigError::Invalid {
                field: "demo.end_altitude_m",
                reason: "must be positive and no higher than start_altitude_m",
            });
        }
        if !(0.0..=1.0).contains(&demo.failure_rate) {
            return Err(ConfigError::Invalid {
                field: "demo.failure_rate",
                reason: "must be between 0.0 and 1.0",
            });
        }
        if demo.max_level > 30 {
            return Err(ConfigError::Invalid {
                field: "demo.max_level",
                reason: "must be at most 30",
            });
        }
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = read_config(&config_dir.join("config.ron"))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saved_file_is_readable_ron() {
        let dir = tempfile::tempdir().unwrap();
        Config::default().save(dir.path()).unwrap();

        let text = std::fs::read_to_string(dir.path().join("config.ron")).unwrap();
        assert!(text.contains("maximum_screen_space_error: 2.0"));
        assert!(text.contains("loading_descendant_limit: 20"));
        let parsed: Config = ron::from_str(&text).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_quadtree_defaults() {
        let quadtree = QuadtreeConfig::default();
        assert!(quadtree.preload_ancestors);
        assert!(!quadtree.preload_siblings);
        assert!(!quadtree.suspend_lod_update);
        assert_eq!(quadtree.load_queue_time_slice_ms, 5.0);
    }

    #[test]
    fn test_missing_field_uses_default() {
        // Config missing the `demo` section entirely
        let ron_str = "(quadtree: (preload_siblings: true), debug: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.demo, DemoConfig::default());
        assert!(config.quadtree.preload_siblings);
        assert_eq!(config.quadtree.loading_descendant_limit, 20);
    }

    #[test]
    fn test_unknown_settings_are_ignored() {
        let ron_str = "(quadtree: (tile_cache_size: 100, preload_ancestors: false), render: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert!(!config.quadtree.preload_ancestors);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.quadtree.maximum_screen_space_error = 4.0;
        config.demo.frames = 12;
        config.debug.log_level = "trace".to_string();

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.quadtree.loading_descendant_limit = 4;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_some());
        assert_eq!(result.unwrap().quadtree.loading_descendant_limit, 4);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.ron"), "{{not valid}}").unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut config = Config::default();
        config.quadtree.maximum_screen_space_error = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "quadtree.maximum_screen_space_error",
                ..
            })
        ));

        let mut config = Config::default();
        config.demo.failure_rate = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "demo.failure_rate",
                ..
            })
        ));

        let mut config = Config::default();
        config.demo.start_altitude_m = 100.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.quadtree.load_queue_time_slice_ms = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_hand_edited_file_with_comments() {
        let dir = tempfile::tempdir().unwrap();
        let text = "// tuned for a slow link\n(\n  demo: (load_latency_frames: 30), // frames\n)";
        std::fs::write(dir.path().join("config.ron"), text).unwrap();

        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config.demo.load_latency_frames, 30);
        assert_eq!(config.quadtree, QuadtreeConfig::default());
    }

    #[test]
    fn test_reload_without_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::default().reload(dir.path());
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
