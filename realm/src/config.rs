//! The `realm_config.json5` file.

use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
};

use realm_core::{WorldError, WorldSettings, world::MapLayout};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONFIG: &str = include_str!("../../package-content/realm_config.json5");

/// Maps written next to a freshly created config, relative to its directory.
const DEFAULT_MAPS: &[(&str, &str)] = &[(
    "maps/arena.json",
    include_str!("../../package-content/maps/arena.json"),
)];

/// Errors raised while loading the configuration or the maps it names.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing a file failed.
    #[error("could not access {}: {source}", path.display())]
    Io {
        /// The file.
        path: PathBuf,
        /// The cause.
        #[source]
        source: io::Error,
    },
    /// The config file is not valid JSON5 for [`RealmConfig`].
    #[error("could not parse config: {0}")]
    Parse(#[from] serde_json5::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
    /// A map file could not be turned into a layout.
    #[error("invalid map {}: {source}", path.display())]
    Map {
        /// The map file.
        path: PathBuf,
        /// The cause.
        #[source]
        source: WorldError,
    },
}

/// Logging options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive. `RUST_LOG` takes precedence.
    pub level: String,
    /// Prefix records with a timestamp.
    pub time: bool,
    /// Prefix records with the module they come from.
    pub module_path: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            time: true,
            module_path: false,
        }
    }
}

/// One world started with the server.
#[derive(Debug, Clone, Deserialize)]
pub struct WorldConfig {
    /// Map file, relative to the config directory.
    #[serde(default)]
    pub map: Option<PathBuf>,
    /// Side length of the empty map used when `map` is not set.
    #[serde(default = "default_world_size")]
    pub size: i32,
    /// Simulated clients connected to this world at startup.
    #[serde(default)]
    pub bots: usize,
    /// World tuning.
    #[serde(default)]
    pub settings: WorldSettings,
}

const fn default_world_size() -> i32 {
    128
}

impl WorldConfig {
    /// Loads the layout this world runs on.
    pub fn load_layout(&self, base_dir: &Path) -> Result<MapLayout, ConfigError> {
        let Some(map) = &self.map else {
            return Ok(MapLayout::filled(self.size, self.size, 0));
        };

        let path = base_dir.join(map);
        let json = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        MapLayout::from_json(&json).map_err(|source| ConfigError::Map { path, source })
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealmConfig {
    /// Length of one simulation step, in milliseconds.
    pub tick_ms: u64,
    /// Capacity of each connection's outbound queue.
    pub connection_queue: usize,
    /// Logging options.
    pub log: LogConfig,
    /// Worlds started with the server.
    pub worlds: Vec<WorldConfig>,
}

impl Default for RealmConfig {
    fn default() -> Self {
        Self {
            tick_ms: 200,
            connection_queue: 256,
            log: LogConfig::default(),
            worlds: Vec::new(),
        }
    }
}

impl RealmConfig {
    /// Reads the config at `path`, writing the default config and maps there
    /// first if it does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ConfigError::Io { path, source }
        };

        let config_str = if path.exists() {
            fs::read_to_string(path).map_err(io_err(path))?
        } else {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            fs::create_dir_all(dir).map_err(io_err(dir))?;
            fs::write(path, DEFAULT_CONFIG).map_err(io_err(path))?;
            for (name, contents) in DEFAULT_MAPS {
                let map_path = dir.join(name);
                if map_path.exists() {
                    continue;
                }
                if let Some(map_dir) = map_path.parent() {
                    fs::create_dir_all(map_dir).map_err(io_err(map_dir))?;
                }
                fs::write(&map_path, contents).map_err(io_err(&map_path))?;
            }
            DEFAULT_CONFIG.to_string()
        };

        Self::parse(&config_str)
    }

    /// Parses and validates a config.
    pub fn parse(config_str: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json5::from_str(config_str)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Checks for values the server cannot run with.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(10..=1000).contains(&self.tick_ms) {
            return Err("Tick length must be in range 10..1000 ms");
        }
        if self.connection_queue < 2 {
            return Err("Connection queue must hold at least 2 messages");
        }
        if self.worlds.is_empty() {
            return Err("At least one world must be configured");
        }

        let mut names = HashSet::new();
        for world in &self.worlds {
            world.settings.validate()?;
            if !names.insert(world.settings.name.as_str()) {
                return Err("World names must be unique");
            }
            if world.map.is_none() && !(16..=2048).contains(&world.size) {
                return Err("World size must be in range 16..2048");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use realm_core::world::BlockingMode;

    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RealmConfig::parse(DEFAULT_CONFIG).expect("default config");
        assert_eq!(config.tick_ms, 200);
        assert_eq!(config.worlds.len(), 2);

        let nexus = &config.worlds[0];
        assert_eq!(nexus.settings.name, "Nexus");
        assert!(nexus.settings.persist);
        assert!(nexus.map.is_none());

        let arena = &config.worlds[1];
        assert_eq!(arena.settings.blocking, BlockingMode::LineOfSight);
        assert_eq!(arena.settings.sight_radius, 15);
    }

    #[test]
    fn test_default_maps_parse() {
        for (name, contents) in DEFAULT_MAPS {
            let layout = MapLayout::from_json(contents).expect(name);
            assert_eq!(
                layout.tiles.len(),
                (layout.width * layout.height) as usize,
                "{name}"
            );
        }
    }

    #[test]
    fn test_rejects_duplicate_world_names() {
        let config = r#"{ worlds: [ { settings: { name: "A" } }, { settings: { name: "A" } } ] }"#;
        assert!(matches!(
            RealmConfig::parse(config),
            Err(ConfigError::Invalid("World names must be unique"))
        ));
    }

    #[test]
    fn test_rejects_bad_world_settings() {
        let config = r#"{ worlds: [ { settings: { sight_radius: 0 } } ] }"#;
        assert!(matches!(RealmConfig::parse(config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_out_of_range_tick() {
        let config = r#"{ tick_ms: 5, worlds: [ {} ] }"#;
        assert!(matches!(RealmConfig::parse(config), Err(ConfigError::Invalid(_))));
    }
}
