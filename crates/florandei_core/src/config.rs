//! Application configuration.
//!
//! # Responsibility
//! - Provide defaults for every setting.
//! - Merge an optional JSON file and environment overrides on top.
//! - Derive on-disk locations (database, logs, caches) from `data_dir`.
//!
//! # Invariants
//! - Precedence is defaults < file < environment; CLI flags are applied by
//!   the caller afterwards.
//! - `data_dir` is absolute after a successful [`AppConfig::load`].

use crate::logging::{default_log_level, normalize_level};
use crate::map::area::MapArea;
use crate::map::tiles::MAX_TILE_ZOOM;
use crate::offline::tiles::TileSettings;
use crate::offline::worker::OfflineSettings;
use log::info;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "florandei.json";
pub const DATA_DIR_ENV: &str = "FLORANDEI_DATA_DIR";
pub const LOG_LEVEL_ENV: &str = "FLORANDEI_LOG_LEVEL";

const DATABASE_FILE_NAME: &str = "florandei.sqlite3";
const LOG_DIR_NAME: &str = "logs";
const CACHE_DIR_NAME: &str = "cache";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: Option<PathBuf>, source: serde_json::Error },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse {
                path: Some(path),
                source,
            } => write!(f, "malformed config `{}`: {source}", path.display()),
            Self::Parse { path: None, source } => write!(f, "malformed config: {source}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub log_level: String,
    pub map: MapArea,
    pub tiles: TileSettings,
    pub offline: OfflineSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level().to_string(),
            map: MapArea::default(),
            tiles: TileSettings::default(),
            offline: OfflineSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from the process environment.
    ///
    /// With `explicit_path` the file must exist. Without it,
    /// `<data_dir>/florandei.json` is read when present.
    pub fn load(explicit_path: Option<&Path>) -> ConfigResult<Self> {
        Self::load_with(explicit_path, |key| std::env::var(key).ok())
    }

    /// [`AppConfig::load`] with an injectable environment lookup.
    pub fn load_with(
        explicit_path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> ConfigResult<Self> {
        let (mut config, source) = match explicit_path {
            Some(path) => (Self::from_file(path)?, path.display().to_string()),
            None => {
                // The env data dir decides where the implicit file lives.
                let mut env_only = Self::default();
                env_only.apply_env_overrides(&env);
                let candidate = env_only.data_dir.join(CONFIG_FILE_NAME);
                if candidate.is_file() {
                    (Self::from_file(&candidate)?, candidate.display().to_string())
                } else {
                    (Self::default(), "defaults".to_string())
                }
            }
        };

        config.apply_env_overrides(&env);
        config.data_dir = absolutize(&config.data_dir)?;
        config.validate()?;

        info!(
            "event=config_load module=config status=ok source={} data_dir={}",
            source,
            config.data_dir.display()
        );
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })
    }

    pub fn from_json_str(text: &str) -> ConfigResult<Self> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse { path: None, source })
    }

    pub fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = env(DATA_DIR_ENV).filter(|value| !value.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(level) = env(LOG_LEVEL_ENV).filter(|value| !value.trim().is_empty()) {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir cannot be empty".to_string()));
        }
        normalize_level(&self.log_level).map_err(|err| ConfigError::Invalid(err.to_string()))?;

        let map = &self.map;
        if !map.bounds.is_well_formed() {
            return Err(ConfigError::Invalid("map.bounds is not a valid rectangle".to_string()));
        }
        if map.center.validate().is_err() {
            return Err(ConfigError::Invalid("map.center is out of range".to_string()));
        }
        if map.max_zoom > MAX_TILE_ZOOM {
            return Err(ConfigError::Invalid(format!(
                "map.max_zoom {} exceeds the tile zoom limit {MAX_TILE_ZOOM}",
                map.max_zoom
            )));
        }
        if map.min_zoom > map.max_zoom || !(map.min_zoom..=map.max_zoom).contains(&map.zoom) {
            return Err(ConfigError::Invalid(format!(
                "map zoom {} must lie within {}..={}",
                map.zoom, map.min_zoom, map.max_zoom
            )));
        }

        if !self.tiles.url_template.contains("{z}")
            || !self.tiles.url_template.contains("{x}")
            || !self.tiles.url_template.contains("{y}")
        {
            return Err(ConfigError::Invalid(
                "tiles.url_template needs {z}, {x} and {y} placeholders".to_string(),
            ));
        }
        if self.tiles.url_template.contains("{s}") && self.tiles.subdomains.is_empty() {
            return Err(ConfigError::Invalid(
                "tiles.subdomains cannot be empty when the template uses {s}".to_string(),
            ));
        }
        if self.tiles.cache_name == self.offline.cache_name {
            return Err(ConfigError::Invalid(
                "tiles.cache_name and offline.cache_name must differ".to_string(),
            ));
        }
        if self.offline.network_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "offline.network_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIR_NAME)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join(CACHE_DIR_NAME)
    }
}

fn default_data_dir() -> PathBuf {
    match std::env::var_os("HOME").filter(|home| !home.is_empty()) {
        Some(home) => PathBuf::from(home).join(".local/share/florandei"),
        None => PathBuf::from("florandei-data"),
    }
}

fn absolutize(path: &Path) -> ConfigResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, ConfigError, CONFIG_FILE_NAME, DATA_DIR_ENV, LOG_LEVEL_ENV};
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid_and_point_at_cravinhos() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.map.name, "Cravinhos");
        assert_eq!(config.map.zoom, 14);
        assert_eq!(config.offline.cache_name, "florandei-v1");
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let config = AppConfig::from_json_str(
            r#"{ "log_level": "warn", "tiles": { "max_prefetch_tiles": 10 } }"#,
        )
        .unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.tiles.max_prefetch_tiles, 10);
        assert_eq!(config.tiles.subdomains, vec!["a", "b", "c"]);
        assert_eq!(config.map.max_zoom, 19);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let error = AppConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(error, ConfigError::Parse { path: None, .. }));
    }

    #[test]
    fn env_overrides_win_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("custom.json");
        std::fs::write(&file, r#"{ "log_level": "error" }"#).unwrap();
        let data_dir = dir.path().join("data");

        let config = AppConfig::load_with(
            Some(&file),
            env_from(&[
                (DATA_DIR_ENV, data_dir.to_str().unwrap()),
                (LOG_LEVEL_ENV, "debug"),
            ]),
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.data_dir, data_dir);
        assert_eq!(config.database_path(), data_dir.join("florandei.sqlite3"));
        assert_eq!(config.log_dir(), data_dir.join("logs"));
        assert_eq!(config.cache_dir(), data_dir.join("cache"));
    }

    #[test]
    fn implicit_file_is_read_from_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "offline": { "base_url": "http://field.local" } }"#,
        )
        .unwrap();

        let config = AppConfig::load_with(
            None,
            env_from(&[(DATA_DIR_ENV, dir.path().to_str().unwrap())]),
        )
        .unwrap();

        assert_eq!(config.offline.base_url, "http://field.local");
        assert_eq!(config.data_dir, dir.path());
    }

    #[test]
    fn missing_explicit_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let error =
            AppConfig::load_with(Some(&dir.path().join("absent.json")), env_from(&[])).unwrap_err();
        assert!(matches!(error, ConfigError::Io { .. }));
    }

    #[test]
    fn validate_rejects_bad_zoom_and_shared_cache_names() {
        let mut config = AppConfig::default();
        config.map.zoom = 3;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.tiles.cache_name = config.offline.cache_name.clone();
        assert!(config.validate().unwrap_err().to_string().contains("must differ"));

        let mut config = AppConfig::default();
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zoom_beyond_tile_servers() {
        let config = AppConfig::from_json_str(r#"{ "map": { "max_zoom": 30 } }"#).unwrap();
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("max_zoom 30"));

        let mut config = AppConfig::default();
        config.map.max_zoom = super::MAX_TILE_ZOOM;
        config.validate().unwrap();
    }
}
