use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use library::scanner::{DEFAULT_BATCH_SIZE, DEFAULT_EXTRACT_WORKERS};
use library::{ScanOptions, MAX_CACHE_SIZE, MAX_PLAYLIST_CACHE_SIZE};
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;
pub const CONFIG_ENV: &str = "MEDIA_PLAYER_CONFIG";
const DEFAULT_CACHE_PATH: &str = "media_cache.redb";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub version: u32,
    pub music_root: String,
    pub cache_path: String,
    pub scan_limit: usize,
    pub playlist_limit: usize,
    pub batch_size: usize,
    pub extract_workers: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            music_root: "".to_string(),
            cache_path: DEFAULT_CACHE_PATH.to_string(),
            scan_limit: MAX_CACHE_SIZE,
            playlist_limit: MAX_PLAYLIST_CACHE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            extract_workers: DEFAULT_EXTRACT_WORKERS,
        }
    }
}

impl PlayerConfig {
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            max_playlists: self.playlist_limit,
            batch_size: self.batch_size,
            workers: self.extract_workers,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var(CONFIG_ENV) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(PlayerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: PlayerConfig = serde_yaml::from_str(&contents)?;
        normalize(&mut config);
        return Ok((config, false));
    }

    let config = PlayerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

fn normalize(config: &mut PlayerConfig) {
    let defaults = PlayerConfig::default();
    if config.version < CONFIG_VERSION {
        config.version = CONFIG_VERSION;
    }
    if config.cache_path.trim().is_empty() {
        config.cache_path = defaults.cache_path;
    }
    if config.scan_limit == 0 {
        config.scan_limit = defaults.scan_limit;
    }
    if config.playlist_limit == 0 {
        config.playlist_limit = defaults.playlist_limit;
    }
    if config.batch_size == 0 {
        config.batch_size = defaults.batch_size;
    }
    if config.extract_workers == 0 {
        config.extract_workers = defaults.extract_workers;
    }
}

pub fn save_config(path: &Path, config: &PlayerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

pub fn resolve_music_root(config_path: &Path, value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(resolve_path(config_path, trimmed))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::{load_or_create_config, resolve_music_root, resolve_path, PlayerConfig};

    #[test]
    fn first_run_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("config.yaml");
        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(created);
        assert_eq!(config, PlayerConfig::default());
        assert!(path.exists());

        let (again, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
        assert_eq!(again, config);
    }

    #[test]
    fn zero_and_blank_values_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "version: 0\nmusic_root: /srv/music\ncache_path: ''\nscan_limit: 0\nbatch_size: 10\nextract_workers: 0\n",
        )
        .unwrap();
        let (config, _) = load_or_create_config(&path).unwrap();
        assert_eq!(config.music_root, "/srv/music");
        assert_eq!(config.cache_path, "media_cache.redb");
        assert_eq!(config.scan_limit, 20);
        assert_eq!(config.playlist_limit, 20);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.extract_workers, 4);
        assert_eq!(config.version, 1);

        let options = config.scan_options();
        assert_eq!(options.batch_size, 10);
        assert_eq!(options.max_playlists, 20);
    }

    #[test]
    fn relative_paths_resolve_next_to_config() {
        let config = Path::new("/etc/player/config.yaml");
        assert_eq!(
            resolve_path(config, "media_cache.redb"),
            Path::new("/etc/player/media_cache.redb")
        );
        assert_eq!(resolve_path(config, "/var/cache.redb"), Path::new("/var/cache.redb"));
        assert!(resolve_music_root(config, "  ").is_none());
    }
}
