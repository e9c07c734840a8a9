//! Application configuration.
//!
//! Loaded from TOML; every field has a default so an empty file (or no file)
//! is valid. Relative paths resolve against `app_root`, which itself
//! resolves against the config file's directory (or the working directory
//! when no file is used).

use crate::media::PLACEHOLDER_IMAGE_PATH;
use crate::update::InstallLayout;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "ITEMWIKI_CONFIG";
/// File probed in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "itemwiki.toml";
pub const DEFAULT_UPDATE_BASE_URL: &str =
    "https://raw.githubusercontent.com/icethanakornz/ARPG-Item-Wiki/main/";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "invalid config `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub credentials_path: PathBuf,
    pub image_dir: PathBuf,
    pub placeholder_image: String,
    pub reference_cache_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("item_wiki.db"),
            credentials_path: PathBuf::from("config/auth_config.yaml"),
            image_dir: PathBuf::from("assets/images"),
            placeholder_image: PLACEHOLDER_IMAGE_PATH.to_string(),
            reference_cache_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `None` picks the build-mode default.
    pub level: Option<String>,
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    pub base_url: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPDATE_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app_root: PathBuf,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub update: UpdateConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_root: PathBuf::from("."),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            update: UpdateConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parses TOML text; `base_dir` anchors a relative `app_root`.
    pub fn from_toml_str(content: &str, base_dir: &Path) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        config.app_root = absolutize(base_dir, &config.app_root);
        Ok(config)
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(current_dir);

        Self::from_toml_str(&content, &base_dir).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolution order: explicit path, `ITEMWIKI_CONFIG`, `./itemwiki.toml`,
    /// then built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> ConfigResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|value| !value.is_empty()) {
            return Self::load(Path::new(&path));
        }

        let local = current_dir().join(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            return Self::load(&local);
        }

        let mut config = Self::default();
        config.app_root = absolutize(&current_dir(), &config.app_root);
        Ok(config)
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        absolutize(&self.app_root, path)
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.storage.database_path)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.resolve(&self.storage.credentials_path)
    }

    pub fn image_dir(&self) -> PathBuf {
        self.resolve(&self.storage.image_dir)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.logging.dir)
    }

    pub fn reference_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.storage.reference_cache_ttl_secs)
    }

    pub fn install_layout(&self) -> InstallLayout {
        InstallLayout {
            app_root: self.app_root.clone(),
            db_path: self.database_path(),
            credentials_path: self.credentials_path(),
            image_dir: self.image_dir(),
        }
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let joined = base.join(path);
    // Drop `.` segments so resolved paths print cleanly.
    joined
        .components()
        .filter(|component| !matches!(component, std::path::Component::CurDir))
        .collect()
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
