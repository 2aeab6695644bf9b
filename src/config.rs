use crate::error::{Result, SnooError};
use crate::report::CurrentSession;
use crate::time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://snoo-api.happiestbaby.com";

/// Upper bound for `update_interval`: one day
pub const MAX_UPDATE_INTERVAL: u64 = 86_400;

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// The `[default]` table
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DefaultSection {
    /// Seconds a cached current-session snapshot stays fresh
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_update_interval() -> u64 {
    60
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for DefaultSection {
    fn default() -> Self {
        Self {
            update_interval: default_update_interval(),
            base_url: default_base_url(),
        }
    }
}

/// The `[auth]` table: credentials and the cached bearer token
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthSection {
    #[serde(
        default,
        deserialize_with = "empty_string_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub username: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_string_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub password: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_string_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_timestamp_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub token_expiry: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "empty_string_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_token: Option<String>,
}

/// The `[session]` table: last fetched current-session snapshot
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SessionSection {
    #[serde(
        default,
        deserialize_with = "empty_timestamp_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "empty_timestamp_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub level: String,
    #[serde(
        default,
        deserialize_with = "empty_timestamp_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated: Option<DateTime<Utc>>,
}

impl SessionSection {
    /// The cached snapshot, if one was ever stored
    pub fn snapshot(&self) -> Option<CurrentSession> {
        Some(CurrentSession {
            start_time: self.start_time?,
            end_time: self.end_time,
            duration: self.duration,
            level: self.level.clone(),
            last_updated: self.last_updated?,
        })
    }

    pub fn store(&mut self, session: &CurrentSession) {
        self.start_time = Some(session.start_time);
        self.end_time = session.end_time;
        self.duration = session.duration;
        self.level = session.level.clone();
        self.last_updated = Some(session.last_updated);
    }
}

/// Hand-edited files use `key = ""` for unset values.
fn empty_string_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

fn empty_timestamp_as_none<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => time::parse_utc(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", s))),
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub session: SessionSection,
}

impl Config {
    /// Validate configuration and return any errors found
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.default.update_interval == 0 {
            errors.push(ValidationError {
                field: "default.update_interval".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        } else if self.default.update_interval > MAX_UPDATE_INTERVAL {
            errors.push(ValidationError {
                field: "default.update_interval".to_string(),
                message: format!(
                    "Must be at most {} seconds, got {}",
                    MAX_UPDATE_INTERVAL, self.default.update_interval
                ),
            });
        }

        let base_url = &self.default.base_url;
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            errors.push(ValidationError {
                field: "default.base_url".to_string(),
                message: format!("Expected an http(s) URL, got '{}'", base_url),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// The platform file wins only if it already exists; new installs get `~/.snoo_config`.
fn resolve_default_path(home: Option<PathBuf>, config_dir: Option<PathBuf>) -> PathBuf {
    if let Some(config_dir) = config_dir {
        let platform = config_dir.join("snoo").join("snoo.toml");
        if platform.exists() {
            return platform;
        }
    }
    home.unwrap_or_else(|| PathBuf::from(".")).join(".snoo_config")
}

/// The config file plus the path it is persisted to.
///
/// There is no locking: two processes saving at once race, last writer wins.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    pub config: Config,
}

impl ConfigStore {
    /// Open the config at the default location
    /// Priority: `<config_dir>/snoo/snoo.toml` if it exists, else `~/.snoo_config`
    pub fn open() -> Result<Self> {
        Self::open_at(&Self::default_path())
    }

    /// Open the config at `path`, starting from defaults if it doesn't exist
    pub fn open_at(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            Self::load_from(path)?
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Config::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    pub fn default_path() -> PathBuf {
        resolve_default_path(dirs::home_dir(), dirs::config_dir())
    }

    /// Load and validate configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Config> {
        let config_error = |message: String| SnooError::Config {
            path: path.to_path_buf(),
            message,
        };

        let content = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        let config: Config = toml::from_str(&content).map_err(|e| config_error(e.to_string()))?;

        if let Err(errors) = config.validate() {
            let message = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(config_error(message));
        }

        Ok(config)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the whole file atomically
    pub fn save(&self) -> Result<()> {
        let io_error = |source: std::io::Error| SnooError::Io {
            path: self.path.clone(),
            source,
        };

        let content = toml::to_string_pretty(&self.config).map_err(|e| SnooError::Config {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_error)?;

        // Same directory so the rename can't cross filesystems
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_error)?;
        tmp.write_all(content.as_bytes()).map_err(io_error)?;
        tmp.as_file().sync_all().map_err(io_error)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(io_error)?;
        }

        tmp.persist(&self.path).map_err(|e| io_error(e.error))?;
        debug!(path = %self.path.display(), "saved config");
        Ok(())
    }
}
