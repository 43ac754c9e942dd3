use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::UserRole;
use crate::error::{RebanhoError, Result};

/// Per-project data directory, created by `rebanho init`.
pub const DATA_DIR: &str = ".rebanho";
pub const CONFIG_FILE: &str = "config.yaml";

pub const ENV_REMOTE_URL: &str = "REBANHO_REMOTE_URL";
pub const ENV_REMOTE_KEY: &str = "REBANHO_REMOTE_KEY";

const DEFAULT_ALERT_INTERVAL_SECS: u64 = 30;
/// Shortest string accepted as an API key.
const MIN_API_KEY_LEN: usize = 20;

fn default_alert_interval() -> u64 {
    DEFAULT_ALERT_INTERVAL_SECS
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// A user allowed to sign in when no remote service is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalUser {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: UserRole,
}

/// Contents of `.rebanho/config.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteSection,
    /// Seconds between urgent-notice alerts in `rebanho watch`.
    #[serde(default = "default_alert_interval")]
    pub alert_interval_secs: u64,
    #[serde(default)]
    pub local_users: Vec<LocalUser>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: RemoteSection::default(),
            alert_interval_secs: DEFAULT_ALERT_INTERVAL_SECS,
            local_users: Vec::new(),
        }
    }
}

/// Validated connection details for the hosted service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCredentials {
    pub url: String,
    pub api_key: String,
}

/// Which persistence backend the process uses. Decided once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMode {
    Remote(RemoteCredentials),
    Local,
}

impl BackendMode {
    pub fn is_remote(&self) -> bool {
        matches!(self, BackendMode::Remote(_))
    }
}

impl std::fmt::Display for BackendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendMode::Remote(creds) => write!(f, "remote ({})", creds.url),
            BackendMode::Local => write!(f, "local"),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl Config {
    /// Read a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.alert_interval_secs == 0 {
            return Err(RebanhoError::Config(
                "alert_interval_secs must be at least 1".to_string(),
            ));
        }
        if let Some(user) = self.local_users.iter().find(|u| u.email.trim().is_empty()) {
            return Err(RebanhoError::Config(format!(
                "local user {:?} has no email",
                user.name.as_deref().unwrap_or_default()
            )));
        }
        Ok(())
    }

    /// Apply `REBANHO_REMOTE_URL` / `REBANHO_REMOTE_KEY` from the environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(env::var(ENV_REMOTE_URL).ok(), env::var(ENV_REMOTE_KEY).ok())
    }

    fn with_overrides(mut self, url: Option<String>, api_key: Option<String>) -> Self {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.remote.url = Some(url);
        }
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.remote.api_key = Some(key);
        }
        self
    }

    /// Remote mode requires a URL with an http(s) scheme and a key of
    /// plausible length. Anything else runs locally; partially filled
    /// remote settings are logged.
    pub fn backend_mode(&self) -> BackendMode {
        let url = non_blank(self.remote.url.as_deref());
        let key = non_blank(self.remote.api_key.as_deref());

        match (url, key) {
            (None, None) => BackendMode::Local,
            (Some(url), Some(key))
                if (url.starts_with("https://") || url.starts_with("http://"))
                    && key.len() >= MIN_API_KEY_LEN =>
            {
                BackendMode::Remote(RemoteCredentials {
                    url: url.trim_end_matches('/').to_string(),
                    api_key: key.to_string(),
                })
            }
            _ => {
                warn!("remote settings are incomplete or malformed, using local storage");
                BackendMode::Local
            }
        }
    }
}

/// Walk up from `start` to the first directory containing `.rebanho/`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(DATA_DIR).is_dir())
        .map(Path::to_path_buf)
}

pub fn data_dir(root: &Path) -> PathBuf {
    root.join(DATA_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    data_dir(root).join(CONFIG_FILE)
}
