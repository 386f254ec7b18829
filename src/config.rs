//! Runtime configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `LAN_SHARE_*` environment variables (a `.env` file is honoured), and
//! finally whatever the CLI passes on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Well-known port shared by the discovery datagrams and the update endpoint
pub const DEFAULT_PORT: u16 = 9898;

const ENV_PREFIX: &str = "LAN_SHARE_";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub broadcast_interval_ms: u64,
    pub discovery_silence_ms: u64,
    pub publish_interval_ms: u64,
    /// Accept publish intervals outside 100..=500 ms
    pub allow_any_publish_interval: bool,
    pub overlay_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub max_body_bytes: usize,
    pub session_root: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            broadcast_interval_ms: 1000,
            discovery_silence_ms: 5000,
            publish_interval_ms: 200,
            allow_any_publish_interval: false,
            overlay_interval_ms: 200,
            request_timeout_ms: 2000,
            max_body_bytes: 8 * 1024 * 1024,
            session_root: PathBuf::from("."),
            log_dir: None,
        }
    }
}

impl Config {
    /// Load defaults, then `file` if given, then the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Override fields from `LAN_SHARE_<FIELD>` variables looked up through `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(
            var: &dyn Fn(&str) -> Option<String>,
            name: &str,
        ) -> Result<Option<T>, ConfigError> {
            let key = format!("{ENV_PREFIX}{name}");
            match var(&key) {
                Some(value) => value
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| ConfigError::Env { key, value }),
                None => Ok(None),
            }
        }

        let var: &dyn Fn(&str) -> Option<String> = &var;

        if let Some(v) = parsed(var, "PORT")? {
            self.port = v;
        }
        if let Some(v) = parsed(var, "BROADCAST_INTERVAL_MS")? {
            self.broadcast_interval_ms = v;
        }
        if let Some(v) = parsed(var, "DISCOVERY_SILENCE_MS")? {
            self.discovery_silence_ms = v;
        }
        if let Some(v) = parsed(var, "PUBLISH_INTERVAL_MS")? {
            self.publish_interval_ms = v;
        }
        if let Some(v) = parsed(var, "OVERLAY_INTERVAL_MS")? {
            self.overlay_interval_ms = v;
        }
        if let Some(v) = parsed(var, "REQUEST_TIMEOUT_MS")? {
            self.request_timeout_ms = v;
        }
        if let Some(v) = parsed(var, "MAX_BODY_BYTES")? {
            self.max_body_bytes = v;
        }
        if let Some(v) = var(&format!("{ENV_PREFIX}SESSION_ROOT")) {
            self.session_root = PathBuf::from(v);
        }
        if let Some(v) = var(&format!("{ENV_PREFIX}LOG_DIR")) {
            self.log_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("broadcast interval", self.broadcast_interval_ms),
            ("discovery silence timeout", self.discovery_silence_ms),
            ("publish interval", self.publish_interval_ms),
            ("overlay refresh interval", self.overlay_interval_ms),
            ("request timeout", self.request_timeout_ms),
        ];
        for (name, ms) in intervals {
            if ms == 0 {
                return Err(ConfigError::ZeroInterval { name });
            }
        }

        if !self.allow_any_publish_interval && !(100..=500).contains(&self.publish_interval_ms) {
            return Err(ConfigError::PublishIntervalOutOfRange(self.publish_interval_ms));
        }
        Ok(())
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn discovery_silence(&self) -> Duration {
        Duration::from_millis(self.discovery_silence_ms)
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    pub fn overlay_interval(&self) -> Duration {
        Duration::from_millis(self.overlay_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Per-session values the user types in when hosting or joining
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSettings {
    pub name: String,
    pub password: Option<String>,
    /// Peer identifier; `None` selects the single-peer path layout
    pub username: Option<String>,
}

impl SessionSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Fall back to the OS account name when no username was given
    pub fn with_default_username(mut self) -> Self {
        if self.username.is_none() {
            self.username = Some(whoami::username());
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_session_name(&self.name)?;
        if let Some(password) = &self.password {
            validate_header_value("session password", password)?;
        }
        if let Some(username) = &self.username {
            validate_username(username)?;
        }
        Ok(())
    }
}

/// Session names end up in URL paths and directory names, so only a
/// conservative character set is accepted.
pub fn validate_session_name(name: &str) -> Result<(), ConfigError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidSessionName(name.to_string()))
    }
}

pub fn validate_username(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::EmptyField("username"));
    }
    if crate::storage::is_safe_segment(name) {
        Ok(())
    } else {
        Err(ConfigError::DisallowedChars { field: "username" })
    }
}

fn validate_header_value(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::EmptyField(field));
    }
    if value.bytes().all(|b| b == b'\t' || (0x20..0x7f).contains(&b)) {
        Ok(())
    } else {
        Err(ConfigError::DisallowedChars { field })
    }
}
