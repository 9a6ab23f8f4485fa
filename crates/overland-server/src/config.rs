//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable naming a YAML config file that overrides the defaults.
pub const CONFIG_ENV: &str = "OVERLAND_CONFIG";

/// Server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the server
    pub bind_address: SocketAddr,
    /// Maximum connected clients
    pub max_players: u8,
    /// Grace period before a disconnected player's fights go to auto-control
    pub disconnect_grace: Duration,
    /// Warn once a disconnected player's outbox holds more records than this
    pub outbox_warn_threshold: usize,
    /// Wall-clock budget for planning one automatic combat turn
    pub auto_think_budget: Duration,
    /// Rules file; the embedded rules are used when absent
    pub rules_path: Option<PathBuf>,
    pub map: MapConfig,
    /// Seats at the table, in player-id order
    pub seats: Vec<SeatConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 7777)),
            max_players: 8,
            disconnect_grace: Duration::from_secs(60),
            outbox_warn_threshold: 4096,
            auto_think_budget: Duration::from_millis(250),
            rules_path: None,
            map: MapConfig::default(),
            seats: vec![SeatConfig::human("Player 1"), SeatConfig::human("Player 2")],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub width: u32,
    pub height: u32,
    pub planes: u8,
    pub wrap_horizontal: bool,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: 60,
            height: 40,
            planes: 2,
            wrap_horizontal: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeatConfig {
    pub name: String,
    #[serde(default)]
    pub ai: bool,
}

impl SeatConfig {
    pub fn human(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ai: false,
        }
    }

    pub fn ai(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ai: true,
        }
    }
}

impl ServerConfig {
    /// Read a YAML config file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Config named by `OVERLAND_CONFIG`, or the defaults when it is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(PathBuf::from(path)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seats.is_empty() {
            return Err(ConfigError::Invalid("at least one seat is required".into()));
        }
        if self.seats.len() > usize::from(self.max_players) {
            return Err(ConfigError::Invalid(format!(
                "{} seats exceed max_players {}",
                self.seats.len(),
                self.max_players
            )));
        }
        if self.map.width == 0 || self.map.height == 0 {
            return Err(ConfigError::Invalid("map must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
