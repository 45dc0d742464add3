//! Server configuration.

use anyhow::Result;
use parley_core::{CatalogEntry, Strictness, default_entries};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_scenarios_dir")]
    pub scenarios_dir: PathBuf,
    #[serde(default = "default_strict")]
    pub strict_scenarios: bool,
    /// Idle sessions older than this are evicted; 0 keeps them forever.
    #[serde(default)]
    pub session_ttl_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "default_entries")]
    pub catalog: Vec<CatalogEntry>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("./static")
}

fn default_scenarios_dir() -> PathBuf {
    PathBuf::from("./templates")
}

fn default_strict() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_event_capacity() -> usize {
    256
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            scenarios_dir: default_scenarios_dir(),
            strict_scenarios: default_strict(),
            session_ttl_secs: 0,
            sweep_interval_secs: default_sweep_interval(),
            event_capacity: default_event_capacity(),
            catalog: default_entries(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `config/default.toml`, then the user config dir, then defaults.
    pub fn load() -> Result<Self> {
        let local = PathBuf::from("config/default.toml");
        if local.exists() {
            return Self::load_from(&local);
        }

        if let Some(user) = dirs::config_dir().map(|d| d.join("parley").join("config.toml")) {
            if user.exists() {
                return Self::load_from(&user);
            }
        }

        Ok(Config::default())
    }

    pub fn strictness(&self) -> Strictness {
        if self.strict_scenarios {
            Strictness::Strict
        } else {
            Strictness::Lenient
        }
    }

    pub fn session_ttl(&self) -> Option<Duration> {
        (self.session_ttl_secs > 0).then(|| Duration::from_secs(self.session_ttl_secs))
    }
}
