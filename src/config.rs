// raleigh-server: configuration
// TOML file with section structs, overridable by RALEIGH_* environment
// variables; every field has a default so an empty config works.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("bad override value: {0}")]
    BadOverride(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub reactor: ReactorSection,
    pub store: StoreSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Listen address.
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactorSection {
    /// Worker threads; 0 means one per core.
    pub cores: usize,
    /// Exec-pass budget in microseconds.
    pub exec_quantum_us: u64,
    /// Idle park timeout in milliseconds.
    pub park_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Object cache bucket count.
    pub cache_buckets: u32,
    /// In-memory device capacity in bytes.
    pub device_capacity: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            reactor: ReactorSection::default(),
            store: StoreSection::default(),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:11217".to_string(),
        }
    }
}

impl Default for ReactorSection {
    fn default() -> Self {
        Self {
            cores: 0,
            exec_quantum_us: 2_000,
            park_timeout_ms: 50,
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            cache_buckets: 1024,
            device_capacity: 64 << 20,
        }
    }
}

impl ServerConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
        let mut config = match path {
            Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
            None => ServerConfig::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(bind) = std::env::var("RALEIGH_BIND") {
            self.server.bind = bind;
        }
        if let Ok(cores) = std::env::var("RALEIGH_CORES") {
            self.reactor.cores = cores
                .parse()
                .map_err(|_| ConfigError::BadOverride(format!("RALEIGH_CORES={cores}")))?;
        }
        if let Ok(capacity) = std::env::var("RALEIGH_DEVICE_CAPACITY") {
            self.store.device_capacity = capacity.parse().map_err(|_| {
                ConfigError::BadOverride(format!("RALEIGH_DEVICE_CAPACITY={capacity}"))
            })?;
        }
        Ok(())
    }
}
