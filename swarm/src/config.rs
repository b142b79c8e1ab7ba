//! Properties file and proxy list loading
//!
//! The properties file is JSON. Only the server address and the proxy list
//! path are required; the tuning knobs fall back to the values the swarm was
//! designed around.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::proxy::{parse_proxy, ProxyError, ProxyRoute};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed properties file {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("line {line} of the proxy list: {source}")]
    Proxy { line: usize, source: ProxyError },
}

fn default_bots_per_proxy() -> usize {
    1
}

fn default_rally_point() -> (i32, i32) {
    (32000, 32000)
}

fn default_update_interval_ms() -> u64 {
    100
}

fn default_idle_timeout_secs() -> u64 {
    10
}

fn default_handshake_timeout_secs() -> u64 {
    20
}

fn default_handoff_capacity() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct Properties {
    pub server_address: String,
    pub proxy_list_path: PathBuf,
    #[serde(default = "default_bots_per_proxy")]
    pub bots_per_proxy: usize,
    /// World coordinate every agent steers toward.
    #[serde(default = "default_rally_point")]
    pub rally_point: (i32, i32),
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    /// How long the swarm may stay silent before supervision gives up.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_handoff_capacity")]
    pub handoff_capacity: usize,
}

impl Properties {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }

    /// Reads and parses the proxy list, one route per line.
    ///
    /// Blank lines are kept: they become agents on the environment route.
    pub fn read_proxy_list(&self) -> Result<Vec<ProxyRoute>, ConfigError> {
        let contents =
            std::fs::read_to_string(&self.proxy_list_path).map_err(|source| ConfigError::Io {
                path: self.proxy_list_path.clone(),
                source,
            })?;
        parse_proxy_list(&contents)
    }

    pub fn swarm_settings(&self) -> SwarmSettings {
        SwarmSettings {
            server_address: self.server_address.clone(),
            agents_per_proxy: self.bots_per_proxy.max(1),
            rally_point: self.rally_point,
            update_interval: Duration::from_millis(self.update_interval_ms),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            handoff_capacity: self.handoff_capacity.max(1),
        }
    }
}

pub fn parse_proxy_list(contents: &str) -> Result<Vec<ProxyRoute>, ConfigError> {
    contents
        .lines()
        .enumerate()
        .map(|(index, line)| {
            parse_proxy(line).map_err(|source| ConfigError::Proxy {
                line: index + 1,
                source,
            })
        })
        .collect()
}

/// Runtime knobs of the swarm orchestrator.
#[derive(Debug, Clone)]
pub struct SwarmSettings {
    pub server_address: String,
    pub agents_per_proxy: usize,
    pub rally_point: (i32, i32),
    pub update_interval: Duration,
    pub idle_timeout: Duration,
    pub handshake_timeout: Duration,
    pub handoff_capacity: usize,
}

impl SwarmSettings {
    pub fn new(server_address: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
            agents_per_proxy: default_bots_per_proxy(),
            rally_point: default_rally_point(),
            update_interval: Duration::from_millis(default_update_interval_ms()),
            idle_timeout: Duration::from_secs(default_idle_timeout_secs()),
            handshake_timeout: Duration::from_secs(default_handshake_timeout_secs()),
            handoff_capacity: default_handoff_capacity(),
        }
    }
}
