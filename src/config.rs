//! Configuration file handling

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::session::SessionConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub signaling: SignalingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the relay binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// Relay endpoint the client side attaches to
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    /// How long a call may wait for an answer before it is abandoned
    #[serde(default = "default_negotiation_timeout_ms")]
    pub negotiation_timeout_ms: u64,
    /// STUN/TURN servers handed to the media engine
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<String>,
}

fn default_bind_address() -> String {
    "127.0.0.1:9460".to_string()
}

fn default_relay_url() -> String {
    "ws://127.0.0.1:9460".to_string()
}

fn default_negotiation_timeout_ms() -> u64 {
    30_000
}

fn default_ice_servers() -> Vec<String> {
    vec![
        "stun:stun.l.google.com:19302".to_string(),
        "stun:stun.cloudflare.com:3478".to_string(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            negotiation_timeout_ms: default_negotiation_timeout_ms(),
            ice_servers: default_ice_servers(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            signaling: SignalingConfig::default(),
        }
    }
}

impl Config {
    /// Load config from file, or create default if doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = get_config_path();

        if config_path.exists() {
            let content =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let config_path = get_config_path();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&config_path, content)?;

        Ok(())
    }

    /// Runtime knobs for the session manager
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            negotiation_timeout_ms: self.signaling.negotiation_timeout_ms,
            ..Default::default()
        }
    }
}

/// Get the beckon directory (~/.beckon)
pub fn get_beckon_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".beckon")
}

/// Get the config file path (~/.beckon/config.toml)
pub fn get_config_path() -> PathBuf {
    get_beckon_dir().join("config.toml")
}
