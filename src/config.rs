//! Server and client settings.
//!
//! The server reads an optional JSON file; every missing field keeps its default.

use crate::error::{LodestoneError, Result};
use crate::protocol::state::HandshakeIntent;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Require online-mode encryption and session server verification.
    pub verify_users: bool,
    /// Announced after login. Negative disables compression.
    pub compression_threshold: i32,
    pub max_players: i32,
    pub motd: String,
    pub keep_alive_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0:25565".to_owned(),
            verify_users: false,
            compression_threshold: 256,
            max_players: 20,
            motd: "A Minecraft Server".to_owned(),
            keep_alive_interval_ms: 2000,
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LodestoneError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
            .map_err(|e| LodestoneError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: ServerConfig =
            serde_json::from_str(content).map_err(|e| LodestoneError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.keep_alive_interval_ms == 0 {
            return Err(LodestoneError::Config(
                "keep_alive_interval_ms must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }
}

/// What a client connects to and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub intent: HandshakeIntent,
    /// Name sent in LoginStart. Ignored for status queries.
    pub username: String,
    pub access_token: Option<String>,
}

impl ClientConfig {
    pub fn login(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        ClientConfig {
            host: host.into(),
            port,
            intent: HandshakeIntent::Login,
            username: username.into(),
            access_token: None,
        }
    }

    pub fn status(host: impl Into<String>, port: u16) -> Self {
        ClientConfig {
            host: host.into(),
            port,
            intent: HandshakeIntent::Status,
            username: String::new(),
            access_token: None,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
