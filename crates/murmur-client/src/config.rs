//! Client configuration: relay address and media bootstrap servers.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for a murmur client instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket URL of the signaling relay. The client appends its
    /// anonymous user id as the final path segment.
    pub relay_url: String,
    /// Connectivity bootstrap servers handed to the media engine.
    pub ice_servers: Vec<IceServer>,
    /// Seconds to wait before retrying after an unexpected channel loss.
    /// Fixed interval; the relay is assumed lightly loaded.
    pub reconnect_delay_secs: u64,
    /// Mean spectrum magnitude (0..=255 bins) above which a party counts
    /// as talking. Lower is more sensitive.
    pub talk_threshold: f32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://localhost:8000/ws".into(),
            ice_servers: IceServer::default_stun(),
            reconnect_delay_secs: 3,
            talk_threshold: 10.0,
        }
    }
}

impl ClientConfig {
    /// Load from a TOML file. Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.to_path_buf()))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// A STUN/TURN server entry in the media engine's bootstrap list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// Default public STUN servers.
    pub fn default_stun() -> Vec<Self> {
        vec![
            Self {
                urls: vec!["stun:stun.l.google.com:19302".into()],
                username: None,
                credential: None,
            },
            Self {
                urls: vec!["stun:stun1.l.google.com:19302".into()],
                username: None,
                credential: None,
            },
        ]
    }
}
