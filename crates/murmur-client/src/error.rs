use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),
}

/// Failures reported by a media-engine binding.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MediaError {
    #[error("microphone access denied")]
    PermissionDenied,

    #[error("no capture device available")]
    NoDevice,

    #[error("negotiation session closed")]
    SessionClosed,

    #[error("media error: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("client is shut down")]
    Closed,
}
