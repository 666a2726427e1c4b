use std::path::PathBuf;
use std::time::Duration;

use crate::id::GroupId;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("session open failed: {0}")]
    SessionOpen(String),

    #[error("session closed")]
    SessionClosed,

    #[error("capture error: {0}")]
    Capture(String),

    #[error("player error: {0}")]
    Player(String),

    #[error("activity error: {0}")]
    Activity(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("group already registered: {0}")]
    Duplicate(GroupId),

    #[error("registry parse error: {0}")]
    ParseError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{stage} timed out after {}ms", .after.as_millis())]
    Timeout {
        stage: &'static str,
        after: Duration,
    },

    #[error("connection for group {0} was replaced or torn down")]
    Superseded(GroupId),

    #[error("{0}")]
    Other(String),
}

impl BridgeError {
    /// True for failures the scheduler is expected to retry on its next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BridgeError::Timeout { .. }
                | BridgeError::Superseded(_)
                | BridgeError::Platform(PlatformError::SessionOpen(_))
                | BridgeError::Platform(PlatformError::SessionClosed)
                | BridgeError::Registry(RegistryError::Unavailable(_))
        )
    }
}
