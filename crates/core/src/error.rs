use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("invalid timer interval: {0:?} (must be greater than zero)")]
    InvalidInterval(Duration),

    #[error("event loop is shut down")]
    Closed,

    #[error("event loop is already running on another thread")]
    AlreadyRunning,

    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    #[error("callback panicked: {0}")]
    CallbackPanicked(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, LoopError>;
