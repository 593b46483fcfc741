use crate::config::ConfigError;
use crate::scenario::SetupError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("metric registration failed: {0}")]
    Metrics(#[from] stampede_metrics::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
