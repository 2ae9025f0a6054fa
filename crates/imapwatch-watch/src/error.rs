use imapwatch_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("watch supervisor already started")]
    AlreadyStarted,
}
