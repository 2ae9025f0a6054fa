use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("smtp transport error: {0}")]
    Smtp(String),
    #[error("message build error: {0}")]
    Build(String),
}
