use thiserror::Error;
use vibeman_utils::{Classify, ErrorKind};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container '{0}' not found")]
    NotFound(String),
    #[error("container name '{0}' already in use")]
    Conflict(String),
    #[error("container engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("container engine call timed out")]
    Timeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

impl Classify for RuntimeError {
    fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::NotFound(_) => ErrorKind::NotFound,
            RuntimeError::Conflict(_) => ErrorKind::Conflict,
            RuntimeError::EngineUnavailable(_) => ErrorKind::EngineUnavailable,
            RuntimeError::Timeout => ErrorKind::Timeout,
            RuntimeError::Io(_) | RuntimeError::Other(_) => ErrorKind::Internal,
        }
    }
}
