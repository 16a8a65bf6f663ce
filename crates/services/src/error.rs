use thiserror::Error;
use vibeman_utils::{Classify, ErrorKind};
use vibeman_runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no service named '{0}' is registered")]
    NotRegistered(String),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("health check for '{0}' did not become healthy within the deadline: {1}")]
    Unhealthy(String, String),
    #[error("'{0}' was not referenced by '{1}'")]
    NotReferenced(String, String),
}

impl Classify for ServiceError {
    fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotRegistered(_) => ErrorKind::NotFound,
            ServiceError::Runtime(e) => e.kind(),
            ServiceError::Unhealthy(_, _) => ErrorKind::Timeout,
            ServiceError::NotReferenced(_, _) => ErrorKind::InvalidArgument,
        }
    }
}
