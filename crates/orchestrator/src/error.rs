use thiserror::Error;
use vibeman_db::DbError;
use vibeman_git::GitAdapterError;
use vibeman_runtime::RuntimeError;
use vibeman_services::ServiceError;
use vibeman_utils::{Classify, ErrorKind};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Git(#[from] GitAdapterError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// A concurrent operation on the same worktree won the status CAS first.
    #[error("worktree is busy with another operation")]
    Busy,
    #[error("refusing to remove worktree: {0}")]
    UnsafeRemoval(String),
    #[error("worktree join task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Classify for OrchestratorError {
    fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Db(e) => e.kind(),
            OrchestratorError::Git(e) => e.kind(),
            OrchestratorError::Runtime(e) => e.kind(),
            OrchestratorError::Service(e) => e.kind(),
            OrchestratorError::Busy => ErrorKind::Busy,
            OrchestratorError::UnsafeRemoval(_) => ErrorKind::InvalidArgument,
            OrchestratorError::Join(_) => ErrorKind::Internal,
        }
    }
}
