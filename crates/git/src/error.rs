use thiserror::Error;
use vibeman_utils::{Classify, ErrorKind};

use crate::cli::GitCliError;

#[derive(Debug, Error)]
pub enum GitAdapterError {
    #[error(transparent)]
    Git2(#[from] git2::Error),
    #[error(transparent)]
    Cli(#[from] GitCliError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("destination '{0}' already exists and is not empty")]
    AlreadyExists(String),
    #[error("branch '{0}' not found")]
    BranchNotFound(String),
}

impl Classify for GitAdapterError {
    fn kind(&self) -> ErrorKind {
        match self {
            GitAdapterError::AlreadyExists(_) => ErrorKind::Conflict,
            GitAdapterError::BranchNotFound(_) => ErrorKind::NotFound,
            GitAdapterError::Cli(GitCliError::NotAvailable) => ErrorKind::EngineUnavailable,
            GitAdapterError::Cli(_) | GitAdapterError::Git2(_) | GitAdapterError::Io(_) => {
                ErrorKind::Internal
            }
        }
    }
}
