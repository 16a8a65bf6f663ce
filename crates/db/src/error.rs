use thiserror::Error;
use vibeman_utils::{Classify, ErrorKind};

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("repository not found")]
    RepositoryNotFound,
    #[error("worktree not found")]
    WorktreeNotFound,
    #[error("a repository already exists at this path")]
    RepositoryConflict,
    #[error("a worktree named '{0}' already exists in this repository")]
    WorktreeConflict(String),
    #[error("status transition conflict: expected '{expected}', found '{actual}'")]
    StatusConflict { expected: String, actual: String },
    #[error("worktree name '{0}' is ambiguous across repositories")]
    AmbiguousWorktreeName(String),
}

impl Classify for DbError {
    fn kind(&self) -> ErrorKind {
        match self {
            DbError::RepositoryNotFound | DbError::WorktreeNotFound => ErrorKind::NotFound,
            DbError::RepositoryConflict | DbError::WorktreeConflict(_) => ErrorKind::Conflict,
            DbError::StatusConflict { .. } => ErrorKind::Busy,
            DbError::AmbiguousWorktreeName(_) => ErrorKind::Conflict,
            DbError::Sqlx(sqlx::Error::RowNotFound) => ErrorKind::NotFound,
            DbError::Sqlx(_) | DbError::Migrate(_) => ErrorKind::Internal,
        }
    }
}
