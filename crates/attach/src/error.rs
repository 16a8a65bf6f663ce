use thiserror::Error;
use vibeman_runtime::RuntimeError;
use vibeman_utils::{Classify, ErrorKind};

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("no worktree named '{0}' is running")]
    WorktreeNotRunning(String),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),
    #[error("pong not received within the heartbeat timeout")]
    HeartbeatTimeout,
}

impl Classify for AttachError {
    fn kind(&self) -> ErrorKind {
        match self {
            AttachError::WorktreeNotRunning(_) => ErrorKind::NotFound,
            AttachError::Runtime(e) => e.kind(),
            AttachError::WebSocket(_) => ErrorKind::Internal,
            AttachError::HeartbeatTimeout => ErrorKind::Timeout,
        }
    }
}
