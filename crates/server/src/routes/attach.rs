use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use vibeman_db::models::worktree::Worktree;
use vibeman_runtime::PtySize;
use vibeman_utils::{error::ApiError, naming};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws/attach/{worktree}", get(attach_worktree))
        .route("/ws/ai/attach/{worktree}", get(attach_ai))
}

#[derive(Debug, Deserialize, Default)]
struct SizeQuery {
    cols: Option<u16>,
    rows: Option<u16>,
}

impl SizeQuery {
    fn size(&self) -> PtySize {
        PtySize {
            cols: self.cols.unwrap_or(80),
            rows: self.rows.unwrap_or(24),
        }
    }
}

fn not_running(worktree: &str, kind: &str) -> ApiError {
    ApiError::new(
        vibeman_utils::ErrorKind::InvalidArgument,
        format!("worktree '{worktree}' has no running {kind} container"),
    )
}

/// Resolves the bare worktree name from the path to its
/// `vibeman-<repo>-<worktree>` container before the upgrade, so a missing
/// or stopped worktree yields a plain HTTP error rather than a websocket
/// that opens and immediately closes (spec §4.6 step 1). Worktree names are
/// only unique within a repository; a name shared across repositories is
/// reported as a conflict rather than guessed at.
async fn attach_worktree(
    State(state): State<AppState>,
    Path(worktree): Path<String>,
    Query(size): Query<SizeQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let worktree = Worktree::find_by_name_globally(&state.db.pool, &worktree)
        .await?
        .ok_or(vibeman_db::DbError::WorktreeNotFound)?;
    let repository =
        vibeman_db::models::repository::Repository::find_by_id(&state.db.pool, worktree.repository_id)
            .await?
            .ok_or(vibeman_db::DbError::RepositoryNotFound)?;

    let container_name = naming::worktree_container_name(&repository.name, &worktree.name);
    let container_id = state
        .runtime
        .get_by_name(&container_name)
        .await?
        .ok_or_else(|| not_running(&worktree.name, "worktree"))?
        .id;

    let size = size.size();
    Ok(ws.on_upgrade(move |socket: WebSocket| async move {
        if let Err(e) = vibeman_attach::attach(state.runtime.as_ref(), &container_id, size, socket).await {
            tracing::warn!(error = %e, "attach session ended with an error");
        }
    }))
}

async fn attach_ai(
    State(state): State<AppState>,
    Path(worktree): Path<String>,
    Query(size): Query<SizeQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let worktree = Worktree::find_by_name_globally(&state.db.pool, &worktree)
        .await?
        .ok_or(vibeman_db::DbError::WorktreeNotFound)?;

    let container_name = naming::ai_container_name(&worktree.name);
    let container_id = state
        .runtime
        .get_by_name(&container_name)
        .await?
        .ok_or_else(|| not_running(&worktree.name, "AI"))?
        .id;

    let size = size.size();
    Ok(ws.on_upgrade(move |socket: WebSocket| async move {
        if let Err(e) = vibeman_attach::attach(state.runtime.as_ref(), &container_id, size, socket).await {
            tracing::warn!(error = %e, "AI attach session ended with an error");
        }
    }))
}
