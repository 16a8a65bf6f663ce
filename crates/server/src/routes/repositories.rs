use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use vibeman_db::models::{
    repository::{CreateRepository, Repository},
    worktree::Worktree,
};
use vibeman_utils::error::ApiError;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/repositories", get(list).post(create))
        .route("/repositories/{id}", axum::routing::delete(remove))
}

async fn list(State(state): State<AppState>) -> Result<Json<Vec<Repository>>, ApiError> {
    let repos = Repository::list(&state.db.pool).await?;
    Ok(Json(repos))
}

#[derive(Debug, Deserialize)]
struct CreateRepositoryRequest {
    path: String,
    name: String,
    description: Option<String>,
}

async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateRepositoryRequest>,
) -> Result<Json<Repository>, ApiError> {
    let repo = Repository::create(
        &state.db.pool,
        &CreateRepository {
            path: req.path,
            name: req.name,
            description: req.description,
        },
    )
    .await?;
    Ok(Json(repo))
}

/// Deletes a repository. Every worktree under it is torn down through the
/// Orchestrator first (containers, services, git worktrees on disk) so the
/// State Store cascade that follows only ever drops rows with nothing left
/// to reclaim (spec §3).
async fn remove(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode, ApiError> {
    let worktrees = Worktree::list_by_repo(&state.db.pool, id).await?;
    for worktree in worktrees {
        if let Err(e) = state
            .orchestrator
            .remove(worktree.id, &state.worktree_config, true)
            .await
        {
            tracing::warn!(worktree = %worktree.name, error = %e, "failed to remove worktree while deleting repository, continuing");
        }
    }

    Repository::delete(&state.db.pool, id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
