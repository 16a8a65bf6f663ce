use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use vibeman_db::models::worktree::{CreateWorktree, Worktree};
use vibeman_utils::{error::ApiError, naming::slugify};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/worktrees", get(list).post(create))
        .route("/worktrees/{id}/start", post(start))
        .route("/worktrees/{id}/stop", post(stop))
        .route("/worktrees/{id}", axum::routing::delete(remove))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    repository_id: Uuid,
}

async fn list(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<Worktree>>, ApiError> {
    let worktrees = Worktree::list_by_repo(&state.db.pool, q.repository_id).await?;
    Ok(Json(worktrees))
}

#[derive(Debug, Deserialize)]
struct CreateWorktreeRequest {
    repository_id: Uuid,
    name: String,
    branch: String,
}

/// `path` is derived from `storage.worktrees_path` plus the slugified
/// repository and worktree names, matching the `vibeman-<repo>-<worktree>`
/// container naming convention (spec §4.1/§6) rather than taking an
/// attacker-controlled path from the request body.
async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateWorktreeRequest>,
) -> Result<Json<Worktree>, ApiError> {
    let repository = vibeman_db::models::repository::Repository::find_by_id(
        &state.db.pool,
        req.repository_id,
    )
    .await?
    .ok_or(vibeman_db::DbError::RepositoryNotFound)?;

    let dir_name = format!("{}-{}", slugify(&repository.name), slugify(&req.name));
    let path = std::path::Path::new(&state.worktrees_path)
        .join(dir_name)
        .to_string_lossy()
        .to_string();

    let worktree = Worktree::create(
        &state.db.pool,
        &CreateWorktree {
            repository_id: req.repository_id,
            name: req.name,
            branch: req.branch,
            path,
        },
    )
    .await?;
    Ok(Json(worktree))
}

async fn start(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Worktree>, ApiError> {
    let worktree = state
        .orchestrator
        .start(id, &state.worktree_config)
        .await?;
    Ok(Json(worktree))
}

async fn stop(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Worktree>, ApiError> {
    let worktree = state.orchestrator.stop(id, &state.worktree_config).await?;
    Ok(Json(worktree))
}

#[derive(Debug, Deserialize, Default)]
struct RemoveQuery {
    #[serde(default)]
    force: bool,
}

async fn remove(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<RemoveQuery>,
) -> Result<axum::http::StatusCode, ApiError> {
    state
        .orchestrator
        .remove(id, &state.worktree_config, q.force)
        .await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
