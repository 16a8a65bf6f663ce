mod attach;
mod health;
mod repositories;
mod services;
mod worktrees;

use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(health::router())
                .merge(repositories::router())
                .merge(worktrees::router())
                .merge(services::router())
                .merge(attach::router()),
        )
        .with_state(state)
}
