use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use vibeman_services::ServiceInstance;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/services", get(list))
}

#[derive(Serialize)]
struct ServiceView {
    name: String,
    status: vibeman_services::ServiceStatus,
    ref_count: u32,
    repositories: Vec<String>,
}

impl From<ServiceInstance> for ServiceView {
    fn from(instance: ServiceInstance) -> Self {
        Self {
            name: instance.name,
            status: instance.status,
            ref_count: instance.ref_count,
            repositories: instance.repositories.into_iter().collect(),
        }
    }
}

async fn list(State(state): State<AppState>) -> Json<Vec<ServiceView>> {
    let instances = state.services.list().await;
    Json(instances.into_iter().map(ServiceView::from).collect())
}
