mod config;
mod routes;
mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;
use vibeman_db::DBService;
use vibeman_git::GitWorktreeAdapter;
use vibeman_orchestrator::{WorktreeConfig, WorktreeOrchestrator};
use vibeman_runtime::{ContainerRuntime, DockerRuntime};
use vibeman_services::{AiContainerConfig, AiContainerManager, ServiceManager};

use config::ServerConfig;
use state::AppState;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::var("VIBEMAN_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("vibeman.toml"));
    let config = ServerConfig::load(&config_path)?;

    let db_path = std::env::var("VIBEMAN_DB").unwrap_or_else(|_| "vibeman.sqlite".to_string());
    let db = DBService::connect(&db_path).await?;

    let git = GitWorktreeAdapter::new();
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::new("docker"));

    let service_configs = config::load_service_configs(Path::new(&config.services.config_path))?;
    let services = Arc::new(ServiceManager::new(runtime.clone(), service_configs));

    let ai = Arc::new(AiContainerManager::new(
        runtime.clone(),
        AiContainerConfig {
            image: config.ai.image.clone(),
            env: config.ai.env.clone(),
        },
    ));

    let orchestrator = Arc::new(WorktreeOrchestrator::new(
        db.clone(),
        git,
        runtime.clone(),
        services.clone(),
        ai.clone(),
    ));

    tracing::info!("reconciling worktrees left in-flight by a previous crash");
    orchestrator.reconcile().await?;

    let worktree_config = WorktreeConfig {
        image: config.worktree.image.clone(),
        env: config.worktree.env.clone(),
        ports: Vec::new(),
        extra_volumes: Vec::new(),
        services: config.worktree.services.clone(),
        post_start_hook: config.worktree.post_start_hook.clone(),
        remove_container_on_stop: config.worktree.remove_container_on_stop,
    };

    let state = AppState {
        db,
        runtime,
        orchestrator,
        services,
        ai,
        worktree_config,
        worktrees_path: config.storage.worktrees_path.clone(),
    };

    let app = routes::router(state).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "vibeman-server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
