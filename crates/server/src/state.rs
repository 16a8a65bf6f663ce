use std::sync::Arc;

use vibeman_db::DBService;
use vibeman_orchestrator::WorktreeConfig;
use vibeman_runtime::ContainerRuntime;
use vibeman_services::{AiContainerManager, ServiceManager};

/// Shared application state handed to every route. `vibeman-server` itself
/// holds no domain logic — every handler is a thin translation from HTTP to
/// a call on one of these collaborators (SPEC_FULL.md §6).
#[derive(Clone)]
pub struct AppState {
    pub db: DBService,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub orchestrator: Arc<vibeman_orchestrator::WorktreeOrchestrator>,
    pub services: Arc<ServiceManager>,
    pub ai: Arc<AiContainerManager>,
    pub worktree_config: WorktreeConfig,
    pub worktrees_path: String,
}
