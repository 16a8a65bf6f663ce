use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;
use vibeman_db::{
    models::{
        repository::Repository,
        worktree::{Worktree, WorktreeStatus},
    },
    DBService,
};
use vibeman_git::GitWorktreeAdapter;
use vibeman_runtime::{ContainerConfig, ContainerKind, ContainerRuntime, ContainerState, VolumeBinding};
use vibeman_services::{AiContainerManager, ServiceManager};
use vibeman_utils::naming::worktree_container_name;

use crate::{config::WorktreeConfig, error::OrchestratorError};

const WORKSPACE_MOUNT: &str = "/workspace";

/// Drives a worktree's container/service/git lifecycle against the state
/// machine of spec §4.4, composing the State Store, Git Worktree Adapter,
/// Container Runtime, and Service Manager. Holds no state of its own beyond
/// these collaborators — every fact about a worktree lives in the State
/// Store.
pub struct WorktreeOrchestrator {
    db: DBService,
    git: GitWorktreeAdapter,
    runtime: Arc<dyn ContainerRuntime>,
    services: Arc<ServiceManager>,
    ai: Arc<AiContainerManager>,
}

impl WorktreeOrchestrator {
    pub fn new(
        db: DBService,
        git: GitWorktreeAdapter,
        runtime: Arc<dyn ContainerRuntime>,
        services: Arc<ServiceManager>,
        ai: Arc<AiContainerManager>,
    ) -> Self {
        Self {
            db,
            git,
            runtime,
            services,
            ai,
        }
    }

    async fn load(&self, worktree_id: Uuid) -> Result<(Worktree, Repository), OrchestratorError> {
        let worktree = Worktree::find_by_id(&self.db.pool, worktree_id)
            .await?
            .ok_or(vibeman_db::DbError::WorktreeNotFound)?;
        let repository = Repository::find_by_id(&self.db.pool, worktree.repository_id)
            .await?
            .ok_or(vibeman_db::DbError::RepositoryNotFound)?;
        Ok((worktree, repository))
    }

    async fn cas(
        &self,
        id: Uuid,
        from: WorktreeStatus,
        to: WorktreeStatus,
    ) -> Result<Worktree, OrchestratorError> {
        match Worktree::update_status(&self.db.pool, id, from, to).await {
            Ok(wt) => Ok(wt),
            Err(vibeman_db::DbError::StatusConflict { .. }) => Err(OrchestratorError::Busy),
            Err(e) => Err(e.into()),
        }
    }

    /// spec §4.4 `start(worktree_id)`.
    #[tracing::instrument(skip(self, config))]
    pub async fn start(
        &self,
        worktree_id: Uuid,
        config: &WorktreeConfig,
    ) -> Result<Worktree, OrchestratorError> {
        let (worktree, repository) = self.load(worktree_id).await?;
        self.cas(worktree_id, WorktreeStatus::Stopped, WorktreeStatus::Starting)
            .await?;

        if let Err(e) = self
            .start_inner(&worktree, &repository, config)
            .await
        {
            tracing::warn!(worktree = %worktree.name, error = %e, "start failed, marking worktree as error");
            let _ = self
                .cas(worktree_id, WorktreeStatus::Starting, WorktreeStatus::Error)
                .await;
            return Err(e);
        }

        self.cas(worktree_id, WorktreeStatus::Starting, WorktreeStatus::Running)
            .await
    }

    async fn start_inner(
        &self,
        worktree: &Worktree,
        repository: &Repository,
        config: &WorktreeConfig,
    ) -> Result<(), OrchestratorError> {
        let repo_path = PathBuf::from(&repository.path);
        let wt_path = PathBuf::from(&worktree.path);
        let branch = worktree.branch.clone();

        if !wt_path.exists() {
            let git = self.git.clone();
            let repo_path = repo_path.clone();
            let wt_path = wt_path.clone();
            tokio::task::spawn_blocking(move || git.create_worktree(&repo_path, &branch, &wt_path))
                .await??;
        }

        let mut acquired: Vec<String> = Vec::new();
        for service in &config.services {
            match self.services.acquire(service, &repository.name).await {
                Ok(()) => acquired.push(service.clone()),
                Err(e) => {
                    for done in acquired.iter().rev() {
                        let _ = self.services.release(done, &repository.name).await;
                    }
                    return Err(e.into());
                }
            }
        }

        let container_name = worktree_container_name(&repository.name, &worktree.name);
        let container_id = match self.runtime.get_by_name(&container_name).await? {
            Some(info) => info.id,
            None => {
                let mut cc = ContainerConfig::new(config.image.clone(), container_name, ContainerKind::Worktree);
                cc.env = config.env.clone();
                cc.ports = config.ports.clone();
                cc.working_dir = Some(WORKSPACE_MOUNT.to_string());
                cc.volumes = {
                    let mut volumes = vec![VolumeBinding {
                        host_path: worktree.path.clone(),
                        container_path: WORKSPACE_MOUNT.to_string(),
                        read_only: false,
                    }];
                    volumes.extend(config.extra_volumes.iter().cloned());
                    volumes
                };
                self.runtime.create(&cc).await?
            }
        };
        self.runtime.start(&container_id).await?;

        if let Some(hook) = &config.post_start_hook {
            if let Err(e) = self.runtime.exec(&container_id, hook).await {
                tracing::warn!(worktree = %worktree.name, error = %e, "post-start hook failed, continuing");
            }
        }

        Ok(())
    }

    /// spec §4.4 `stop(worktree_id)`. Permits `running -> stopping` and, to
    /// allow re-stopping a worktree an earlier `start` left in `error`,
    /// `error -> stopping` as well. `stopped -> stopped` is a no-op success
    /// rather than `busy` (spec §8 idempotence law).
    #[tracing::instrument(skip(self, config))]
    pub async fn stop(
        &self,
        worktree_id: Uuid,
        config: &WorktreeConfig,
    ) -> Result<Worktree, OrchestratorError> {
        let (worktree, repository) = self.load(worktree_id).await?;
        let from = match worktree.status {
            WorktreeStatus::Stopped => return Ok(worktree),
            WorktreeStatus::Running => WorktreeStatus::Running,
            WorktreeStatus::Error => WorktreeStatus::Error,
            _ => return Err(OrchestratorError::Busy),
        };
        self.cas(worktree_id, from, WorktreeStatus::Stopping).await?;

        let container_name = worktree_container_name(&repository.name, &worktree.name);
        if let Some(info) = self.runtime.get_by_name(&container_name).await? {
            let _ = self.runtime.stop(&info.id).await;
            if config.remove_container_on_stop {
                let _ = self.runtime.remove(&info.id).await;
            }
        }

        let mut first_error = None;
        for service in &config.services {
            if let Err(e) = self.services.release(service, &repository.name).await {
                tracing::warn!(worktree = %worktree.name, service = %service, error = %e, "failed to release service reference");
                first_error.get_or_insert(e);
            }
        }

        if let Some(e) = first_error {
            let _ = self
                .cas(worktree_id, WorktreeStatus::Stopping, WorktreeStatus::Error)
                .await;
            return Err(e.into());
        }

        self.cas(worktree_id, WorktreeStatus::Stopping, WorktreeStatus::Stopped)
            .await
    }

    /// spec §4.4 `remove(worktree_id, force)`.
    #[tracing::instrument(skip(self, config))]
    pub async fn remove(
        &self,
        worktree_id: Uuid,
        config: &WorktreeConfig,
        force: bool,
    ) -> Result<(), OrchestratorError> {
        let (worktree, repository) = self.load(worktree_id).await?;

        if worktree.status != WorktreeStatus::Stopped {
            if let Err(e) = self.stop(worktree_id, config).await {
                tracing::warn!(worktree = %worktree.name, error = %e, "stop-before-remove did not complete cleanly, proceeding with removal");
            }
        }

        if !force {
            self.safety_check(&worktree, Path::new(&repository.path))
                .await?;
        }

        let container_name = worktree_container_name(&repository.name, &worktree.name);
        if let Some(info) = self.runtime.get_by_name(&container_name).await? {
            let _ = self.runtime.stop(&info.id).await;
            self.runtime.remove(&info.id).await?;
        }
        let _ = self.ai.remove(&worktree.name).await;

        let git = self.git.clone();
        let repo_path = PathBuf::from(&repository.path);
        let wt_path = PathBuf::from(&worktree.path);
        tokio::task::spawn_blocking(move || git.remove_worktree(&repo_path, &wt_path))
            .await??;

        Worktree::delete(&self.db.pool, worktree_id).await?;
        Ok(())
    }

    async fn safety_check(&self, worktree: &Worktree, repo_path: &Path) -> Result<(), OrchestratorError> {
        let git = self.git.clone();
        let path = PathBuf::from(&worktree.path);
        let path_for_dirty = path.clone();
        let dirty = tokio::task::spawn_blocking(move || git.has_uncommitted_changes(&path_for_dirty))
            .await??;
        if dirty {
            return Err(OrchestratorError::UnsafeRemoval(
                "working tree has uncommitted changes".to_string(),
            ));
        }

        let git = self.git.clone();
        let path_for_unpushed = path.clone();
        let unpushed = tokio::task::spawn_blocking(move || git.has_unpushed_commits(&path_for_unpushed))
            .await??;
        if unpushed {
            return Err(OrchestratorError::UnsafeRemoval(
                "branch has unpushed commits".to_string(),
            ));
        }

        let git = self.git.clone();
        let branch = worktree.branch.clone();
        let repo_path = repo_path.to_path_buf();
        let merged = tokio::task::spawn_blocking(move || git.is_branch_merged(&repo_path, &branch))
            .await??;
        if !merged {
            return Err(OrchestratorError::UnsafeRemoval(
                "branch is not merged into the repository's default branch".to_string(),
            ));
        }

        Ok(())
    }

    /// Startup reconciliation: any worktree left `starting` or `stopping`
    /// across a crash is resolved by inspecting its container (spec §4.4
    /// "Tie-breaks and edge cases").
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<(), OrchestratorError> {
        let in_flight = Worktree::list_all(&self.db.pool).await?;
        for worktree in in_flight {
            let stuck = matches!(
                worktree.status,
                WorktreeStatus::Starting | WorktreeStatus::Stopping
            );
            if !stuck {
                continue;
            }

            let repository = match Repository::find_by_id(&self.db.pool, worktree.repository_id).await? {
                Some(r) => r,
                None => continue,
            };
            let container_name = worktree_container_name(&repository.name, &worktree.name);
            let running = matches!(
                self.runtime.get_by_name(&container_name).await?.map(|i| i.state),
                Some(ContainerState::Running)
            );

            let to = if running {
                WorktreeStatus::Running
            } else {
                WorktreeStatus::Error
            };
            tracing::warn!(worktree = %worktree.name, from = %worktree.status, to = %to, "reconciling worktree left in-flight by a crash");
            let _ = self.cas(worktree.id, worktree.status, to).await;
        }
        Ok(())
    }

    pub fn path_for(&self, worktree: &Worktree) -> &Path {
        Path::new(&worktree.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::process::Command;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;
    use vibeman_db::models::repository::CreateRepository;
    use vibeman_db::models::worktree::CreateWorktree;
    use vibeman_runtime::{ContainerInfo, ExecOutput, PtyHandle, PtySize, RuntimeError};
    use vibeman_services::{AiContainerConfig, AiContainerManager};

    struct FakeRuntime {
        containers: StdMutex<HashMap<String, ContainerInfo>>,
    }

    impl FakeRuntime {
        fn new() -> Self {
            Self {
                containers: StdMutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn create(&self, config: &ContainerConfig) -> Result<String, RuntimeError> {
            let id = format!("c-{}", config.name);
            self.containers.lock().unwrap().insert(
                id.clone(),
                ContainerInfo {
                    id: id.clone(),
                    name: config.name.clone(),
                    image: config.image.clone(),
                    state: ContainerState::Created,
                    labels: config.labels.clone(),
                },
            );
            Ok(id)
        }

        async fn start(&self, id: &str) -> Result<(), RuntimeError> {
            if let Some(info) = self.containers.lock().unwrap().get_mut(id) {
                info.state = ContainerState::Running;
            }
            Ok(())
        }

        async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
            if let Some(info) = self.containers.lock().unwrap().get_mut(id) {
                info.state = ContainerState::Exited;
            }
            Ok(())
        }

        async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
            self.containers.lock().unwrap().remove(id);
            Ok(())
        }

        async fn list(&self) -> Result<Vec<ContainerInfo>, RuntimeError> {
            Ok(self.containers.lock().unwrap().values().cloned().collect())
        }

        async fn get_by_id(&self, id: &str) -> Result<Option<ContainerInfo>, RuntimeError> {
            Ok(self.containers.lock().unwrap().get(id).cloned())
        }

        async fn get_by_name(&self, name: &str) -> Result<Option<ContainerInfo>, RuntimeError> {
            Ok(self
                .containers
                .lock()
                .unwrap()
                .values()
                .find(|c| c.name == name)
                .cloned())
        }

        async fn logs(&self, _id: &str, _follow: bool) -> Result<String, RuntimeError> {
            Ok(String::new())
        }

        async fn exec(&self, _id: &str, _argv: &[String]) -> Result<ExecOutput, RuntimeError> {
            Ok(ExecOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        }

        async fn attach_pty(&self, _id: &str, _size: PtySize) -> Result<PtyHandle, RuntimeError> {
            Err(RuntimeError::Other("not supported in fake".into()))
        }
    }

    fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        let run = |args: &[&str]| {
            let status = Command::new("git").arg("-C").arg(dir.path()).args(args).status().unwrap();
            assert!(status.success());
        };
        run(&["init", "-b", "main"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "test"]);
        std::fs::write(dir.path().join("README.md"), "hello").unwrap();
        run(&["add", "."]);
        run(&["commit", "-m", "init"]);
        dir
    }

    async fn test_orchestrator() -> (WorktreeOrchestrator, TempDir, Uuid, Uuid) {
        let db = DBService::connect_in_memory().await.unwrap();
        let repo_dir = init_repo();
        let repository = Repository::create(
            &db.pool,
            &CreateRepository {
                path: repo_dir.path().to_string_lossy().to_string(),
                name: "demo".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();

        let wt_path = repo_dir.path().parent().unwrap().join("demo-feat");
        let worktree = Worktree::create(
            &db.pool,
            &CreateWorktree {
                repository_id: repository.id,
                name: "feat".to_string(),
                branch: "feat".to_string(),
                path: wt_path.to_string_lossy().to_string(),
            },
        )
        .await
        .unwrap();

        let runtime: Arc<dyn ContainerRuntime> = Arc::new(FakeRuntime::new());
        let services = Arc::new(ServiceManager::new(runtime.clone(), vec![]));
        let ai = Arc::new(AiContainerManager::new(
            runtime.clone(),
            AiContainerConfig {
                image: "example/ai:latest".to_string(),
                env: HashMap::new(),
            },
        ));
        let orchestrator = WorktreeOrchestrator::new(db, GitWorktreeAdapter::new(), runtime, services, ai);
        (orchestrator, repo_dir, repository.id, worktree.id)
    }

    fn test_config() -> WorktreeConfig {
        WorktreeConfig {
            image: "example/dev:latest".to_string(),
            env: HashMap::new(),
            ports: Vec::new(),
            extra_volumes: Vec::new(),
            services: Vec::new(),
            post_start_hook: None,
            remove_container_on_stop: false,
        }
    }

    #[tokio::test]
    async fn start_provisions_worktree_and_reaches_running() {
        let (orchestrator, _repo_dir, _repo_id, wt_id) = test_orchestrator().await;
        let config = test_config();

        let worktree = orchestrator.start(wt_id, &config).await.unwrap();
        assert_eq!(worktree.status, WorktreeStatus::Running);
        assert!(Path::new(&worktree.path).join("README.md").exists());
    }

    #[tokio::test]
    async fn stop_then_remove_round_trips() {
        let (orchestrator, _repo_dir, _repo_id, wt_id) = test_orchestrator().await;
        let config = test_config();

        orchestrator.start(wt_id, &config).await.unwrap();
        let stopped = orchestrator.stop(wt_id, &config).await.unwrap();
        assert_eq!(stopped.status, WorktreeStatus::Stopped);

        orchestrator.remove(wt_id, &config, true).await.unwrap();
        let gone = Worktree::find_by_id(&orchestrator.db.pool, wt_id).await.unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn start_twice_concurrently_second_call_is_busy() {
        let (orchestrator, _repo_dir, _repo_id, wt_id) = test_orchestrator().await;
        let config = test_config();

        orchestrator.start(wt_id, &config).await.unwrap();
        let err = orchestrator.start(wt_id, &config).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Busy));
    }

    #[tokio::test]
    async fn stop_on_already_stopped_worktree_is_a_no_op() {
        let (orchestrator, _repo_dir, _repo_id, wt_id) = test_orchestrator().await;
        let config = test_config();

        let stopped = orchestrator.stop(wt_id, &config).await.unwrap();
        assert_eq!(stopped.status, WorktreeStatus::Stopped);
    }
}
