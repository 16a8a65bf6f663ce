use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use vibeman_runtime::{ContainerConfig, ContainerKind, ContainerRuntime, VolumeBinding};
use vibeman_utils::naming::ai_container_name;

use crate::error::ServiceError;

/// Declared configuration for the AI assistant image, supplied once at
/// process start (spec §4.7). The source mount is computed per-worktree at
/// start time, not stored here.
#[derive(Debug, Clone)]
pub struct AiContainerConfig {
    pub image: String,
    pub env: HashMap<String, String>,
}

/// Tracks the AI container bound to a worktree's source mount. Unlike
/// `ServiceManager`, there is no ref-counting here — exactly one AI
/// container per worktree, started/stopped independently of the worktree's
/// main container, and removed automatically when the worktree is removed.
pub struct AiContainerManager {
    runtime: Arc<dyn ContainerRuntime>,
    config: AiContainerConfig,
    containers: DashMap<String, String>,
}

impl AiContainerManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: AiContainerConfig) -> Self {
        Self {
            runtime,
            config,
            containers: DashMap::new(),
        }
    }

    /// Creates (if absent) and starts the AI container for `worktree_name`,
    /// mounting `source_path` the same way the worktree's own container does.
    pub async fn start(&self, worktree_name: &str, source_path: &str) -> Result<(), ServiceError> {
        let name = ai_container_name(worktree_name);

        let id = if let Some(existing) = self.containers.get(worktree_name) {
            existing.clone()
        } else if let Some(info) = self.runtime.get_by_name(&name).await? {
            self.containers.insert(worktree_name.to_string(), info.id.clone());
            info.id
        } else {
            let mut cc = ContainerConfig::new(self.config.image.clone(), name, ContainerKind::Ai);
            cc.env = self.config.env.clone();
            cc.volumes = vec![VolumeBinding {
                host_path: source_path.to_string(),
                container_path: "/workspace".to_string(),
                read_only: false,
            }];
            let id = self.runtime.create(&cc).await?;
            self.containers.insert(worktree_name.to_string(), id.clone());
            id
        };

        self.runtime.start(&id).await?;
        tracing::info!(worktree = %worktree_name, "started ai container");
        Ok(())
    }

    pub async fn stop(&self, worktree_name: &str) -> Result<(), ServiceError> {
        let Some(id) = self.containers.get(worktree_name).map(|e| e.clone()) else {
            return Ok(());
        };
        self.runtime.stop(&id).await?;
        tracing::info!(worktree = %worktree_name, "stopped ai container");
        Ok(())
    }

    /// Called by the Orchestrator as part of `remove(worktree_id, ...)`
    /// (spec §4.7 "automatically removed when its parent worktree is
    /// removed").
    pub async fn remove(&self, worktree_name: &str) -> Result<(), ServiceError> {
        let Some((_, id)) = self.containers.remove(worktree_name) else {
            return Ok(());
        };
        let _ = self.runtime.stop(&id).await;
        self.runtime.remove(&id).await?;
        tracing::info!(worktree = %worktree_name, "removed ai container");
        Ok(())
    }
}
