use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use vibeman_runtime::{ContainerConfig, ContainerRuntime, ContainerState};

use crate::{
    config::{HealthCheckSpec, ReleasePolicy, ServiceConfig},
    error::ServiceError,
    instance::{ServiceInstance, ServiceStatus},
};

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Owns the in-memory registry of named service instances and serializes
/// mutations per service with per-entry locks (spec §4.5). Ref-counts are
/// never persisted — they are derived from live worktree membership, and
/// can be rebuilt on restart by re-`acquire`ing for every running worktree
/// (spec §9).
pub struct ServiceManager {
    runtime: Arc<dyn ContainerRuntime>,
    configs: HashMap<String, ServiceConfig>,
    instances: DashMap<String, Arc<Mutex<ServiceInstance>>>,
}

impl ServiceManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, configs: Vec<ServiceConfig>) -> Self {
        let configs = configs.into_iter().map(|c| (c.name.clone(), c)).collect();
        Self {
            runtime,
            configs,
            instances: DashMap::new(),
        }
    }

    fn entry(&self, name: &str) -> Result<Arc<Mutex<ServiceInstance>>, ServiceError> {
        if let Some(existing) = self.instances.get(name) {
            return Ok(existing.clone());
        }
        let config = self
            .configs
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::NotRegistered(name.to_string()))?;
        let entry = self
            .instances
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ServiceInstance::new(config))));
        Ok(entry.clone())
    }

    /// Instantiates the service lazily on first reference, waits for it to
    /// become healthy, then records `repo_name` against it. The per-service
    /// lock is held across check-running/start/health-wait/increment so two
    /// concurrent acquirers of a cold service start it exactly once (spec
    /// §4.5 "Concurrency").
    pub async fn acquire(&self, service_name: &str, repo_name: &str) -> Result<(), ServiceError> {
        let entry = self.entry(service_name)?;
        let mut instance = entry.lock().await;

        if instance.container_id.is_none() {
            instance.status = ServiceStatus::Starting;
            let container_config = build_container_config(&instance.config);

            let id = self.runtime.create(&container_config).await?;
            if let Err(e) = self.runtime.start(&id).await {
                let _ = self.runtime.remove(&id).await;
                instance.status = ServiceStatus::Error;
                instance.last_health_error = Some(e.to_string());
                return Err(e.into());
            }
            instance.container_id = Some(id.clone());
            instance.started_at = Some(Utc::now());

            if let Err(e) = self.wait_healthy(&instance.config, &id).await {
                tracing::warn!(service = %service_name, error = %e, "service failed health probe, rolling back acquisition");
                let _ = self.runtime.stop(&id).await;
                let _ = self.runtime.remove(&id).await;
                instance.container_id = None;
                instance.status = ServiceStatus::Error;
                instance.last_health_error = Some(e.to_string());
                return Err(e);
            }
            instance.status = ServiceStatus::Running;
            instance.last_health = Some(Utc::now());
            instance.last_health_error = None;
        }

        instance.repositories.insert(repo_name.to_string());
        instance.ref_count = instance.repositories.len() as u32;
        tracing::info!(service = %service_name, repo = %repo_name, ref_count = instance.ref_count, "acquired service");
        Ok(())
    }

    /// Double-release from the same `(service, repo)` is a no-op returning
    /// `NotReferenced` (spec §4.5 invariant).
    pub async fn release(&self, service_name: &str, repo_name: &str) -> Result<(), ServiceError> {
        let entry = match self.instances.get(service_name) {
            Some(e) => e.clone(),
            None => {
                return Err(ServiceError::NotReferenced(
                    service_name.to_string(),
                    repo_name.to_string(),
                ));
            }
        };
        let mut instance = entry.lock().await;
        if !instance.repositories.remove(repo_name) {
            return Err(ServiceError::NotReferenced(
                service_name.to_string(),
                repo_name.to_string(),
            ));
        }
        instance.ref_count = instance.repositories.len() as u32;

        if instance.ref_count == 0 && instance.config.policy == ReleasePolicy::ReleaseOnZero {
            if let Some(id) = instance.container_id.take() {
                let _ = self.runtime.stop(&id).await;
                let _ = self.runtime.remove(&id).await;
            }
            instance.status = ServiceStatus::Stopped;
            tracing::info!(service = %service_name, "ref-count reached zero, service stopped");
        }
        Ok(())
    }

    /// Runs the declared probe and records the result in `last_health`/
    /// `last_health_error`. Unlike a failure during `acquire`, a failure here
    /// does not auto-terminate the service (spec §7).
    pub async fn health_check(&self, service_name: &str) -> Result<(), ServiceError> {
        let entry = self.entry(service_name)?;
        let mut instance = entry.lock().await;
        let Some(id) = instance.container_id.clone() else {
            return Ok(());
        };
        let config = instance.config.clone();
        match probe_once(&self.runtime, &config, &id).await {
            Ok(true) => {
                instance.last_health = Some(Utc::now());
                instance.last_health_error = None;
            }
            Ok(false) => {
                instance.last_health_error = Some("probe reported unhealthy".to_string());
            }
            Err(e) => {
                instance.last_health_error = Some(e.to_string());
            }
        }
        Ok(())
    }

    pub async fn list(&self) -> Vec<ServiceInstance> {
        let mut out = Vec::with_capacity(self.instances.len());
        for kv in self.instances.iter() {
            out.push(kv.value().lock().await.clone());
        }
        out
    }

    pub async fn get(&self, name: &str) -> Option<ServiceInstance> {
        let entry = self.instances.get(name)?.clone();
        Some(entry.lock().await.clone())
    }

    async fn wait_healthy(&self, config: &ServiceConfig, id: &str) -> Result<(), ServiceError> {
        let deadline = tokio::time::Instant::now() + config.health_deadline;
        loop {
            if probe_once(&self.runtime, config, id).await.unwrap_or(false) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ServiceError::Unhealthy(
                    config.name.clone(),
                    "deadline exceeded".to_string(),
                ));
            }
            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }
    }
}

fn build_container_config(config: &ServiceConfig) -> ContainerConfig {
    let mut cc = ContainerConfig::new(config.image.clone(), config.name.clone(), config.container_kind());
    cc.env = config.env.clone();
    cc.ports = config.ports.clone();
    cc.volumes = config.volumes.clone();
    cc
}

async fn probe_once(
    runtime: &Arc<dyn ContainerRuntime>,
    config: &ServiceConfig,
    id: &str,
) -> Result<bool, ServiceError> {
    let info = runtime.get_by_id(id).await?;
    let running = matches!(info.map(|i| i.state), Some(ContainerState::Running));
    if !running {
        return Ok(false);
    }

    match &config.health_check {
        HealthCheckSpec::None => Ok(true),
        HealthCheckSpec::Exec(argv) => {
            let out = runtime.exec(id, argv).await?;
            Ok(out.exit_code == 0)
        }
        HealthCheckSpec::Http { url } => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .map_err(|e| ServiceError::Unhealthy(config.name.clone(), e.to_string()))?;
            match client.get(url).send().await {
                Ok(resp) => Ok(resp.status().is_success()),
                Err(_) => Ok(false),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;
    use vibeman_runtime::{ContainerInfo, ExecOutput, PtyHandle, PtySize, RuntimeError};

    struct FakeRuntime {
        next_id: AtomicU32,
        containers: StdMutex<HashMap<String, ContainerInfo>>,
    }

    impl FakeRuntime {
        fn new() -> Self {
            Self {
                next_id: AtomicU32::new(0),
                containers: StdMutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn create(&self, config: &ContainerConfig) -> Result<String, RuntimeError> {
            let id = format!("c{}", self.next_id.fetch_add(1, Ordering::SeqCst));
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

    fn test_config(name: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            image: "example/service:latest".to_string(),
            env: HashMap::new(),
            ports: Vec::new(),
            volumes: Vec::new(),
            health_check: HealthCheckSpec::None,
            health_deadline: Duration::from_secs(1),
            policy: ReleasePolicy::ReleaseOnZero,
        }
    }

    #[tokio::test]
    async fn acquire_starts_container_once_and_tracks_ref_count() {
        let runtime = Arc::new(FakeRuntime::new());
        let manager = ServiceManager::new(runtime.clone(), vec![test_config("redis")]);

        manager.acquire("redis", "repo-a").await.unwrap();
        manager.acquire("redis", "repo-b").await.unwrap();

        let instance = manager.get("redis").await.unwrap();
        assert_eq!(instance.ref_count, 2);
        assert_eq!(instance.status, ServiceStatus::Running);
        assert_eq!(runtime.containers.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn release_on_zero_tears_down_container() {
        let runtime = Arc::new(FakeRuntime::new());
        let manager = ServiceManager::new(runtime.clone(), vec![test_config("redis")]);

        manager.acquire("redis", "repo-a").await.unwrap();
        manager.release("redis", "repo-a").await.unwrap();

        let instance = manager.get("redis").await.unwrap();
        assert_eq!(instance.ref_count, 0);
        assert_eq!(instance.status, ServiceStatus::Stopped);
        assert!(runtime.containers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn release_unreferenced_repo_is_rejected() {
        let runtime = Arc::new(FakeRuntime::new());
        let manager = ServiceManager::new(runtime, vec![test_config("redis")]);

        manager.acquire("redis", "repo-a").await.unwrap();
        let err = manager.release("redis", "repo-b").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotReferenced(_, _)));
    }

    #[tokio::test]
    async fn acquire_unknown_service_is_not_registered() {
        let runtime = Arc::new(FakeRuntime::new());
        let manager = ServiceManager::new(runtime, vec![]);
        let err = manager.acquire("redis", "repo-a").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotRegistered(_)));
    }
}
