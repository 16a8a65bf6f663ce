//! Shells the `docker` (or `podman`, API-compatible) CLI rather than linking
//! a daemon API client: the same portability/safety trade-off this codebase
//! makes for git (see `vibeman_git::cli`) — a subprocess boundary is easier
//! to reason about across engines than a client library tied to one daemon
//! API version.
use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::{
    error::RuntimeError,
    pty,
    trait_def::{ContainerRuntime, PtyHandle},
    types::{ContainerConfig, ContainerInfo, ContainerState, ExecOutput, PtySize},
};

#[derive(Clone)]
pub struct DockerRuntime {
    binary: String,
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }

    async fn run(&self, args: &[&str]) -> Result<String, RuntimeError> {
        let output = self
            .command()
            .args(args)
            .output()
            .await
            .map_err(|e| classify_spawn_error(&self.binary, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(classify_cli_error(&stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn build_create_args(config: &ContainerConfig) -> Vec<String> {
        let mut args = vec!["create".to_string(), "--name".to_string(), config.name.clone()];

        for (k, v) in &config.env {
            args.push("-e".to_string());
            args.push(format!("{k}={v}"));
        }
        for port in &config.ports {
            args.push("-p".to_string());
            args.push(format!("{}:{}", port.host_port, port.container_port));
        }
        for vol in &config.volumes {
            args.push("-v".to_string());
            let ro = if vol.read_only { ":ro" } else { "" };
            args.push(format!("{}:{}{}", vol.host_path, vol.container_path, ro));
        }
        let kind_label = match config.kind {
            crate::types::ContainerKind::Worktree => "worktree",
            crate::types::ContainerKind::Service => "service",
            crate::types::ContainerKind::Ai => "ai",
        };
        args.push("-l".to_string());
        args.push(format!("vibeman.type={kind_label}"));
        for (k, v) in &config.labels {
            args.push("-l".to_string());
            args.push(format!("{k}={v}"));
        }
        if let Some(wd) = &config.working_dir {
            args.push("-w".to_string());
            args.push(wd.clone());
        }
        if let Some(net) = &config.network {
            args.push("--network".to_string());
            args.push(net.clone());
        }
        if let Some(policy) = &config.restart_policy {
            args.push("--restart".to_string());
            args.push(policy.clone());
        }
        args.push(config.image.clone());
        args
    }
}

#[derive(Debug, Deserialize)]
struct InspectState {
    #[serde(rename = "Status")]
    status: String,
}

#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Config")]
    config: InspectConfig,
    #[serde(rename = "State")]
    state: InspectState,
}

#[derive(Debug, Deserialize)]
struct InspectConfig {
    #[serde(rename = "Image")]
    image: String,
    #[serde(rename = "Labels")]
    labels: Option<HashMap<String, String>>,
}

fn to_info(entry: InspectEntry) -> ContainerInfo {
    let state = match entry.state.status.as_str() {
        "running" => ContainerState::Running,
        "created" => ContainerState::Created,
        "exited" | "dead" => ContainerState::Exited,
        _ => ContainerState::Unknown,
    };
    ContainerInfo {
        id: entry.id,
        name: entry.name.trim_start_matches('/').to_string(),
        image: entry.config.image,
        state,
        labels: entry.config.labels.unwrap_or_default(),
    }
}

fn classify_spawn_error(binary: &str, err: std::io::Error) -> RuntimeError {
    if err.kind() == std::io::ErrorKind::NotFound {
        RuntimeError::EngineUnavailable(format!("'{binary}' not found on PATH"))
    } else {
        RuntimeError::Io(err)
    }
}

fn classify_cli_error(stderr: &str) -> RuntimeError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("no such container") || lower.contains("no such object") {
        RuntimeError::NotFound(stderr.to_string())
    } else if lower.contains("already in use") || lower.contains("conflict") {
        RuntimeError::Conflict(stderr.to_string())
    } else if lower.contains("cannot connect to the docker daemon") {
        RuntimeError::EngineUnavailable(stderr.to_string())
    } else {
        RuntimeError::Other(stderr.to_string())
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create(&self, config: &ContainerConfig) -> Result<String, RuntimeError> {
        let args = Self::build_create_args(config);
        let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();
        let id = self.run(&args_ref).await?;
        tracing::info!(name = %config.name, %id, "created container");
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        self.run(&["start", id]).await?;
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
        self.run(&["stop", id]).await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
        match self.run(&["rm", "-f", id]).await {
            Ok(_) => Ok(()),
            Err(RuntimeError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list(&self) -> Result<Vec<ContainerInfo>, RuntimeError> {
        let out = self.run(&["ps", "-a", "--format", "{{.ID}}"]).await?;
        let mut infos = Vec::new();
        for id in out.lines().filter(|l| !l.trim().is_empty()) {
            if let Some(info) = self.get_by_id(id.trim()).await? {
                infos.push(info);
            }
        }
        Ok(infos)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<ContainerInfo>, RuntimeError> {
        match self.run(&["inspect", id]).await {
            Ok(out) => {
                let mut entries: Vec<InspectEntry> = serde_json::from_str(&out)
                    .map_err(|e| RuntimeError::Other(format!("bad inspect output: {e}")))?;
                Ok(entries.pop().map(to_info))
            }
            Err(RuntimeError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<ContainerInfo>, RuntimeError> {
        self.get_by_id(name).await
    }

    async fn logs(&self, id: &str, follow: bool) -> Result<String, RuntimeError> {
        if follow {
            // A true follow stream belongs at a higher layer with its own
            // cancellation; here we cap it to what's already been written.
            self.run(&["logs", "--tail", "500", id]).await
        } else {
            self.run(&["logs", id]).await
        }
    }

    async fn exec(&self, id: &str, argv: &[String]) -> Result<ExecOutput, RuntimeError> {
        let mut args = vec!["exec".to_string(), id.to_string()];
        args.extend(argv.iter().cloned());
        let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();

        let output = self
            .command()
            .args(&args_ref)
            .output()
            .await
            .map_err(|e| classify_spawn_error(&self.binary, e))?;

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn attach_pty(&self, id: &str, size: PtySize) -> Result<PtyHandle, RuntimeError> {
        pty::spawn_exec_pty(&self.binary, id, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VolumeBinding;

    #[test]
    fn create_args_include_name_and_labels() {
        let mut config = ContainerConfig::new("alpine", "vibeman-r-feat", crate::types::ContainerKind::Worktree);
        config.volumes.push(VolumeBinding {
            host_path: "/src".into(),
            container_path: "/work".into(),
            read_only: false,
        });
        let args = DockerRuntime::build_create_args(&config);
        assert!(args.contains(&"vibeman-r-feat".to_string()));
        assert!(args.contains(&"vibeman.type=worktree".to_string()));
        assert!(args.contains(&"/src:/work".to_string()));
    }

    #[test]
    fn classifies_known_cli_errors() {
        assert!(matches!(
            classify_cli_error("Error: No such container: abc"),
            RuntimeError::NotFound(_)
        ));
        assert!(matches!(
            classify_cli_error("Cannot connect to the Docker daemon"),
            RuntimeError::EngineUnavailable(_)
        ));
    }
}
