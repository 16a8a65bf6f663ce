use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `type` label in spec §4.3 — distinguishes the three kinds of container
/// Vibeman manages, for labeling/discovery purposes only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Worktree,
    Service,
    Ai,
}

#[derive(Debug, Clone, Default)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
}

#[derive(Debug, Clone)]
pub struct VolumeBinding {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

/// Everything needed to create a container, regardless of engine (spec
/// §4.3).
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub image: String,
    pub name: String,
    pub env: HashMap<String, String>,
    pub ports: Vec<PortMapping>,
    pub volumes: Vec<VolumeBinding>,
    pub labels: HashMap<String, String>,
    pub kind: ContainerKind,
    pub working_dir: Option<String>,
    pub network: Option<String>,
    pub restart_policy: Option<String>,
}

impl ContainerConfig {
    pub fn new(image: impl Into<String>, name: impl Into<String>, kind: ContainerKind) -> Self {
        Self {
            image: image.into(),
            name: name.into(),
            env: HashMap::new(),
            ports: Vec::new(),
            volumes: Vec::new(),
            labels: HashMap::new(),
            kind,
            working_dir: None,
            network: None,
            restart_policy: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    Created,
    Running,
    Exited,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy)]
pub struct PtySize {
    pub cols: u16,
    pub rows: u16,
}

#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}
