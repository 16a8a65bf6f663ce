use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use vibeman_runtime::PortMapping;
use vibeman_services::{HealthCheckSpec, ReleasePolicy, ServiceConfig};

/// TOML shape recognized at `server.port`/`server.webui_port`,
/// `storage.repositories_path`/`storage.worktrees_path`,
/// `services.config_path` (spec §6), plus a `[worktree]` table describing
/// the container every worktree gets (out-of-scope "configuration file
/// loading" collaborator — see SPEC_FULL.md §2).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub services: ServicesSection,
    pub worktree: WorktreeSection,
    #[serde(default)]
    pub ai: AiSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    pub port: u16,
    pub webui_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    pub repositories_path: String,
    pub worktrees_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServicesSection {
    pub config_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorktreeSection {
    pub image: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub services: Vec<String>,
    pub post_start_hook: Option<Vec<String>>,
    #[serde(default)]
    pub remove_container_on_stop: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AiSection {
    #[serde(default = "default_ai_image")]
    pub image: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_ai_image() -> String {
    "vibeman/ai-assistant:latest".to_string()
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))?;
        Ok(config)
    }
}

/// One entry in the `services.config_path` TOML file (`{ services = [...] }`).
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDecl {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub ports: Vec<PortDecl>,
    #[serde(default)]
    pub health_check: HealthCheckDecl,
    #[serde(default = "default_health_deadline_secs")]
    pub health_deadline_secs: u64,
    #[serde(default)]
    pub policy: PolicyDecl,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortDecl {
    pub host_port: u16,
    pub container_port: u16,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthCheckDecl {
    Exec {
        argv: Vec<String>,
    },
    Http {
        url: String,
    },
    #[default]
    None,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecl {
    #[default]
    ReleaseOnZero,
    Retain,
}

fn default_health_deadline_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
struct ServiceDeclFile {
    #[serde(default)]
    services: Vec<ServiceDecl>,
}

pub fn load_service_configs(path: &Path) -> Result<Vec<ServiceConfig>, anyhow::Error> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading service declarations {}: {e}", path.display()))?;
    let file: ServiceDeclFile = toml::from_str(&text)
        .map_err(|e| anyhow::anyhow!("parsing service declarations {}: {e}", path.display()))?;

    Ok(file.services.into_iter().map(Into::into).collect())
}

impl From<ServiceDecl> for ServiceConfig {
    fn from(decl: ServiceDecl) -> Self {
        ServiceConfig {
            name: decl.name,
            image: decl.image,
            env: decl.env,
            ports: decl
                .ports
                .into_iter()
                .map(|p| PortMapping {
                    host_port: p.host_port,
                    container_port: p.container_port,
                })
                .collect(),
            volumes: Vec::new(),
            health_check: match decl.health_check {
                HealthCheckDecl::Exec { argv } => HealthCheckSpec::Exec(argv),
                HealthCheckDecl::Http { url } => HealthCheckSpec::Http { url },
                HealthCheckDecl::None => HealthCheckSpec::None,
            },
            health_deadline: Duration::from_secs(decl.health_deadline_secs),
            policy: match decl.policy {
                PolicyDecl::ReleaseOnZero => ReleasePolicy::ReleaseOnZero,
                PolicyDecl::Retain => ReleasePolicy::Retain,
            },
        }
    }
}
