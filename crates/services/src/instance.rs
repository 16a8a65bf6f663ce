use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::config::ServiceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Stopped,
    Starting,
    Running,
    Error,
}

/// A shared, long-lived container referenced by zero or more worktrees
/// (spec §3). The Service Manager is the sole owner of `ref_count` and
/// `repositories`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServiceInstance {
    pub name: String,
    pub container_id: Option<String>,
    pub status: ServiceStatus,
    pub ref_count: u32,
    pub repositories: HashSet<String>,
    #[serde(skip)]
    pub config: ServiceConfig,
    pub started_at: Option<DateTime<Utc>>,
    pub last_health: Option<DateTime<Utc>>,
    pub last_health_error: Option<String>,
}

impl ServiceInstance {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            name: config.name.clone(),
            container_id: None,
            status: ServiceStatus::Stopped,
            ref_count: 0,
            repositories: HashSet::new(),
            config,
            started_at: None,
            last_health: None,
            last_health_error: None,
        }
    }
}
