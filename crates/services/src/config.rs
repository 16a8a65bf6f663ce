use std::collections::HashMap;
use std::time::Duration;

use vibeman_runtime::{ContainerKind, PortMapping, VolumeBinding};

/// Whether a service is torn down once its ref-count reaches zero, or kept
/// warm for the next acquirer (spec §3 "Lifecycle").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleasePolicy {
    ReleaseOnZero,
    Retain,
}

#[derive(Debug, Clone)]
pub enum HealthCheckSpec {
    Exec(Vec<String>),
    Http { url: String },
    /// No health probe configured; the service is considered healthy as
    /// soon as its container reports `running`.
    None,
}

/// Declared configuration for a named shared service (spec §3, §4.5). One of
/// these is registered per service name at process start.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub image: String,
    pub env: HashMap<String, String>,
    pub ports: Vec<PortMapping>,
    pub volumes: Vec<VolumeBinding>,
    pub health_check: HealthCheckSpec,
    pub health_deadline: Duration,
    pub policy: ReleasePolicy,
}

impl ServiceConfig {
    pub fn container_kind(&self) -> ContainerKind {
        ContainerKind::Service
    }
}
