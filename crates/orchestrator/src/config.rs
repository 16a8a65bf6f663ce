use std::collections::HashMap;

use vibeman_runtime::{PortMapping, VolumeBinding};

/// Per-worktree declared configuration, supplied by the caller at each
/// operation (configuration-file loading is an out-of-scope collaborator —
/// see SPEC_FULL.md §2 "Configuration").
#[derive(Debug, Clone)]
pub struct WorktreeConfig {
    pub image: String,
    pub env: HashMap<String, String>,
    pub ports: Vec<PortMapping>,
    pub extra_volumes: Vec<VolumeBinding>,
    /// Services this worktree depends on; acquired before its container
    /// starts and released after it stops (spec §4.4).
    pub services: Vec<String>,
    /// Exec'd inside the worktree container once it is running. Failure is
    /// downgraded to a warning (spec §4.4 step 5).
    pub post_start_hook: Option<Vec<String>>,
    /// Whether `stop` also removes the container, or merely stops it.
    pub remove_container_on_stop: bool,
}
