//! Thin wrapper around executable discovery so adapters don't each hand-roll
//! `PATH` lookups. Mirrors the purpose (not the implementation) of the
//! teacher's `utils::shell::resolve_executable_path`.

use std::path::PathBuf;

pub fn resolve_executable_path(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}
