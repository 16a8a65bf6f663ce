//! Naming conventions shared across the runtime and orchestrator so that
//! external tooling can discover containers by name (spec §4.3/§6).

/// `vibeman-<repo>-<worktree>`
pub fn worktree_container_name(repo: &str, worktree: &str) -> String {
    format!("vibeman-{}-{}", slugify(repo), slugify(worktree))
}

/// `vibeman-ai-<worktree>`
pub fn ai_container_name(worktree: &str) -> String {
    format!("vibeman-ai-{}", slugify(worktree))
}

/// Lowercase, replace anything that isn't `[a-z0-9_.-]` with `-`, and collapse
/// repeats, so the result is always a valid container name fragment.
pub fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_dash = false;
    for ch in raw.to_ascii_lowercase().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' {
            out.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("My Repo / v2"), "my-repo-v2");
    }

    #[test]
    fn container_names_match_convention() {
        assert_eq!(worktree_container_name("vibeman", "feat"), "vibeman-vibeman-feat");
        assert_eq!(ai_container_name("feat"), "vibeman-ai-feat");
    }
}
