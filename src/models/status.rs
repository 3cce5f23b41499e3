// ABOUTME: Point-in-time status summary of one open repository

use serde::{Deserialize, Serialize};

/// Recomputed on every call; callers memoize if they need to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleStatus {
    pub display_name: String,
    pub current_branch: String,
    pub is_dirty: bool,
    /// `None` when the branch has no upstream
    pub commits_ahead_of_origin: Option<usize>,
    /// `None` when plugins are not initialized or failed to initialize
    pub plugin_count: Option<usize>,
}

impl SimpleStatus {
    pub fn indicator(&self) -> &'static str {
        if self.is_dirty {
            "●"
        } else {
            "○"
        }
    }

    pub fn summary(&self) -> String {
        let ahead = match self.commits_ahead_of_origin {
            Some(0) => "up to date".to_string(),
            Some(n) => format!("{} ahead", n),
            None => "untracked".to_string(),
        };
        let plugins = match self.plugin_count {
            Some(n) => format!("{} plugins", n),
            None => "plugins not initialized".to_string(),
        };
        format!(
            "{} {} [{}] {}, {}",
            self.indicator(),
            self.display_name,
            self.current_branch,
            ahead,
            plugins
        )
    }
}
