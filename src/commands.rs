// ABOUTME: Command registry collaborator used to expose repository operations to an outer CLI

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Named operations every open repository exposes
pub const REPOSITORY_COMMANDS: &[&str] = &["reset", "fetch", "status", "run"];

/// Registry of objects exposing named invokable operations
#[cfg_attr(test, mockall::automock)]
pub trait CommandRegistry: Send + Sync {
    fn register(&self, owner: &str, commands: &[&'static str]);

    fn unregister(&self, owner: &str);
}

/// Registry kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryCommandRegistry {
    entries: Mutex<BTreeMap<String, Vec<&'static str>>>,
}

impl InMemoryCommandRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Commands registered by `owner`, empty if none
    pub fn commands_for(&self, owner: &str) -> Vec<&'static str> {
        self.entries
            .lock()
            .map(|entries| entries.get(owner).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn owners(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl CommandRegistry for InMemoryCommandRegistry {
    fn register(&self, owner: &str, commands: &[&'static str]) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(owner.to_string(), commands.to_vec());
        }
    }

    fn unregister(&self, owner: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(owner);
        }
    }
}
