// ABOUTME: Plugin manager collaborator bound to each open repository
// Discovery and loading live outside this crate; only the lifecycle seam is here

/// Per-branch plugin lifecycle, implemented by the host application
#[cfg_attr(test, mockall::automock)]
pub trait PluginManager: Send {
    /// Make sure the plugins for `branch` are loaded. Returns false on failure.
    fn ensure_plugins(&mut self, branch: &str) -> bool;

    fn is_initialized(&self, branch: &str) -> bool;

    fn count(&self) -> usize;
}

/// Manager used when the host did not provide one
#[derive(Debug, Default)]
pub struct NoPlugins;

impl PluginManager for NoPlugins {
    fn ensure_plugins(&mut self, _branch: &str) -> bool {
        true
    }

    fn is_initialized(&self, _branch: &str) -> bool {
        true
    }

    fn count(&self) -> usize {
        0
    }
}

/// The plugin manager owned by one open repository
pub struct PluginBinding {
    manager: Box<dyn PluginManager>,
}

impl PluginBinding {
    pub fn new(manager: Box<dyn PluginManager>) -> Self {
        Self { manager }
    }

    /// Re-bind plugins after the current branch changed
    pub fn rebind(&mut self, branch: &str) -> bool {
        let ok = self.manager.ensure_plugins(branch);
        if !ok {
            tracing::error!("Plugins failed to initialize for branch '{}'", branch);
        }
        ok
    }

    /// Plugin count, or `None` when plugins are not initialized for `branch`
    pub fn count_for(&self, branch: &str) -> Option<usize> {
        if self.manager.is_initialized(branch) {
            Some(self.manager.count())
        } else {
            None
        }
    }
}

impl Default for PluginBinding {
    fn default() -> Self {
        Self::new(Box::new(NoPlugins))
    }
}
