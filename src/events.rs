// ABOUTME: Lifecycle events raised by checkout and the branch workflow
// Subscribers return a success flag; every subscriber runs and the first failure is reported

use std::path::Path;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Reset,
    LocalBranchEntered,
    LocalBranchLeaving,
    NewCurrentBranch,
}

/// What subscribers get to see about the repository
#[derive(Debug)]
pub struct EventContext<'a> {
    pub event: LifecycleEvent,
    pub branch: &'a str,
    pub working_dir: &'a Path,
}

type Callback = Box<dyn Fn(&EventContext<'_>) -> bool + Send>;

struct Subscriber {
    event: LifecycleEvent,
    name: String,
    callback: Callback,
}

/// Owned list of registered callbacks
#[derive(Default)]
pub struct LifecycleEvents {
    subscribers: Vec<Subscriber>,
}

impl LifecycleEvents {
    pub fn subscribe<F>(&mut self, event: LifecycleEvent, name: impl Into<String>, callback: F)
    where
        F: Fn(&EventContext<'_>) -> bool + Send + 'static,
    {
        self.subscribers.push(Subscriber {
            event,
            name: name.into(),
            callback: Box::new(callback),
        });
    }

    pub fn unsubscribe(&mut self, name: &str) {
        self.subscribers.retain(|s| s.name != name);
    }

    pub fn subscriber_count(&self, event: LifecycleEvent) -> usize {
        self.subscribers.iter().filter(|s| s.event == event).count()
    }

    /// Run all subscribers of `context.event`. Returns false if any of them failed.
    pub fn raise(&self, context: &EventContext<'_>) -> bool {
        let mut first_failure: Option<&str> = None;

        for subscriber in self.subscribers.iter().filter(|s| s.event == context.event) {
            debug!("{:?} -> {}", context.event, subscriber.name);
            if !(subscriber.callback)(context) && first_failure.is_none() {
                first_failure = Some(&subscriber.name);
            }
        }

        match first_failure {
            Some(name) => {
                error!(
                    "{:?} subscriber '{}' failed on branch '{}'",
                    context.event, name, context.branch
                );
                false
            }
            None => true,
        }
    }
}
