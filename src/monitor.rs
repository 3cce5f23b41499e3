// ABOUTME: Leveled, scoped-group logging on top of tracing
// Fatal is an error event tagged `fatal = true`; groups are entered spans

use tracing::span::EnteredSpan;

/// Severity levels understood by operators reading the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    /// Unexpected engine or IO failure that needs a human to look at it
    Fatal,
}

/// Emit one message at the given level
pub fn log(level: Level, message: &str) {
    match level {
        Level::Info => tracing::info!("{}", message),
        Level::Warn => tracing::warn!("{}", message),
        Level::Error => tracing::error!("{}", message),
        Level::Fatal => tracing::error!(fatal = true, "{}", message),
    }
}

/// Log an unexpected failure. Callers report it as a failed operation afterwards.
pub fn fatal(message: impl AsRef<str>) {
    log(Level::Fatal, message.as_ref());
}

/// Open a named log group. The group closes when the returned guard is dropped.
pub fn open_group(name: &str) -> EnteredSpan {
    tracing::info_span!("group", name = %name).entered()
}
