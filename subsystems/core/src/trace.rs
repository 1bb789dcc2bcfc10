//! # Trace Context
//!
//! Logging configuration handed explicitly to the builder and carried by
//! every process-group view. There is no process-wide verbosity state: two
//! groups built with different `Trace` values log independently.
//!
//! ```text
//!   Trace { target, level }
//!        │
//!        ├──► ProcessGroupBuilder ──► ProcessGroup ──► lifecycle ops
//!        │
//!        └──► psys_log!(trace, Level::Debug, ...) ──► log facade
//! ```

use log::{Level, LevelFilter};

/// Default log target
pub const DEFAULT_TARGET: &str = "psys";

/// Injected logging context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trace {
    /// Log target every record is emitted under
    target: &'static str,
    /// Most verbose level that is emitted
    level: LevelFilter,
}

impl Trace {
    /// Create a trace context
    pub const fn new(target: &'static str, level: LevelFilter) -> Self {
        Self { target, level }
    }

    /// Context that emits nothing
    pub const fn silent() -> Self {
        Self::new(DEFAULT_TARGET, LevelFilter::Off)
    }

    /// Same context with a different target
    pub const fn with_target(self, target: &'static str) -> Self {
        Self { target, ..self }
    }

    /// Same context with a different level
    pub const fn with_level(self, level: LevelFilter) -> Self {
        Self { level, ..self }
    }

    /// Log target
    #[inline]
    pub const fn target(&self) -> &'static str {
        self.target
    }

    /// Level filter
    #[inline]
    pub const fn level(&self) -> LevelFilter {
        self.level
    }

    /// Whether records at `level` are emitted
    #[inline]
    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET, LevelFilter::Warn)
    }
}

#[doc(hidden)]
pub use log as __log;

/// Emit a log record through an injected [`Trace`]
///
/// ```ignore
/// psys_log!(self.trace, Level::Debug, "group {} ready", id);
/// ```
#[macro_export]
macro_rules! psys_log {
    ($trace:expr, $level:expr, $($arg:tt)+) => {{
        let trace: $crate::Trace = $trace;
        let level: $crate::trace::__log::Level = $level;
        if trace.enabled(level) {
            $crate::trace::__log::log!(target: trace.target(), level, $($arg)+);
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_emits_nothing() {
        let t = Trace::silent();
        assert!(!t.enabled(Level::Error));
        assert!(!t.enabled(Level::Trace));
    }

    #[test]
    fn test_default_level() {
        let t = Trace::default();
        assert_eq!(t.target(), DEFAULT_TARGET);
        assert!(t.enabled(Level::Error));
        assert!(t.enabled(Level::Warn));
        assert!(!t.enabled(Level::Debug));
    }

    #[test]
    fn test_builders() {
        let t = Trace::silent().with_target("isp").with_level(LevelFilter::Trace);
        assert_eq!(t.target(), "isp");
        assert!(t.enabled(Level::Trace));
    }

    #[test]
    fn test_macro_expands() {
        psys_log!(Trace::silent(), Level::Info, "value {}", 3);
    }
}
