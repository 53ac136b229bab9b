//! Dynamic log-level control.
//!
//! The MCP `logging/setLevel` request carries one of eight external severity
//! names; this module maps them many-to-one onto the four internal levels
//! and reconfigures the tracing filter at runtime through a reload handle.
//!
//! Log output always goes to stderr: stdout carries protocol frames in the
//! stdio transport and must never be corrupted by log lines.
//!
//! The controller is an explicitly constructed object shared by `Arc`; child
//! consumers hold a reference to the same configuration rather than a value
//! snapshot, so a level change is visible everywhere immediately.

use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Reload handle for the process-wide tracing filter.
pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// The four internal severity levels, ordered by priority.
///
/// Lower numbers are higher priority: a message is emitted iff its
/// priority number is less than or equal to the configured level's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Highest priority.
    Error = 0,
    /// Warnings.
    Warn = 1,
    /// Informational messages.
    Info = 2,
    /// Lowest priority.
    Debug = 3,
}

impl LogLevel {
    /// Maps an external MCP severity name onto an internal level.
    ///
    /// The external vocabulary has eight names; `notice` folds into info
    /// and `critical`/`alert`/`emergency` fold into error. Unrecognised
    /// names map to `None`.
    #[must_use]
    pub fn from_external(name: &str) -> Option<Self> {
        match name {
            "debug" => Some(Self::Debug),
            "info" | "notice" => Some(Self::Info),
            "warning" => Some(Self::Warn),
            "error" | "critical" | "alert" | "emergency" => Some(Self::Error),
            _ => None,
        }
    }

    /// Parses a configuration-file level string (internal vocabulary).
    #[must_use]
    pub fn from_config(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Returns the internal level name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

/// Outcome of a set-level request, for the caller's confirmation payload.
#[derive(Debug, Clone, Copy)]
pub struct LevelChange {
    /// Level before the request was applied.
    pub previous: LogLevel,
    /// Level after the request was applied.
    pub current: LogLevel,
}

impl LevelChange {
    /// Returns true when the request changed nothing.
    #[must_use]
    pub fn unchanged(&self) -> bool {
        self.previous == self.current
    }
}

/// Process-wide log-level state.
///
/// Holds the current minimum severity and, when a subscriber is installed,
/// the reload handle used to swap the tracing filter.
pub struct LevelController {
    current: Mutex<LogLevel>,
    handle: Option<FilterHandle>,
}

impl LevelController {
    /// Creates a controller without a subscriber attached.
    ///
    /// Level state is tracked and readable, but no tracing filter is
    /// reconfigured. Used in tests and by callers that install their own
    /// subscriber.
    #[must_use]
    pub const fn detached(initial: LogLevel) -> Self {
        Self {
            current: Mutex::new(initial),
            handle: None,
        }
    }

    /// Creates a controller bound to an installed filter.
    #[must_use]
    pub const fn new(initial: LogLevel, handle: FilterHandle) -> Self {
        Self {
            current: Mutex::new(initial),
            handle: Some(handle),
        }
    }

    /// Returns the current minimum severity.
    ///
    /// # Panics
    ///
    /// Panics only if the internal lock was poisoned, which cannot happen
    /// in this single-threaded cooperative design.
    #[must_use]
    pub fn current(&self) -> LogLevel {
        *self.current.lock().expect("level lock poisoned")
    }

    /// Returns true when a message at `candidate` severity should be emitted.
    #[must_use]
    pub fn should_log(&self, candidate: LogLevel) -> bool {
        candidate <= self.current()
    }

    /// Applies an externally requested level.
    ///
    /// Recognised names adopt the mapped internal level and log the change
    /// at info severity. Unrecognised names leave the level untouched and
    /// log a warning. This call never fails.
    pub fn set_level(&self, requested: &str) -> LevelChange {
        let previous = self.current();

        let Some(mapped) = LogLevel::from_external(requested) else {
            tracing::warn!(requested, "Ignoring unrecognised log level");
            return LevelChange {
                previous,
                current: previous,
            };
        };

        {
            let mut current = self.current.lock().expect("level lock poisoned");
            *current = mapped;
        }

        if let Some(handle) = &self.handle {
            let filter = EnvFilter::new(mapped.as_str());
            if let Err(e) = handle.reload(filter) {
                tracing::error!(error = %e, "Failed to reload tracing filter");
            }
        }

        tracing::info!(
            previous = previous.as_str(),
            new = mapped.as_str(),
            requested,
            "Log level changed"
        );

        LevelChange {
            previous,
            current: mapped,
        }
    }
}

impl std::fmt::Debug for LevelController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelController")
            .field("current", &self.current())
            .field("reloadable", &self.handle.is_some())
            .finish()
    }
}

/// Installs the global tracing subscriber and returns its level controller.
///
/// The filter honours `RUST_LOG` directives on top of the initial level;
/// output goes to stderr so stdout stays clean for protocol framing.
#[must_use]
pub fn init_tracing(initial: LogLevel) -> LevelController {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(initial.as_str()));
    let (filter_layer, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    LevelController::new(initial, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_mapping_covers_all_eight_names() {
        assert_eq!(LogLevel::from_external("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_external("info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_external("notice"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_external("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_external("error"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_external("critical"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_external("alert"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_external("emergency"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_external("verbose"), None);
    }

    #[test]
    fn set_level_round_trip() {
        let controller = LevelController::detached(LogLevel::Warn);

        for (name, expected) in [
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("notice", LogLevel::Info),
            ("warning", LogLevel::Warn),
            ("error", LogLevel::Error),
            ("critical", LogLevel::Error),
            ("alert", LogLevel::Error),
            ("emergency", LogLevel::Error),
        ] {
            let change = controller.set_level(name);
            assert_eq!(change.current, expected, "external name {name}");
            assert_eq!(controller.current(), expected);
        }
    }

    #[test]
    fn unrecognised_level_is_a_no_op() {
        let controller = LevelController::detached(LogLevel::Info);
        let change = controller.set_level("shouting");

        assert!(change.unchanged());
        assert_eq!(change.previous, LogLevel::Info);
        assert_eq!(controller.current(), LogLevel::Info);
    }

    #[test]
    fn should_log_gates_by_priority() {
        let controller = LevelController::detached(LogLevel::Warn);

        assert!(controller.should_log(LogLevel::Error));
        assert!(controller.should_log(LogLevel::Warn));
        assert!(!controller.should_log(LogLevel::Info));
        assert!(!controller.should_log(LogLevel::Debug));

        controller.set_level("debug");
        assert!(controller.should_log(LogLevel::Debug));
    }

    #[test]
    fn config_parsing_accepts_internal_names_only() {
        assert_eq!(LogLevel::from_config("WARN"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_config("warning"), None);
    }
}
