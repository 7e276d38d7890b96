//! Leveled logging for the `OxiType` runtime.
//!
//! The registry, class store and variant engine report what they do through
//! the macros in this crate. Messages are tagged with the module path of the
//! call site, filtered by a process-wide level and written to stderr.
//!
//! # Configuration
//!
//! The level and color output can be set programmatically or from the
//! environment:
//!
//! - `OXITYPE_LOG`: one of `error`, `warn`, `info`, `debug`, `trace`
//! - `OXITYPE_LOG_COLOR`: `0`, `false`, `never` or `off` disables ANSI color
//!
//! # Example
//!
//! ```
//! use oxitype_log::{debug, info, warn, Level};
//!
//! oxitype_log::set_level(Level::Debug);
//!
//! let name = "Widget";
//! info!("registered type {}", name);
//! debug!("class size: {}", 24);
//! warn!("converter overwritten");
//! ```

use std::fmt::Arguments;
use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Environment variable holding the minimum level.
pub const LEVEL_ENV: &str = "OXITYPE_LOG";

/// Environment variable toggling ANSI color output.
pub const COLOR_ENV: &str = "OXITYPE_LOG_COLOR";

/// Severity of a log message, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Failures that are about to surface to a caller.
    Error = 0,
    /// Recoverable oddities (overwritten converters, failed finalizers).
    Warn = 1,
    /// Coarse lifecycle events.
    Info = 2,
    /// Registration and configuration details.
    Debug = 3,
    /// Per-class and per-instance events.
    Trace = 4,
}

impl Level {
    /// All levels in severity order.
    pub const ALL: [Level; 5] =
        [Level::Error, Level::Warn, Level::Info, Level::Debug, Level::Trace];

    const fn color_code(self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }

    /// Upper-case label printed in front of each message.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn from_u8(raw: u8) -> Level {
        match raw {
            0 => Level::Error,
            1 => Level::Warn,
            2 => Level::Info,
            3 => Level::Debug,
            _ => Level::Trace,
        }
    }
}

impl FromStr for Level {
    type Err = String;

    /// Parses a level name, ignoring case and surrounding whitespace.
    ///
    /// # Example
    ///
    /// ```
    /// use oxitype_log::Level;
    ///
    /// assert_eq!("warn".parse::<Level>(), Ok(Level::Warn));
    /// assert_eq!(" TRACE ".parse::<Level>(), Ok(Level::Trace));
    /// assert!("loud".parse::<Level>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Level::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("Invalid log level: {s}"))
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide log filter.
///
/// Both settings are atomics so that the hot path (`enabled`) never locks.
pub struct Logger {
    level: AtomicU8,
    color: AtomicBool,
}

impl Logger {
    const fn new(level: Level) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
            color: AtomicBool::new(true),
        }
    }

    /// Sets the minimum level that will be written.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::SeqCst);
    }

    /// Returns the current minimum level.
    #[must_use]
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Returns true if a message at `level` would be written.
    #[must_use]
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.level.load(Ordering::Relaxed)
    }

    /// Enables or disables ANSI color codes.
    pub fn set_color(&self, color: bool) {
        self.color.store(color, Ordering::Relaxed);
    }

    /// Returns true if output is colored.
    #[must_use]
    pub fn color(&self) -> bool {
        self.color.load(Ordering::Relaxed)
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Returns the process-wide logger, created at `Level::Warn` on first use.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(|| Logger::new(Level::Warn))
}

/// Sets the minimum level of the process-wide logger.
pub fn set_level(level: Level) {
    get_logger().set_level(level);
}

/// Sets the minimum level from a level name.
///
/// # Errors
///
/// Returns the parse message if `s` is not a level name; the level is left
/// unchanged in that case.
pub fn set_level_from_str(s: &str) -> Result<(), String> {
    set_level(s.parse()?);
    Ok(())
}

/// Applies `OXITYPE_LOG` and `OXITYPE_LOG_COLOR` to the process-wide logger.
///
/// Unset variables leave the current settings alone.
///
/// # Errors
///
/// Returns a message naming the offending variable if `OXITYPE_LOG` holds
/// something other than a level name.
pub fn init_from_env() -> Result<(), String> {
    if let Ok(color) = std::env::var(COLOR_ENV) {
        get_logger().set_color(!parse_color_off(&color));
    }
    match std::env::var(LEVEL_ENV) {
        Ok(level) => set_level_from_str(&level)
            .map_err(|e| format!("{LEVEL_ENV}: {e}")),
        Err(_) => Ok(()),
    }
}

fn parse_color_off(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "never" | "off" | "no"
    )
}

/// Writes one formatted record. Called by the macros after the level check.
#[doc(hidden)]
pub fn __log_with_target(level: Level, target: &str, args: Arguments) {
    const RESET: &str = "\x1b[0m";

    let logger = get_logger();
    if !logger.enabled(level) {
        return;
    }

    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    // A closed stderr is not worth failing a registry call over.
    let _ = if logger.color() {
        writeln!(out, "{}[{}]{RESET} {target}: {args}", level.color_code(), level)
    } else {
        writeln!(out, "[{level}] {target}: {args}")
    };
}

/// Logs at an explicit level.
///
/// ```
/// use oxitype_log::{log, Level};
///
/// log!(level: Level::Info, "built {} classes", 3);
/// ```
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {
        {
            let level = $level;
            if $crate::get_logger().enabled(level) {
                $crate::__log_with_target(
                    level,
                    module_path!(),
                    format_args!($($arg)*)
                );
            }
        }
    };
}

/// Returns true if the given level is currently written.
///
/// Useful to skip building expensive arguments.
#[macro_export]
macro_rules! log_enabled {
    ($level:expr) => {
        $crate::get_logger().enabled($level)
    };
}

/// Logs at `Level::Error`.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Error, $($arg)*)
    };
}

/// Logs at `Level::Warn`.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Warn, $($arg)*)
    };
}

/// Logs at `Level::Info`.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Info, $($arg)*)
    };
}

/// Logs at `Level::Debug`.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Debug, $($arg)*)
    };
}

/// Logs at `Level::Trace`.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Trace, $($arg)*)
    };
}
