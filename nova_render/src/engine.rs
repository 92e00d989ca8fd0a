/// Engine - process-wide logging facade
///
/// The render core keeps no global GPU state: the memory manager and frame
/// scheduler are explicit instances. The only global is the logger sink that
/// every `engine_*!` macro routes through.

use std::sync::{OnceLock, RwLock};
use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};

// ===== INTERNAL STATE =====

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

fn logger_slot() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger::new())))
}

// ===== PUBLIC API =====

/// Logging entry point shared by the core and its backends
pub struct Engine;

impl Engine {
    /// Replace the global logger
    ///
    /// # Example
    ///
    /// ```no_run
    /// use nova_render::nova::{Engine, log::{DefaultLogger, LogSeverity}};
    ///
    /// Engine::set_logger(DefaultLogger::with_min_severity(LogSeverity::Info));
    /// ```
    pub fn set_logger<L: Logger + 'static>(logger: L) {
        if let Ok(mut lock) = logger_slot().write() {
            *lock = Box::new(logger);
        }
    }

    /// Reset logger to the default colored console logger
    pub fn reset_logger() {
        if let Ok(mut lock) = logger_slot().write() {
            *lock = Box::new(DefaultLogger::new());
        }
    }

    /// Log without location (used by engine_trace! .. engine_warn!)
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        if let Ok(lock) = logger_slot().read() {
            lock.log(&LogEntry::new(severity, source, message));
        }
    }

    /// Log with file:line (used by engine_error! and engine_err!)
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        if let Ok(lock) = logger_slot().read() {
            lock.log(&LogEntry::new(severity, source, message).with_location(file, line));
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
