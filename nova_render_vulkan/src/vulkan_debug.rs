/// Vulkan debug messenger - routes validation layer messages into the engine logger
///
/// Messages are filtered by the configured `DebugSeverity`, counted in global
/// atomic counters and forwarded to `Engine::log` under the
/// `nova::vulkan::validation` source. Identical messages are grouped and the
/// repeat count is appended.

use ash::vk;
use colored::*;
use nova_render::config::{DebugSeverity, ValidationStats};
use nova_render::nova::Engine;
use nova_render::nova::log::LogSeverity;
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

const SOURCE: &str = "nova::vulkan::validation";

/// Minimum forwarded severity, `None` while no messenger is installed
static DEBUG_SEVERITY: Mutex<Option<DebugSeverity>> = Mutex::new(None);

/// Global validation statistics (thread-safe atomic counters)
static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

/// Occurrences per message text
static MESSAGE_TRACKER: Mutex<Option<FxHashMap<String, u32>>> = Mutex::new(None);

/// Thread-safe validation statistics tracker
struct ValidationStatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl ValidationStatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn record(&self, severity: vk::DebugUtilsMessageSeverityFlagsEXT) {
        let counter = if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            &self.errors
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            &self.warnings
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            &self.info
        } else {
            &self.verbose
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn get_stats(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic inside a logger must not silence later validation messages
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Install the severity filter and reset counters
pub(crate) fn init_debug_config(severity: DebugSeverity) {
    VALIDATION_STATS.reset();
    *lock(&MESSAGE_TRACKER) = Some(FxHashMap::default());
    *lock(&DEBUG_SEVERITY) = Some(severity);
}

/// Stop forwarding messages (called before the messenger is destroyed)
pub(crate) fn cleanup_debug_config() {
    *lock(&DEBUG_SEVERITY) = None;
    *lock(&MESSAGE_TRACKER) = None;
}

/// Counters of validation messages received since the device was created
pub fn validation_stats() -> ValidationStats {
    VALIDATION_STATS.get_stats()
}

/// Zero the validation counters and forget grouped messages
pub fn reset_validation_stats() {
    VALIDATION_STATS.reset();
    if let Some(tracker) = lock(&MESSAGE_TRACKER).as_mut() {
        tracker.clear();
    }
}

/// Print validation statistics report
pub fn print_validation_stats_report() {
    let stats = validation_stats();

    if stats.total() == 0 {
        println!("\n{}", "✓ No validation messages".green().bold());
        return;
    }

    println!("\n{}", "=== Validation Statistics Report ===".bright_blue().bold());

    if stats.errors > 0 {
        println!("  {} {}", "Errors:".red().bold(), stats.errors);
    }
    if stats.warnings > 0 {
        println!("  {} {}", "Warnings:".yellow().bold(), stats.warnings);
    }
    if stats.info > 0 {
        println!("  {} {}", "Info:".cyan(), stats.info);
    }
    if stats.verbose > 0 {
        println!("  {} {}", "Verbose:".bright_black(), stats.verbose);
    }

    println!("  {} {}", "Total:".white().bold(), stats.total());

    let repeated = lock(&MESSAGE_TRACKER)
        .as_ref()
        .map(|tracker| tracker.values().filter(|&&count| count > 1).count())
        .unwrap_or(0);
    if repeated > 0 {
        println!("\n  {} {} message(s) appeared multiple times", "ℹ".cyan(), repeated);
    }

    println!("{}\n", "====================================".bright_blue().bold());
}

/// Messenger severity mask for a configured minimum severity
pub(crate) fn messenger_severity_flags(severity: DebugSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    let mut flags = vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
    if severity <= DebugSeverity::Warning {
        flags |= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING;
    }
    if severity <= DebugSeverity::Info {
        flags |= vk::DebugUtilsMessageSeverityFlagsEXT::INFO;
    }
    if severity <= DebugSeverity::Verbose {
        flags |= vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE;
    }
    flags
}

/// Engine severity a validation message is logged at
fn log_severity(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> LogSeverity {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        LogSeverity::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        LogSeverity::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        LogSeverity::Debug
    } else {
        LogSeverity::Trace
    }
}

fn type_name(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    }
}

unsafe fn c_str_or<'a>(ptr: *const std::os::raw::c_char, fallback: &'a str) -> &'a str {
    if ptr.is_null() {
        fallback
    } else {
        CStr::from_ptr(ptr).to_str().unwrap_or("Invalid UTF-8")
    }
}

/// Vulkan debug messenger callback
///
/// Called by the validation layers from any thread. Never asks Vulkan to
/// abort the triggering call.
pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let Some(severity) = *lock(&DEBUG_SEVERITY) else {
        return vk::FALSE;
    };
    if !messenger_severity_flags(severity).intersects(message_severity) {
        return vk::FALSE;
    }
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = *p_callback_data;
    let message_id_name = c_str_or(callback_data.p_message_id_name, "Unknown");
    let message = c_str_or(callback_data.p_message, "No message");

    VALIDATION_STATS.record(message_severity);

    let occurrences = *lock(&MESSAGE_TRACKER)
        .get_or_insert_with(FxHashMap::default)
        .entry(message.to_string())
        .and_modify(|count| *count += 1)
        .or_insert(1);
    let repeat = if occurrences > 1 {
        format!(" [×{}]", occurrences)
    } else {
        String::new()
    };

    Engine::log(
        log_severity(message_severity),
        SOURCE,
        format!("[{}] {}{}: {}", type_name(message_type), message_id_name, repeat, message),
    );

    vk::FALSE
}

#[cfg(test)]
#[path = "vulkan_debug_tests.rs"]
mod tests;
