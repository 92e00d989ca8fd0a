//! Unit tests for vulkan_debug.rs
//!
//! The callback is driven directly with hand-built callback data. Counters
//! and the logger are process-wide, so every test runs under #[serial].

use super::*;
use nova_render::nova::log::{Logger, LogEntry};
use serial_test::serial;
use std::ffi::CString;
use std::sync::Arc;

#[derive(Clone)]
struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        if entry.source == SOURCE {
            self.entries.lock().unwrap().push(entry.clone());
        }
    }
}

fn deliver(severity: vk::DebugUtilsMessageSeverityFlagsEXT, id: &str, text: &str) {
    let id = CString::new(id).unwrap();
    let text = CString::new(text).unwrap();
    let mut data = vk::DebugUtilsMessengerCallbackDataEXT::default();
    data.p_message_id_name = id.as_ptr();
    data.p_message = text.as_ptr();
    unsafe {
        vulkan_debug_callback(
            severity,
            vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
            &data,
            std::ptr::null_mut(),
        );
    }
}

#[test]
fn test_severity_flags_widen_with_lower_minimum() {
    assert_eq!(
        messenger_severity_flags(DebugSeverity::Error),
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
    );
    assert_eq!(
        messenger_severity_flags(DebugSeverity::Warning),
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
    );
    let all = messenger_severity_flags(DebugSeverity::Verbose);
    assert!(all.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO));
    assert!(all.contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
}

#[test]
fn test_log_severity_mapping() {
    assert_eq!(log_severity(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR), LogSeverity::Error);
    assert_eq!(log_severity(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING), LogSeverity::Warn);
    assert_eq!(log_severity(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE), LogSeverity::Trace);
}

#[test]
#[serial]
fn test_callback_counts_and_forwards_messages() {
    let capture = CaptureLogger { entries: Arc::new(Mutex::new(Vec::new())) };
    Engine::set_logger(capture.clone());
    init_debug_config(DebugSeverity::Warning);

    deliver(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR, "VUID-vkCmdDraw-None-08600", "layout not bound");
    deliver(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING, "BestPractices-Pipeline", "pipeline unused");
    // Below the minimum: neither counted nor logged
    deliver(vk::DebugUtilsMessageSeverityFlagsEXT::INFO, "Loader", "layer loaded");

    let stats = validation_stats();
    let entries = capture.entries.lock().unwrap().clone();
    cleanup_debug_config();
    Engine::reset_logger();

    assert_eq!(stats.errors, 1);
    assert_eq!(stats.warnings, 1);
    assert_eq!(stats.info, 0);
    assert_eq!(stats.total(), 2);

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].severity, LogSeverity::Error);
    assert!(entries[0].message.contains("VUID-vkCmdDraw-None-08600"));
    assert!(entries[0].message.contains("[Validation]"));
    assert_eq!(entries[1].severity, LogSeverity::Warn);
}

#[test]
#[serial]
fn test_repeated_messages_are_grouped() {
    let capture = CaptureLogger { entries: Arc::new(Mutex::new(Vec::new())) };
    Engine::set_logger(capture.clone());
    init_debug_config(DebugSeverity::Error);

    for _ in 0..3 {
        deliver(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR, "VUID-x", "same text");
    }

    let entries = capture.entries.lock().unwrap().clone();
    let stats = validation_stats();
    cleanup_debug_config();
    Engine::reset_logger();

    assert_eq!(stats.errors, 3);
    assert!(!entries[0].message.contains('×'));
    assert!(entries[2].message.contains("[×3]"));
}

#[test]
#[serial]
fn test_callback_ignored_without_config() {
    init_debug_config(DebugSeverity::Verbose);
    cleanup_debug_config();

    deliver(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR, "VUID-y", "after shutdown");

    assert_eq!(validation_stats().total(), 0);
}

#[test]
#[serial]
fn test_reset_validation_stats() {
    init_debug_config(DebugSeverity::Verbose);
    deliver(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE, "Loader", "chatter");
    assert_eq!(validation_stats().verbose, 1);

    reset_validation_stats();
    let stats = validation_stats();
    cleanup_debug_config();

    assert_eq!(stats, ValidationStats::default());
}
