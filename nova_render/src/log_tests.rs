//! Unit tests for log.rs
//!
//! Tests LogSeverity ordering, LogEntry construction and DefaultLogger formatting.

use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
use std::time::{Duration, SystemTime};

// ============================================================================
// LOG SEVERITY TESTS
// ============================================================================

#[test]
fn test_log_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

// ============================================================================
// LOG ENTRY TESTS
// ============================================================================

#[test]
fn test_log_entry_new_has_no_location() {
    let entry = LogEntry::new(LogSeverity::Info, "nova::FrameScheduler", "ready".to_string());

    assert_eq!(entry.severity, LogSeverity::Info);
    assert_eq!(entry.source, "nova::FrameScheduler");
    assert_eq!(entry.message, "ready");
    assert!(entry.file.is_none());
    assert!(entry.line.is_none());
}

#[test]
fn test_log_entry_with_location() {
    let entry = LogEntry::new(LogSeverity::Error, "nova::vulkan", "lost".to_string())
        .with_location("vulkan_device.rs", 120);

    assert_eq!(entry.file, Some("vulkan_device.rs"));
    assert_eq!(entry.line, Some(120));
}

// ============================================================================
// DEFAULT LOGGER TESTS
// ============================================================================

#[test]
fn test_format_plain_without_location() {
    let mut entry = LogEntry::new(LogSeverity::Warn, "nova::MemoryManager", "leak".to_string());
    entry.timestamp = SystemTime::UNIX_EPOCH + Duration::from_secs(3600 * 24 * 365);

    let line = DefaultLogger::format_plain(&entry);

    assert!(line.contains("[WARN ]"));
    assert!(line.contains("[nova::MemoryManager]"));
    assert!(line.ends_with("leak"));
}

#[test]
fn test_format_plain_with_location() {
    let entry = LogEntry::new(LogSeverity::Error, "nova::Pipeline", "bad layout".to_string())
        .with_location("pipeline_builder.rs", 88);

    let line = DefaultLogger::format_plain(&entry);

    assert!(line.contains("[ERROR]"));
    assert!(line.ends_with("bad layout (pipeline_builder.rs:88)"));
}

#[test]
fn test_format_plain_timestamp_shape() {
    let entry = LogEntry::new(LogSeverity::Info, "nova::test", "x".to_string());
    let line = DefaultLogger::format_plain(&entry);

    // [YYYY-MM-DD HH:MM:SS.mmm]
    let close = line.find(']').unwrap();
    assert_eq!(close, 24);
}

#[test]
fn test_default_logger_min_severity() {
    assert_eq!(DefaultLogger::new().min_severity(), LogSeverity::Trace);
    assert_eq!(DefaultLogger::default().min_severity(), LogSeverity::Trace);

    let logger = DefaultLogger::with_min_severity(LogSeverity::Warn);
    assert_eq!(logger.min_severity(), LogSeverity::Warn);

    // Below the floor: filtered, must not panic
    logger.log(&LogEntry::new(LogSeverity::Debug, "nova::test", "filtered".to_string()));
    logger.log(&LogEntry::new(LogSeverity::Error, "nova::test", "printed".to_string()));
}

#[test]
fn test_logger_trait_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<DefaultLogger>();
}
