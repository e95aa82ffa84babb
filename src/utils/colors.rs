/// ANSI color helper utilities for terminal output.
use crate::models::AuditEventType;

pub const RESET: &str = "\x1b[0m";

pub const GREY: &str = "\x1b[90m";

pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";

pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";

/// Audit event color:
/// passed → green
/// rejected → yellow
/// failed → red
pub fn color_for_event(event: AuditEventType) -> &'static str {
    match event {
        AuditEventType::BreakValidationPassed => GREEN,
        AuditEventType::BreakValidationRejected => YELLOW,
        AuditEventType::BreakValidationFailed => RED,
    }
}

/// Grey placeholder when the value is missing.
///
/// Example:
/// `colorize_optional(None)` → "<grey>--<reset>"
pub fn colorize_optional(value: Option<String>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => format!("{GREY}--{RESET}"),
    }
}
