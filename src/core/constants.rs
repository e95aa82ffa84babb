//! Regulatory time-on-task limits. Not configurable: the storage rules in
//! `db::migrate` repeat `MIN_BREAK_SECONDS` literally.

/// Hard daily instructional cap (4 hours).
pub const MAX_DAILY_SECONDS: u64 = 14_400;

/// Continuous study after which a rest break becomes mandatory (2 hours).
pub const BREAK_REQUIRED_AFTER_SECONDS: u64 = 7_200;

/// Shortest break the authority accepts (10 minutes).
pub const MIN_BREAK_SECONDS: u64 = 600;

/// Base spacing between comprehension checks (30 minutes).
pub const PVQ_BASE_INTERVAL_SECONDS: u64 = 1_800;

/// Random jitter added to each comprehension check, `[min, max)`.
pub const PVQ_RANDOM_OFFSET_MIN_SECONDS: u64 = 300;
pub const PVQ_RANDOM_OFFSET_MAX_SECONDS: u64 = 600;

/// Running clock pauses itself after this long without learner activity
/// (15 minutes).
pub const IDLE_TIMEOUT_SECONDS: u64 = 900;

/// Audit entries are retained for three years.
pub const AUDIT_RETENTION_DAYS: i64 = 1_095;
