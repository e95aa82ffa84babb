use crate::core::constants::AUDIT_RETENTION_DAYS;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    BreakValidationPassed,
    BreakValidationRejected,
    BreakValidationFailed,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::BreakValidationPassed => "BREAK_VALIDATION_PASSED",
            AuditEventType::BreakValidationRejected => "BREAK_VALIDATION_REJECTED",
            AuditEventType::BreakValidationFailed => "BREAK_VALIDATION_FAILED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "BREAK_VALIDATION_PASSED" => Some(Self::BreakValidationPassed),
            "BREAK_VALIDATION_REJECTED" => Some(Self::BreakValidationRejected),
            "BREAK_VALIDATION_FAILED" => Some(Self::BreakValidationFailed),
            _ => None,
        }
    }
}

/// Append-only audit row (`audit_log` table).
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub event_type: AuditEventType,
    pub user_id: String,
    pub session_id: String,
    pub break_id: Option<String>,
    pub computed_duration_seconds: Option<u64>,
    /// Server clock.
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub detail: String,
    pub retention_expires_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Build an entry that is not yet stored (`id = 0`, assigned on insert).
    pub fn new(
        event_type: AuditEventType,
        user_id: &str,
        session_id: &str,
        computed_duration_seconds: Option<u64>,
        timestamp: DateTime<Utc>,
        source: &str,
    ) -> Self {
        Self {
            id: 0,
            event_type,
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            break_id: None,
            computed_duration_seconds,
            timestamp,
            source: source.to_string(),
            detail: String::new(),
            retention_expires_at: timestamp + Duration::days(AUDIT_RETENTION_DAYS),
        }
    }

    pub fn with_break(mut self, break_id: &str) -> Self {
        self.break_id = Some(break_id.to_string());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}
