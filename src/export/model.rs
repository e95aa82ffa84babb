use crate::db::models::StoredSession;
use crate::models::AuditLogEntry;
use serde::Serialize;

/// Flat audit row for CSV / JSON.
#[derive(Serialize, Clone, Debug)]
pub struct AuditExport {
    pub id: i64,
    pub event_type: String,
    pub user_id: String,
    pub session_id: String,
    pub break_id: String,
    pub computed_duration_seconds: Option<u64>,
    pub timestamp: String,
    pub source: String,
    pub detail: String,
    pub retention_expires_at: String,
}

impl From<&AuditLogEntry> for AuditExport {
    fn from(e: &AuditLogEntry) -> Self {
        Self {
            id: e.id,
            event_type: e.event_type.as_str().to_string(),
            user_id: e.user_id.clone(),
            session_id: e.session_id.clone(),
            break_id: e.break_id.clone().unwrap_or_default(),
            computed_duration_seconds: e.computed_duration_seconds,
            timestamp: e.timestamp.to_rfc3339(),
            source: e.source.clone(),
            detail: e.detail.clone(),
            retention_expires_at: e.retention_expires_at.to_rfc3339(),
        }
    }
}

/// Flat session row; lessons are `;`-joined so CSV stays one row per
/// session.
#[derive(Serialize, Clone, Debug)]
pub struct SessionExport {
    pub id: i64,
    pub user_id: String,
    pub session_id: String,
    pub start_time: String,
    pub end_time: String,
    pub lesson_count: usize,
    pub lessons: String,
}

impl From<&StoredSession> for SessionExport {
    fn from(s: &StoredSession) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id.clone(),
            session_id: s.record.session_id.clone(),
            start_time: s.record.start_time.to_rfc3339(),
            end_time: s
                .record
                .end_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            lesson_count: s.record.lesson_count(),
            lessons: s.record.lessons_accessed.join(";"),
        }
    }
}
