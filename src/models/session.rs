use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of the study counters of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceSession {
    pub id: Option<String>,
    /// Resets on break completion or stop.
    pub continuous_seconds: u64,
    /// Monotonic within a compliance day.
    pub daily_seconds: u64,
    pub is_active: bool,
    pub is_paused: bool,
    pub is_locked_out: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Ordered, no duplicates.
    pub lessons_accessed: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl SessionRecord {
    pub fn lesson_count(&self) -> usize {
        self.lessons_accessed.len()
    }
}
