//! Session open/close and lesson-access bookkeeping, for reporting and
//! resume. No timing side effects of its own.

use crate::models::SessionRecord;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Default, Clone)]
pub struct SessionRecorder {
    current: Option<SessionRecord>,
    history: Vec<SessionRecord>,
}

impl SessionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new record with an empty lesson list. A record still open is
    /// replaced, not closed.
    pub fn create_session(
        &mut self,
        session_id: &str,
        metadata: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> &SessionRecord {
        if let Some(previous) = &self.current {
            warn!(
                previous = %previous.session_id,
                session_id,
                "replacing a session record that was never closed"
            );
        }

        self.current.insert(SessionRecord {
            session_id: session_id.to_string(),
            start_time: now,
            end_time: None,
            lessons_accessed: Vec::new(),
            metadata,
        })
    }

    /// Append a lesson once. Returns `false` for repeats, empty ids, or when
    /// no session is open.
    pub fn record_lesson_access(&mut self, lesson_id: &str) -> bool {
        let Some(current) = self.current.as_mut() else {
            return false;
        };

        if lesson_id.is_empty() || current.lessons_accessed.iter().any(|l| l == lesson_id) {
            return false;
        }

        current.lessons_accessed.push(lesson_id.to_string());
        debug!(session_id = %current.session_id, lesson_id, "lesson accessed");
        true
    }

    /// Finalize the open record and move it to the history.
    pub fn close_session(&mut self, now: DateTime<Utc>) -> Option<SessionRecord> {
        let mut record = self.current.take()?;
        record.end_time = Some(now);

        self.history.push(record.clone());
        Some(record)
    }

    pub fn current(&self) -> Option<&SessionRecord> {
        self.current.as_ref()
    }

    pub fn current_session_id(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.session_id.as_str())
    }

    pub fn lessons_accessed(&self) -> &[String] {
        self.current
            .as_ref()
            .map(|s| s.lessons_accessed.as_slice())
            .unwrap_or(&[])
    }

    pub fn lesson_count(&self) -> usize {
        self.lessons_accessed().len()
    }

    pub fn history(&self) -> &[SessionRecord] {
        &self.history
    }

    pub fn session_count(&self) -> usize {
        self.history.len()
    }
}
