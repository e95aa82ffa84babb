//! Per-session durable key-value store (client side).
//!
//! The clock and the break coordinator are the only writers of their keys.
//! Values are plain strings; structured values are JSON.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::errors::{AppError, AppResult};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

pub trait KeyValueStore {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&mut self, key: &str) -> AppResult<()>;
}

pub fn session_time_key(session_id: &str) -> String {
    format!("session_time_{session_id}")
}

pub fn break_state_key(session_id: &str) -> String {
    format!("break_state_{session_id}")
}

pub fn pvq_draft_key(question_id: &str) -> String {
    format!("pvq_draft_{question_id}")
}

/// Id of the comprehension question last presented in a session.
pub fn pvq_open_key(session_id: &str) -> String {
    format!("pvq_open_{session_id}")
}

/// Client-side break state, persisted under `break_state_<sessionId>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedBreakState {
    pub is_on_break: bool,
    /// Milliseconds since the Unix epoch, client clock.
    pub break_start_time: Option<i64>,
    pub is_break_mandatory: bool,
    /// Server-of-record id of the break, when the authority issued one.
    #[serde(default)]
    pub break_id: Option<String>,
}

impl PersistedBreakState {
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.break_start_time
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

pub fn get_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> AppResult<Option<T>> {
    match store.get(key)? {
        Some(raw) => {
            let value = serde_json::from_str(&raw)
                .map_err(|e| AppError::Persistence(format!("corrupt value under '{key}': {e}")))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

pub fn set_json<T: Serialize>(store: &mut dyn KeyValueStore, key: &str, value: &T) -> AppResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}
