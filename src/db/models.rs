//! Database row models that wrap domain types with storage-only columns.

use crate::models::SessionRecord;
use serde::Serialize;

/// A `session_records` row.
#[derive(Debug, Clone, Serialize)]
pub struct StoredSession {
    pub id: i64,
    pub user_id: String,
    #[serde(flatten)]
    pub record: SessionRecord,
}
