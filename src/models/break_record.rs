use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BreakReason {
    Mandatory,
    Voluntary,
}

impl BreakReason {
    /// Convert enum → DB string
    pub fn to_db_str(&self) -> &'static str {
        match self {
            BreakReason::Mandatory => "mandatory",
            BreakReason::Voluntary => "voluntary",
        }
    }

    /// Convert DB string → enum
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "mandatory" => Some(BreakReason::Mandatory),
            "voluntary" => Some(BreakReason::Voluntary),
            _ => None,
        }
    }

    pub fn is_mandatory(&self) -> bool {
        matches!(self, BreakReason::Mandatory)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BreakStatus {
    Active,
    Completed,
    Rejected,
}

impl BreakStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            BreakStatus::Active => "active",
            BreakStatus::Completed => "completed",
            BreakStatus::Rejected => "rejected",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(BreakStatus::Active),
            "completed" => Some(BreakStatus::Completed),
            "rejected" => Some(BreakStatus::Rejected),
            _ => None,
        }
    }
}

/// Server-of-record break row.
///
/// `server_trusted_start` is written once by the authority at insert time.
/// `client_observed_start` and `client_claimed_duration` are kept for
/// reporting only and never feed the validation.
#[derive(Debug, Clone, Serialize)]
pub struct Break {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub reason: BreakReason,
    pub client_observed_start: Option<DateTime<Utc>>,
    pub server_trusted_start: DateTime<Utc>,
    pub client_claimed_duration: Option<u64>,
    pub server_validated_duration: Option<u64>,
    pub validated_by_server: bool,
    pub validated_at: Option<DateTime<Utc>>,
    pub status: BreakStatus,
}

impl Break {
    pub fn is_active(&self) -> bool {
        self.status == BreakStatus::Active
    }

    pub fn is_completed(&self) -> bool {
        self.status == BreakStatus::Completed
    }
}

/// One finished break, as remembered by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakHistoryEntry {
    pub timestamp: DateTime<Utc>,
    /// Seconds, as validated by the authority.
    pub duration: u64,
    pub is_mandatory: bool,
}
