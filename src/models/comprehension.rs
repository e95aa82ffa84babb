use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
}

/// What is forwarded to the submission hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    pub question: Question,
    pub answer: String,
    pub time_to_answer_ms: u64,
}

/// A finished comprehension check (answered or dismissed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComprehensionCheck {
    pub question: Question,
    pub presented_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub answer: Option<String>,
    pub time_to_answer_ms: Option<u64>,
    /// Continuous-study second at which the following check fires.
    pub next_trigger_threshold: u64,
    pub dismissed: bool,
}

/// In-progress answer kept in the local store under `pvq_draft_<questionId>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvqDraft {
    pub selected_answer: Option<String>,
    pub feedback: Option<String>,
    pub submitted: bool,
}
