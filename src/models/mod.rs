//! Data model shared by the client state machines and the server of record.

pub mod audit;
pub mod break_record;
pub mod comprehension;
pub mod session;

pub use audit::{AuditEventType, AuditLogEntry};
pub use break_record::{Break, BreakHistoryEntry, BreakReason, BreakStatus};
pub use comprehension::{AnswerSubmission, ComprehensionCheck, PvqDraft, Question};
pub use session::{ComplianceSession, SessionRecord};
