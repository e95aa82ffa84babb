//! SQLite-backed authority. Durations are always recomputed from the stored
//! server start and this authority's own clock.

use super::{BreakAuthority, OpenedBreak, ValidationOutcome};
use crate::core::constants::MIN_BREAK_SECONDS;
use crate::db::pool::DbPool;
use crate::db::{audit, breaks};
use crate::errors::{AppError, AppResult};
use crate::models::{AuditEventType, AuditLogEntry, Break, BreakReason, BreakStatus};
use crate::utils::time::{TimeSource, minutes_remaining_ceil};
use chrono::{DateTime, Utc};
use rusqlite::TransactionBehavior;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct SqliteAuthority {
    pool: DbPool,
    user_id: String,
    clock: Box<dyn TimeSource>,
    source: String,
}

impl SqliteAuthority {
    /// `user_id` is the authenticated caller; `source` tags audit entries.
    pub fn new(pool: DbPool, user_id: &str, clock: Box<dyn TimeSource>, source: &str) -> Self {
        Self {
            pool,
            user_id: user_id.to_string(),
            clock,
            source: source.to_string(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut DbPool {
        &mut self.pool
    }

    pub fn into_pool(self) -> DbPool {
        self.pool
    }

    /// Keep the duration the client believes it observed, for reporting.
    /// It never takes part in a validation.
    pub fn record_client_claim(&mut self, session_id: &str, claimed_seconds: u64) -> AppResult<()> {
        let conn = &self.pool.conn;
        match breaks::active_for_session(conn, session_id)? {
            Some(b) => breaks::record_client_claim(conn, &b.id, claimed_seconds),
            None => Err(AppError::NotFound(format!("active break for session {session_id}"))),
        }
    }

    fn audit_entry(
        &self,
        event_type: AuditEventType,
        session_id: &str,
        duration: Option<u64>,
        now: DateTime<Utc>,
    ) -> AuditLogEntry {
        AuditLogEntry::new(event_type, &self.user_id, session_id, duration, now, &self.source)
    }

    /// The actual validation, inside one immediate transaction. Only
    /// `Unauthorized` and genuine failures escape as errors.
    fn validate_in_tx(&mut self, session_id: &str, now: DateTime<Utc>) -> AppResult<ValidationOutcome> {
        let tx = self
            .pool
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = breaks::latest_for_session(&tx, session_id)?
            .ok_or_else(|| AppError::NotFound(format!("no break for session {session_id}")))?;

        if current.user_id != self.user_id {
            return Err(AppError::Unauthorized(format!(
                "break {} does not belong to user {}",
                current.id, self.user_id
            )));
        }

        let duration = (now.timestamp() - current.server_trusted_start.timestamp()).max(0) as u64;

        match current.status {
            BreakStatus::Completed => {
                let entry = AuditLogEntry::new(
                    AuditEventType::BreakValidationRejected,
                    &self.user_id,
                    session_id,
                    current.server_validated_duration,
                    now,
                    &self.source,
                )
                .with_break(&current.id)
                .with_detail("already_completed");
                audit::append(&tx, &entry)?;
                tx.commit()?;

                warn!(session_id, break_id = %current.id, "second completion attempt refused");
                return Err(AppError::DuplicateSubmission(format!(
                    "break {} is already completed",
                    current.id
                )));
            }
            BreakStatus::Rejected => {
                return Err(AppError::InvalidState(format!(
                    "break {} was abandoned",
                    current.id
                )));
            }
            BreakStatus::Active => {}
        }

        if duration >= MIN_BREAK_SECONDS {
            breaks::complete_break(&tx, &current.id, duration, now)?;
            let entry = AuditLogEntry::new(
                AuditEventType::BreakValidationPassed,
                &self.user_id,
                session_id,
                Some(duration),
                now,
                &self.source,
            )
            .with_break(&current.id);
            audit::append(&tx, &entry)?;
            tx.commit()?;

            info!(session_id, break_id = %current.id, duration_seconds = duration, "break validated");
            Ok(ValidationOutcome::Accepted {
                validated_duration_seconds: duration,
            })
        } else {
            let minutes_remaining = minutes_remaining_ceil(MIN_BREAK_SECONDS - duration);
            let entry = AuditLogEntry::new(
                AuditEventType::BreakValidationRejected,
                &self.user_id,
                session_id,
                Some(duration),
                now,
                &self.source,
            )
            .with_break(&current.id)
            .with_detail(format!("{minutes_remaining} minute(s) remaining"));
            audit::append(&tx, &entry)?;
            tx.commit()?;

            info!(session_id, duration_seconds = duration, minutes_remaining, "break too short");
            Ok(ValidationOutcome::Rejected {
                minutes_remaining,
                current_duration_seconds: duration,
            })
        }
    }
}

impl BreakAuthority for SqliteAuthority {
    fn open_break(
        &mut self,
        session_id: &str,
        reason: BreakReason,
        client_observed_start: DateTime<Utc>,
    ) -> AppResult<OpenedBreak> {
        let now = self.clock.now();
        let tx = self
            .pool
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(active) = breaks::active_for_session(&tx, session_id)? {
            return Err(AppError::InvalidState(format!(
                "break {} is already active for session {session_id}",
                active.id
            )));
        }

        let row = Break {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            session_id: session_id.to_string(),
            reason,
            client_observed_start: Some(client_observed_start),
            server_trusted_start: now,
            client_claimed_duration: None,
            server_validated_duration: None,
            validated_by_server: false,
            validated_at: None,
            status: BreakStatus::Active,
        };
        breaks::insert_break(&tx, &row)?;
        tx.commit()?;

        info!(
            session_id,
            break_id = %row.id,
            reason = reason.to_db_str(),
            "break opened on the server of record"
        );

        Ok(OpenedBreak {
            break_id: row.id,
            server_trusted_start: now,
        })
    }

    fn validate_break_end(&mut self, session_id: &str) -> AppResult<ValidationOutcome> {
        let now = self.clock.now();

        match self.validate_in_tx(session_id, now) {
            Ok(outcome) => Ok(outcome),
            Err(e @ AppError::DuplicateSubmission(_)) => Err(e),
            Err(e) => {
                // the transaction was dropped, so nothing of it was kept
                let entry = self
                    .audit_entry(AuditEventType::BreakValidationFailed, session_id, None, now)
                    .with_detail(e.to_string());
                if let Err(audit_err) = audit::append(&self.pool.conn, &entry) {
                    error!(session_id, error = %audit_err, "could not record failed validation");
                }

                match e {
                    AppError::Unauthorized(_) => {
                        warn!(session_id, user_id = %self.user_id, "validation refused: not the owner");
                        Err(e)
                    }
                    AppError::NotFound(_) | AppError::InvalidState(_) => {
                        warn!(session_id, error = %e, "nothing to validate");
                        Err(e)
                    }
                    other => {
                        error!(session_id, error = %other, "break validation failed");
                        Err(AppError::SystemError(other.to_string()))
                    }
                }
            }
        }
    }

    fn abandon_break(&mut self, session_id: &str) -> AppResult<()> {
        let conn = &self.pool.conn;
        let Some(active) = breaks::active_for_session(conn, session_id)? else {
            return Ok(());
        };

        if active.user_id != self.user_id {
            return Err(AppError::Unauthorized(format!(
                "break {} does not belong to user {}",
                active.id, self.user_id
            )));
        }

        breaks::reject_break(conn, &active.id)?;
        info!(session_id, break_id = %active.id, "break abandoned");
        Ok(())
    }

    fn current_break(&mut self, session_id: &str) -> AppResult<Option<Break>> {
        breaks::active_for_session(&self.pool.conn, session_id)
    }

    fn latest_break(&mut self, session_id: &str) -> AppResult<Option<Break>> {
        breaks::latest_for_session(&self.pool.conn, session_id)
    }
}
