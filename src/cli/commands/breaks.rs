use crate::cli::commands::{build_engine, open_pool};
use crate::cli::parser::{BreakAction, Cli};
use crate::config::Config;
use crate::core::breaks::{BreakCoordinator, BreakEndOutcome, BreakRequirement};
use crate::core::comprehension::NoQuestions;
use crate::db::log::ttlog;
use crate::errors::{AppError, AppResult};
use crate::models::BreakReason;
use crate::ui::messages::{field, header, info, success, warning};
use crate::utils::time::{format_hh_mm_ss, format_mm_ss};

pub fn handle(action: &BreakAction, cli: &Cli, cfg: &Config) -> AppResult<()> {
    match action {
        BreakAction::Start { session, voluntary } => start(cli, cfg, session, *voluntary),
        BreakAction::End { session } => end(cli, cfg, session),
        BreakAction::Status { session } => status(cli, cfg, session),
    }
}

fn start(cli: &Cli, cfg: &Config, session: &str, voluntary: bool) -> AppResult<()> {
    let mut engine = build_engine(cli, cfg, session, Box::new(NoQuestions))?;

    let requested = if voluntary {
        BreakReason::Voluntary
    } else {
        BreakReason::Mandatory
    };
    let active = engine.start_break(requested)?;

    success(format!(
        "Break started for session {session} ({})",
        active.reason.to_db_str()
    ));
    info(format!(
        "Come back in {} or later, then run `rtimeguard break end --session {session}`.",
        format_mm_ss(engine.breaks().countdown_remaining(engine.now()))
    ));

    let pool = open_pool(cfg)?;
    ttlog(
        &pool.conn,
        "break_start",
        session,
        &format!("{} break {}", active.reason.to_db_str(), active.break_id),
    )?;
    Ok(())
}

fn end(cli: &Cli, cfg: &Config, session: &str) -> AppResult<()> {
    let mut engine = build_engine(cli, cfg, session, Box::new(NoQuestions))?;
    let result = engine.attempt_end_break();
    let pool = open_pool(cfg)?;

    match result {
        Ok(BreakEndOutcome::Completed(entry)) => {
            ttlog(
                &pool.conn,
                "break_passed",
                session,
                &format!("validated duration {}s", entry.duration),
            )?;
            success(format!(
                "Break validated: {} ({}). Study can resume.",
                format_mm_ss(entry.duration),
                if entry.is_mandatory { "mandatory" } else { "voluntary" }
            ));
            Ok(())
        }
        Ok(BreakEndOutcome::StillOnBreak {
            minutes_remaining,
            current_duration_seconds,
        }) => {
            ttlog(
                &pool.conn,
                "break_rejected",
                session,
                &format!("{current_duration_seconds}s elapsed, {minutes_remaining} minute(s) remaining"),
            )?;
            Err(AppError::ValidationRejected {
                minutes_remaining,
                current_duration_seconds,
            })
        }
        Err(e) => {
            if let AppError::SystemError(detail) = &e {
                ttlog(&pool.conn, "break_failed", session, detail)?;
            }
            Err(e)
        }
    }
}

fn status(cli: &Cli, cfg: &Config, session: &str) -> AppResult<()> {
    let engine = build_engine(cli, cfg, session, Box::new(NoQuestions))?;
    let now = engine.now();
    let breaks = engine.breaks();
    let continuous = engine.clock().continuous_seconds();

    header(format!("Session {session}"));

    field("Continuous study", format_hh_mm_ss(continuous));

    match breaks.active_break() {
        Some(active) => {
            field("On break", format!("yes ({})", active.reason.to_db_str()));
            field("Break id", &active.break_id);
            field("Started (client)", active.client_observed_start.to_rfc3339());
            if let Some(server) = active.server_trusted_start {
                field("Started (server)", server.to_rfc3339());
            }
            field("Countdown", format_mm_ss(breaks.countdown_remaining(now)));
        }
        None => {
            field("On break", "no");
            match breaks.requirement() {
                BreakRequirement::Required { .. } => {
                    warning("A mandatory break is due before study can continue.")
                }
                BreakRequirement::NotDue => field(
                    "Break due in",
                    format_hh_mm_ss(BreakCoordinator::time_until_break_required(continuous)),
                ),
            }
        }
    }

    Ok(())
}
