use crate::cli::commands::open_pool;
use crate::cli::parser::Commands;
use crate::config::Config;
use crate::db::audit::{self, AuditFilter};
use crate::errors::AppResult;
use crate::models::AuditEventType;
use crate::ui::messages::info;
use crate::utils::colors::{RESET, color_for_event};
use crate::utils::table::{Column, Table};

fn colored_event(event: AuditEventType) -> String {
    format!("{}{}{RESET}", color_for_event(event), event.as_str())
}

pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::Audit { session, limit } = cmd {
        let pool = open_pool(cfg)?;
        let entries = audit::list(
            &pool.conn,
            &AuditFilter {
                session_id: session.clone(),
                event_type: None,
                limit: *limit,
            },
        )?;

        if entries.is_empty() {
            info("No audit entries.");
            return Ok(());
        }

        let mut table = Table::new(vec![
            Column::new("ID", 5),
            Column::new("TIMESTAMP", 25),
            Column::new("EVENT", 25),
            Column::new("USER", 12),
            Column::new("SESSION", 16),
            Column::new("SECONDS", 8),
            Column::new("DETAIL", 24),
        ]);

        for e in &entries {
            table.add_row(vec![
                e.id.to_string(),
                e.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                e.event_type.as_str().to_string(),
                e.user_id.clone(),
                e.session_id.clone(),
                e.computed_duration_seconds
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "--".to_string()),
                e.detail.clone(),
            ]);
        }

        // colour after padding so widths stay aligned
        let rendered = table.render();
        let mut out = String::with_capacity(rendered.len());
        for line in rendered.lines() {
            let mut l = line.to_string();
            for e in [
                AuditEventType::BreakValidationPassed,
                AuditEventType::BreakValidationRejected,
                AuditEventType::BreakValidationFailed,
            ] {
                l = l.replace(e.as_str(), &colored_event(e));
            }
            out.push_str(&l);
            out.push('\n');
        }
        print!("{out}");
        println!("{} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
    }

    Ok(())
}
