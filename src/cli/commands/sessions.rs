use crate::cli::commands::{open_pool, resolve_user};
use crate::cli::parser::Cli;
use crate::config::Config;
use crate::db::sessions::list_session_records;
use crate::errors::AppResult;
use crate::ui::messages::info;
use crate::utils::colors::{GREY, RESET};
use crate::utils::table::{Column, Table};
use crate::utils::time::{elapsed_secs, format_hh_mm_ss};

/// List the recorded sessions of the acting user.
pub fn handle(cli: &Cli, cfg: &Config) -> AppResult<()> {
    let pool = open_pool(cfg)?;
    let user = resolve_user(cli, cfg);
    let records = list_session_records(&pool.conn, Some(&user))?;

    if records.is_empty() {
        info(format!("No recorded sessions for {user}."));
        return Ok(());
    }

    let mut table = Table::new(vec![
        Column::new("SESSION", 18),
        Column::new("START", 20),
        Column::new("LENGTH", 9),
        Column::new("LESSONS", 7),
        Column::new("ACCESSED", 30),
    ]);

    for s in &records {
        let r = &s.record;
        table.add_row(vec![
            r.session_id.clone(),
            r.start_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            r.end_time
                .map(|end| format_hh_mm_ss(elapsed_secs(r.start_time, end)))
                .unwrap_or_else(|| "--".to_string()),
            r.lesson_count().to_string(),
            r.lessons_accessed.join(", "),
        ]);
    }

    print!("{}", table.render());
    println!("{GREY}{} session(s) for {user}{RESET}", records.len());
    Ok(())
}
