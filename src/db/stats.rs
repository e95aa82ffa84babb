use crate::db::pool::DbPool;
use crate::db::{audit, breaks, sessions};
use crate::errors::AppResult;
use crate::utils::colors::{CYAN, GREEN, RESET, YELLOW, colorize_optional};
use rusqlite::OptionalExtension;
use std::fs;

pub fn print_db_info(pool: &mut DbPool, db_path: &str) -> AppResult<()> {
    println!();

    //
    // 1) FILE SIZE
    //
    let file_size = fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);
    let file_mb = (file_size as f64) / (1024.0 * 1024.0);

    println!("{}• File:{} {}{}{}", CYAN, RESET, YELLOW, db_path, RESET);
    println!("{}• Size:{} {:.2} MB", CYAN, RESET, file_mb);

    //
    // 2) BREAKS BY STATUS
    //
    let by_status = breaks::count_by_status(&pool.conn)?;
    let total: i64 = by_status.iter().map(|(_, n)| n).sum();
    println!("{}• Breaks:{} {}{}{}", CYAN, RESET, GREEN, total, RESET);
    for (status, n) in by_status {
        println!("    {:<10} {}", status.to_db_str(), n);
    }

    //
    // 3) AUDIT + SESSIONS
    //
    println!(
        "{}• Audit entries:{} {}{}{}",
        CYAN,
        RESET,
        GREEN,
        audit::count(&pool.conn)?,
        RESET
    );
    println!(
        "{}• Session records:{} {}{}{}",
        CYAN,
        RESET,
        GREEN,
        sessions::count(&pool.conn)?,
        RESET
    );

    //
    // 4) AUDIT RANGE
    //
    let first: Option<String> = pool
        .conn
        .query_row("SELECT timestamp FROM audit_log ORDER BY id ASC LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;
    let last: Option<String> = pool
        .conn
        .query_row("SELECT timestamp FROM audit_log ORDER BY id DESC LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    println!("{}• Audit range:{}", CYAN, RESET);
    println!("    from: {}", colorize_optional(first));
    println!("    to:   {}", colorize_optional(last));

    println!();
    Ok(())
}
