use crate::db::log::load_log;
use crate::db::pool::DbPool;
use crate::errors::AppResult;
use ansi_term::Colour;
use regex::Regex;
use std::sync::OnceLock;

const OP_WIDTH_MAX: usize = 60;

fn ansi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1B\[[0-9;]*[mK]").expect("valid ANSI pattern"))
}

fn strip_ansi(s: &str) -> String {
    ansi_re().replace_all(s, "").into_owned()
}

/// ANSI colour of a log operation.
fn color_for_operation(op: &str) -> Colour {
    match op {
        "break_start" => Colour::Cyan,
        "break_passed" => Colour::Green,
        "break_rejected" => Colour::Yellow,
        "break_failed" => Colour::Red,
        "study" => Colour::Blue,
        "export" => Colour::White,
        "migration_applied" => Colour::Purple,
        "init" => Colour::RGB(255, 153, 51),
        _ => Colour::White,
    }
}

/// `operation (target)`, cut to the column width without ANSI codes and
/// with only the operation word coloured.
fn render_op_target(operation: &str, target: &str) -> String {
    let color = color_for_operation(operation);
    let plain = if target.is_empty() {
        operation.to_string()
    } else {
        format!("{operation} ({target})")
    };

    let visible = if plain.chars().count() > OP_WIDTH_MAX {
        let mut s: String = plain.chars().take(OP_WIDTH_MAX - 3).collect();
        s.push_str("...");
        s
    } else {
        plain
    };

    match visible.split_once(' ') {
        Some((op_word, rest)) => format!("{} {}", color.paint(op_word), rest),
        None => color.paint(visible.as_str()).to_string(),
    }
}

pub struct LogLogic;

impl LogLogic {
    pub fn print_log(pool: &mut DbPool) -> AppResult<()> {
        let mut entries = load_log(&pool.conn)?;
        entries.reverse();

        if entries.is_empty() {
            println!("📜 Internal log is empty.");
            return Ok(());
        }

        let rendered: Vec<(String, String, String)> = entries
            .into_iter()
            .map(|(raw_date, operation, target, message)| {
                let date = chrono::DateTime::parse_from_rfc3339(&raw_date)
                    .map(|dt| dt.format("%FT%T%:z").to_string())
                    .unwrap_or(raw_date);
                (date, render_op_target(&operation, &target), message)
            })
            .collect();

        let op_w = rendered
            .iter()
            .map(|(_, op, _)| strip_ansi(op).chars().count())
            .max()
            .unwrap_or(10)
            .min(OP_WIDTH_MAX);
        let date_w = rendered.iter().map(|(d, _, _)| d.len()).max().unwrap_or(0);
        let id_w = rendered.len().to_string().len();

        println!("📜 Internal log:\n");

        for (i, (date, op, message)) in rendered.iter().enumerate() {
            let padding = " ".repeat(op_w.saturating_sub(strip_ansi(op).chars().count()));
            println!(
                "{:>id_w$}: {:<date_w$} | {}{} => {}",
                i + 1,
                date,
                op,
                padding,
                message,
                id_w = id_w,
                date_w = date_w
            );
        }

        Ok(())
    }
}

