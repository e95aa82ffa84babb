//! Learner-facing console lines. Status and countdowns go to stdout,
//! failures to stderr.

use ansi_term::Colour;
use std::fmt;

const ICON_INFO: &str = "ℹ️";
const ICON_OK: &str = "✅";
const ICON_WARN: &str = "⚠️";
const ICON_ERR: &str = "❌";

/// Width of the label column in [`field`] rows.
const LABEL_WIDTH: usize = 16;

fn icon(colour: Colour, icon: &str) -> String {
    colour.bold().paint(icon).to_string()
}

pub fn info<T: fmt::Display>(msg: T) {
    println!("{} {}", icon(Colour::Blue, ICON_INFO), msg);
}

pub fn success<T: fmt::Display>(msg: T) {
    println!("{} {}", icon(Colour::Green, ICON_OK), msg);
}

/// Lockouts, owed breaks, idle pauses.
pub fn warning<T: fmt::Display>(msg: T) {
    println!("{} {}", icon(Colour::Yellow, ICON_WARN), msg);
}

pub fn error<T: fmt::Display>(msg: T) {
    eprintln!("{} {}", icon(Colour::Red, ICON_ERR), msg);
}

/// Title above a session or break status block.
pub fn header<T: fmt::Display>(msg: T) {
    let rule = "=".repeat(22);
    println!("{}\n", Colour::Blue.bold().paint(format!("{rule} {msg}")));
}

/// One `label : value` row of a status block.
pub fn field<T: fmt::Display>(label: &str, value: T) {
    println!("{label:<width$} : {value}", width = LABEL_WIDTH);
}
