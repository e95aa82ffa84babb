use crate::export::{ExportFormat, ExportTarget};
use clap::{Parser, Subcommand};

/// Command-line interface definition for rTimeGuard
/// Time-on-task compliance for self-paced study, with a SQLite server of record
#[derive(Parser)]
#[command(
    name = "rtimeguard",
    version = env!("CARGO_PKG_VERSION"),
    about = "Time-on-task compliance CLI: study clock, server-validated breaks and an append-only audit log",
    long_about = None
)]
pub struct Cli {
    /// Override database path (useful for tests or custom DB)
    #[arg(global = true, long = "db")]
    pub db: Option<String>,

    /// Override the per-session client store (JSON file)
    #[arg(global = true, long = "store")]
    pub store: Option<String>,

    /// Act as this learner instead of the configured default user
    #[arg(global = true, long = "user")]
    pub user: Option<String>,

    /// Run in test mode (no config file update)
    #[arg(global = true, long = "test", hide = true)]
    pub test: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and configuration
    Init,

    /// Manage the configuration file (view or edit)
    Config {
        #[arg(long = "print", help = "Print the current configuration file")]
        print_config: bool,

        #[arg(long = "check", help = "Check configuration file for missing fields")]
        check: bool,

        #[arg(long = "migrate", help = "Run configuration file migrations if needed")]
        migrate: bool,

        #[arg(
            long = "edit",
            help = "Edit the configuration file (default editor: $EDITOR, or nano/vim/notepad)"
        )]
        edit_config: bool,

        #[arg(
            long = "editor",
            help = "Specify the editor to use (vim, nano, or custom path)"
        )]
        editor: Option<String>,
    },

    /// Manage the database (migrations, integrity checks, etc.)
    Db {
        #[arg(long = "migrate", help = "Run pending database migrations")]
        migrate: bool,

        #[arg(long = "check", help = "Check database integrity")]
        check: bool,

        #[arg(long = "vacuum", help = "Optimize the database using VACUUM")]
        vacuum: bool,

        #[arg(long = "info", help = "Show database information")]
        info: bool,
    },

    /// Print or manage the internal log table
    Log {
        #[arg(long = "print", help = "Print rows from the internal log table")]
        print: bool,
    },

    /// Run the live study clock for a session
    Study {
        #[arg(long = "session", help = "Session identifier")]
        session: String,

        #[arg(long = "minutes", help = "Stop after this many minutes of wall time")]
        minutes: Option<u64>,

        #[arg(long = "lesson", help = "Lesson opened during the session (repeatable)")]
        lessons: Vec<String>,
    },

    /// Start, end or inspect a rest break
    Break {
        #[command(subcommand)]
        action: BreakAction,
    },

    /// Print audit log entries
    Audit {
        #[arg(long = "session", help = "Only entries of this session")]
        session: Option<String>,

        #[arg(long = "limit", help = "Only the newest N entries")]
        limit: Option<usize>,
    },

    /// List recorded study sessions
    Sessions,

    /// Export audit entries or session records
    Export {
        #[arg(long, value_enum, default_value = "audit")]
        what: ExportTarget,

        #[arg(long, value_enum, default_value = "csv")]
        format: ExportFormat,

        #[arg(long, value_name = "FILE", help = "Absolute path of the output file")]
        file: String,

        #[arg(long = "session", help = "Only rows of this session")]
        session: Option<String>,

        #[arg(long, short = 'f')]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum BreakAction {
    /// Open a break on the server of record
    Start {
        #[arg(long = "session")]
        session: String,

        #[arg(long = "voluntary", help = "Voluntary break (default is mandatory)")]
        voluntary: bool,
    },

    /// Ask the server to validate the end of the break
    End {
        #[arg(long = "session")]
        session: String,
    },

    /// Show the break state of a session
    Status {
        #[arg(long = "session")]
        session: String,
    },
}
