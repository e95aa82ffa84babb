use crate::cli::commands::open_pool;
use crate::cli::parser::Commands;
use crate::config::Config;
use crate::db::log::ttlog;
use crate::errors::AppResult;
use crate::export::ExportLogic;

pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::Export {
        what,
        format,
        file,
        session,
        force,
    } = cmd
    {
        let mut pool = open_pool(cfg)?;
        let n = ExportLogic::export(&mut pool, *what, *format, file, session.as_deref(), *force)?;

        if n > 0 {
            ttlog(
                &pool.conn,
                "export",
                what.as_str(),
                &format!("{n} row(s) to {file} ({})", format.as_str()),
            )?;
        }
    }
    Ok(())
}
