use crate::db::audit::{self, AuditFilter};
use crate::db::pool::DbPool;
use crate::db::sessions;
use crate::errors::{AppError, AppResult};
use crate::export::fs_utils::ensure_writable;
use crate::export::json_csv::{export_csv, export_json};
use crate::export::model::{AuditExport, SessionExport};
use crate::export::{ExportFormat, ExportTarget};
use crate::ui::messages::warning;
use serde::Serialize;
use std::path::Path;

/// High-level export entry point.
pub struct ExportLogic;

impl ExportLogic {
    /// Export `target` to the absolute path `file`. Returns the number of
    /// rows written; nothing is written when there is nothing to export.
    pub fn export(
        pool: &mut DbPool,
        target: ExportTarget,
        format: ExportFormat,
        file: &str,
        session_id: Option<&str>,
        force: bool,
    ) -> AppResult<usize> {
        let path = Path::new(file);

        if !path.is_absolute() {
            return Err(AppError::Export(format!(
                "Output file path must be absolute: {file}"
            )));
        }

        ensure_writable(path, force)?;

        match target {
            ExportTarget::Audit => {
                let filter = AuditFilter {
                    session_id: session_id.map(str::to_string),
                    ..AuditFilter::default()
                };
                let rows: Vec<AuditExport> = audit::list(&pool.conn, &filter)?
                    .iter()
                    .map(AuditExport::from)
                    .collect();
                write_rows(&rows, format, path, target)
            }
            ExportTarget::Sessions => {
                let rows: Vec<SessionExport> = sessions::list_session_records(&pool.conn, None)?
                    .iter()
                    .filter(|s| session_id.is_none_or(|id| s.record.session_id == id))
                    .map(SessionExport::from)
                    .collect();
                write_rows(&rows, format, path, target)
            }
        }
    }
}

fn write_rows<T: Serialize>(
    rows: &[T],
    format: ExportFormat,
    path: &Path,
    target: ExportTarget,
) -> AppResult<usize> {
    if rows.is_empty() {
        warning(format!("No {} rows to export.", target.as_str()));
        return Ok(0);
    }

    match format {
        ExportFormat::Csv => export_csv(rows, path)?,
        ExportFormat::Json => export_json(rows, path)?,
    }

    Ok(rows.len())
}
