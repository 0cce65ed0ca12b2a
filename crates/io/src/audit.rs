// Append-only CSV audit log

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use appcat_catalog::store::{AuditRecord, AuditSink};
use appcat_catalog::CatalogError;

pub const AUDIT_HEADER: [&str; 7] = [
    "timestamp",
    "operation",
    "entry",
    "row",
    "field",
    "old_value",
    "new_value",
];

/// Audit sink backed by a CSV file. Existing content is never rewritten;
/// every record is flushed as soon as it is appended.
pub struct CsvAuditLog {
    path: PathBuf,
    writer: csv::Writer<File>,
    appended: usize,
}

impl CsvAuditLog {
    pub fn open(path: &Path) -> Result<Self, String> {
        let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| format!("{}: {e}", path.display()))?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(AUDIT_HEADER).map_err(|e| e.to_string())?;
            writer.flush().map_err(|e| e.to_string())?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            appended: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle.
    pub fn appended(&self) -> usize {
        self.appended
    }
}

impl AuditSink for CsvAuditLog {
    fn append(&mut self, record: AuditRecord) -> Result<(), CatalogError> {
        let row = record.sheet_row.to_string();
        let field = record.field.canonical_header();
        self.writer
            .write_record([
                record.timestamp.as_str(),
                record.operation.as_str(),
                record.entry.as_str(),
                row.as_str(),
                field,
                record.old_value.as_str(),
                record.new_value.as_str(),
            ])
            .and_then(|_| self.writer.flush().map_err(csv::Error::from))
            .map_err(|e| CatalogError::Io(format!("audit log {}: {e}", self.path.display())))?;
        self.appended += 1;
        Ok(())
    }
}
