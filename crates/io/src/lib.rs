// File I/O for catalog sheets, import batches and the audit log

pub mod audit;
pub mod csv;
pub mod xlsx;

use std::path::Path;

use appcat_catalog::normalize::ColumnMap;
use appcat_catalog::{CatalogError, Field, SheetStore, Table};

pub use audit::CsvAuditLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Tsv,
    Spreadsheet,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Result<Self, String> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "txt" => Ok(Self::Csv),
            "tsv" | "tab" => Ok(Self::Tsv),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(Self::Spreadsheet),
            other => Err(format!(
                "{}: unsupported file type '.{other}' (expected csv, tsv, xlsx, xls, ods)",
                path.display()
            )),
        }
    }
}

/// Load any supported tabular file. `sheet` applies to workbooks only.
pub fn load_table(path: &Path, sheet: Option<&str>) -> Result<Table, String> {
    match FileKind::from_path(path)? {
        FileKind::Csv => csv::import(path),
        FileKind::Tsv => csv::import_tsv(path),
        FileKind::Spreadsheet => xlsx::import(path, sheet),
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}

/// Fails for formats `save_table` cannot produce. Legacy `.xls`, `.xlsb`,
/// `.xlsm` and `.ods` workbooks are read-only.
pub fn ensure_writable(path: &Path) -> Result<FileKind, String> {
    let kind = FileKind::from_path(path)?;
    let ext = extension(path);
    if kind == FileKind::Spreadsheet && ext != "xlsx" {
        return Err(format!(
            "{}: cannot write .{ext} files; save the catalog as .xlsx or .csv",
            path.display()
        ));
    }
    Ok(kind)
}

/// Write a table back in the format its extension names.
pub fn save_table(table: &Table, path: &Path) -> Result<(), String> {
    match ensure_writable(path)? {
        FileKind::Csv => csv::export(table, path),
        FileKind::Tsv => csv::export_tsv(table, path),
        FileKind::Spreadsheet => xlsx::export(table, path, "Catalog"),
    }
}

/// Re-read `path` and fail with `IdentityMismatch` when it no longer holds
/// `original`. Run right before saving so edits made by someone else since
/// the load are not overwritten. Header drift reports row 0.
pub fn verify_unchanged(original: &Table, path: &Path, sheet: Option<&str>) -> Result<(), CatalogError> {
    let current = load_table(path, sheet).map_err(CatalogError::Io)?;
    if current.headers != original.headers {
        return Err(CatalogError::IdentityMismatch {
            row: 0,
            expected: original.headers.join(", "),
            found: current.headers.join(", "),
        });
    }

    let width = original.headers.len();
    let rows = original.len().max(current.len());
    let Some(row) = (0..rows).find(|&r| (0..width).any(|c| original.cell(r, c) != current.cell(r, c))) else {
        return Ok(());
    };

    let columns = ColumnMap::resolve(&original.headers);
    let describe = |table: &Table, with_cells: bool| -> String {
        if row >= table.len() {
            return "(no row)".to_string();
        }
        if with_cells {
            return table.rows[row].join(" | ");
        }
        columns
            .get(Field::ProductName)
            .map(|col| table.cell(row, col).trim().to_string())
            .unwrap_or_default()
    };
    let names_match = describe(original, false) == describe(&current, false);
    Err(CatalogError::IdentityMismatch {
        row,
        expected: describe(original, names_match),
        found: describe(&current, names_match),
    })
}

pub fn load_store(path: &Path, sheet: Option<&str>) -> Result<SheetStore, String> {
    load_table(path, sheet).map(SheetStore::from_table)
}

pub fn save_store(store: &SheetStore, path: &Path) -> Result<(), String> {
    save_table(store.table(), path)
}
