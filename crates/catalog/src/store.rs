use serde::Serialize;

use crate::error::CatalogError;
use crate::model::Field;
use crate::normalize::{normalize_table, ColumnMap, NormalizedRow};
use crate::table::Table;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Row/column view of the persisted catalog. The header row is the schema of
/// record; fields are located through the alias table, so a sheet that
/// still uses legacy column names is written in place.
///
/// Each `write_cell` commits on its own; there is no multi-row transaction.
pub trait CatalogStore {
    fn headers(&self) -> &[String];

    fn row_count(&self) -> usize;

    /// Current text of one cell; empty when the column does not exist.
    fn read_cell(&self, row: usize, field: Field) -> Result<String, CatalogError>;

    /// Overwrite one cell, creating the column if the sheet lacks it.
    fn write_cell(&mut self, row: usize, field: Field, value: &str) -> Result<(), CatalogError>;

    /// Append a row; returns its index.
    fn append_row(&mut self, values: &[(Field, String)]) -> Result<usize, CatalogError>;

    /// Fetch and normalize every row. Callers take one snapshot per call.
    fn snapshot(&self) -> Result<Vec<NormalizedRow>, CatalogError>;
}

/// In-memory sheet. `appcat-io` loads and saves it.
#[derive(Debug, Clone, Default)]
pub struct SheetStore {
    table: Table,
    columns: ColumnMap,
}

impl SheetStore {
    pub fn from_table(table: Table) -> Self {
        let columns = ColumnMap::resolve(&table.headers);
        Self { table, columns }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    fn ensure_column(&mut self, field: Field) -> usize {
        if let Some(col) = self.columns.get(field) {
            return col;
        }
        self.table.headers.push(field.canonical_header().to_string());
        let col = self.table.headers.len() - 1;
        self.columns.insert(field, col);
        col
    }

    fn check_row(&self, row: usize) -> Result<(), CatalogError> {
        if row < self.table.rows.len() {
            Ok(())
        } else {
            Err(CatalogError::store(format!(
                "row {row} out of range ({} rows)",
                self.table.rows.len()
            )))
        }
    }
}

impl CatalogStore for SheetStore {
    fn headers(&self) -> &[String] {
        &self.table.headers
    }

    fn row_count(&self) -> usize {
        self.table.rows.len()
    }

    fn read_cell(&self, row: usize, field: Field) -> Result<String, CatalogError> {
        self.check_row(row)?;
        Ok(self
            .columns
            .get(field)
            .map(|col| self.table.cell(row, col).to_string())
            .unwrap_or_default())
    }

    fn write_cell(&mut self, row: usize, field: Field, value: &str) -> Result<(), CatalogError> {
        self.check_row(row)?;
        let col = self.ensure_column(field);
        let cells = &mut self.table.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, String::new());
        }
        cells[col] = value.to_string();
        Ok(())
    }

    fn append_row(&mut self, values: &[(Field, String)]) -> Result<usize, CatalogError> {
        for (field, _) in values {
            self.ensure_column(*field);
        }
        let mut cells = vec![String::new(); self.table.headers.len()];
        for (field, value) in values {
            if let Some(col) = self.columns.get(*field) {
                cells[col] = value.clone();
            }
        }
        self.table.rows.push(cells);
        Ok(self.table.rows.len() - 1)
    }

    fn snapshot(&self) -> Result<Vec<NormalizedRow>, CatalogError> {
        Ok(normalize_table(&self.table))
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// One field mutation, appended for every reconciliation or enrichment write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub timestamp: String,
    /// e.g. `reconcile:add-update:3fa9c01b22de` or `enrich`.
    pub operation: String,
    /// Stable id when known, else product name.
    pub entry: String,
    /// 1-based sheet row (header is row 1).
    pub sheet_row: usize,
    pub field: Field,
    pub old_value: String,
    pub new_value: String,
}

impl AuditRecord {
    pub fn new(
        operation: &str,
        entry: &str,
        data_row: usize,
        field: Field,
        old_value: &str,
        new_value: &str,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            operation: operation.to_string(),
            entry: entry.to_string(),
            sheet_row: data_row + 2,
            field,
            old_value: old_value.to_string(),
            new_value: new_value.to_string(),
        }
    }
}

/// Append-only audit destination.
pub trait AuditSink {
    fn append(&mut self, record: AuditRecord) -> Result<(), CatalogError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryAudit {
    pub records: Vec<AuditRecord>,
}

impl MemoryAudit {
    pub fn for_field(&self, field: Field) -> impl Iterator<Item = &AuditRecord> {
        self.records.iter().filter(move |r| r.field == field)
    }
}

impl AuditSink for MemoryAudit {
    fn append(&mut self, record: AuditRecord) -> Result<(), CatalogError> {
        self.records.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SheetStore {
        SheetStore::from_table(Table::new(
            vec!["Product Name".into(), "Dept".into()],
            vec![vec!["Tool A".into(), "Math".into()], vec!["Tool B".into()]],
        ))
    }

    #[test]
    fn reads_through_legacy_headers() {
        let s = store();
        assert_eq!(s.read_cell(0, Field::Department).unwrap(), "Math");
        assert_eq!(s.read_cell(1, Field::Department).unwrap(), "");
        assert_eq!(s.read_cell(0, Field::Website).unwrap(), "");
        assert!(s.read_cell(5, Field::ProductName).is_err());
    }

    #[test]
    fn writes_keep_legacy_header_and_add_missing_columns() {
        let mut s = store();
        s.write_cell(1, Field::Department, "Science").unwrap();
        s.write_cell(0, Field::Website, "https://a.example").unwrap();
        assert_eq!(s.headers(), &["Product Name", "Dept", "website"]);
        assert_eq!(s.read_cell(1, Field::Department).unwrap(), "Science");
        assert_eq!(s.read_cell(0, Field::Website).unwrap(), "https://a.example");
        assert_eq!(s.read_cell(1, Field::Website).unwrap(), "");
    }

    #[test]
    fn append_row_places_values_by_field() {
        let mut s = store();
        let idx = s
            .append_row(&[
                (Field::ProductName, "Tool C".into()),
                (Field::Active, "TRUE".into()),
            ])
            .unwrap();
        assert_eq!(idx, 2);
        let snap = s.snapshot().unwrap();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[2].entry.product_name, "Tool C");
        assert!(snap[2].entry.active);
    }
}
