use sha2::{Digest, Sha256};

use crate::error::CatalogError;
use crate::model::{ImportMode, SourceFormat};
use crate::vendor;

/// Raw tabular data: a header row plus string cells. Rows may be ragged;
/// missing trailing cells read as empty. All-blank rows are kept so row
/// indices stay aligned with the sheet they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Parse CSV text whose first record is the header row.
    pub fn from_csv_str(data: &str) -> Result<Self, CatalogError> {
        Self::from_delimited_str(data, b',')
    }

    pub fn from_delimited_str(data: &str, delimiter: u8) -> Result<Self, CatalogError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(data.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| CatalogError::Io(e.to_string()))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| CatalogError::Io(e.to_string()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Out-of-range rows count as blank.
    pub fn is_blank_row(&self, row: usize) -> bool {
        self.rows
            .get(row)
            .map_or(true, |cells| cells.iter().all(|c| c.trim().is_empty()))
    }

    /// Indices of rows with at least one non-blank cell.
    pub fn data_rows(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.rows.len()).filter(|&row| !self.is_blank_row(row))
    }
}

// ---------------------------------------------------------------------------
// Import batch
// ---------------------------------------------------------------------------

/// One externally supplied batch. Lives for the duration of one
/// reconciliation call; never persisted.
#[derive(Debug, Clone)]
pub struct ImportBatch {
    pub table: Table,
    pub mode: ImportMode,
    pub format: SourceFormat,
    /// Short content digest, stable across re-invocations with the same file.
    pub batch_id: String,
}

impl ImportBatch {
    pub fn new(table: Table, mode: ImportMode) -> Self {
        let format = vendor::detect_format(&table.headers);
        let batch_id = fingerprint(&table);
        Self {
            table,
            mode,
            format,
            batch_id,
        }
    }
}

fn fingerprint(table: &Table) -> String {
    let mut hasher = Sha256::new();
    for h in &table.headers {
        hasher.update(h.as_bytes());
        hasher.update([0x1f]);
    }
    for row in &table.rows {
        hasher.update([0x1e]);
        for cell in row {
            hasher.update(cell.as_bytes());
            hasher.update([0x1f]);
        }
    }
    let digest = hasher.finalize();
    digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ragged_csv_and_keeps_blank_rows_in_place() {
        let csv = "\u{feff}Product Name,Active,Division\nTool A,TRUE,Elementary\n,,\nTool B,FALSE\n";
        let table = Table::from_csv_str(csv).unwrap();
        assert_eq!(table.headers, vec!["Product Name", "Active", "Division"]);
        assert_eq!(table.len(), 3);
        assert!(table.is_blank_row(1));
        assert_eq!(table.cell(2, 0), "Tool B");
        assert_eq!(table.cell(2, 2), "");
        assert_eq!(table.cell(9, 9), "");
        assert_eq!(table.data_rows().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn batch_id_is_content_addressed() {
        let a = Table::from_csv_str("name\nx\n").unwrap();
        let b = Table::from_csv_str("name\ny\n").unwrap();
        let id_a = ImportBatch::new(a.clone(), ImportMode::AddUpdate).batch_id;
        assert_eq!(id_a.len(), 12);
        assert_eq!(id_a, ImportBatch::new(a, ImportMode::FullSync).batch_id);
        assert_ne!(id_a, ImportBatch::new(b, ImportMode::AddUpdate).batch_id);
    }
}
