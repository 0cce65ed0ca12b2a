// Excel/ODS import (calamine) and XLSX export (rust_xlsxwriter)

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};

use appcat_catalog::Table;

/// Import one worksheet (xlsx, xls, xlsb, ods). The first non-empty row is
/// the header row; `sheet` selects by name, else the first sheet is used.
pub fn import(path: &Path, sheet: Option<&str>) -> Result<Table, String> {
    let mut workbook: Sheets<_> =
        open_workbook_auto(path).map_err(|e| format!("Failed to open Excel file: {}", e))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let sheet_name = match sheet {
        Some(name) => sheet_names
            .iter()
            .find(|s| s.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| format!("Sheet '{}' not found (have: {})", name, sheet_names.join(", ")))?,
        None => sheet_names
            .first()
            .cloned()
            .ok_or_else(|| "Excel file contains no sheets".to_string())?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| format!("Failed to read sheet '{}': {}", sheet_name, e))?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<String>>())
        .skip_while(|row| row.iter().all(|c| c.trim().is_empty()));

    let headers = rows.next().unwrap_or_default();
    // Interior blank rows stay so row indices match the sheet; trailing ones go.
    let mut rows: Vec<Vec<String>> = rows.collect();
    while rows
        .last()
        .is_some_and(|row| row.iter().all(|c| c.trim().is_empty()))
    {
        rows.pop();
    }

    Ok(Table::new(headers, rows))
}

/// Text form of a cell. Dates stay as serial numbers; the normalizer reads them.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(n) => {
            // Integers without decimals
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#{:?}", e),
        Data::DateTime(dt) => format!("{}", dt.as_f64()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}

/// Write a table to a single-sheet XLSX workbook with a bold header row.
pub fn export(table: &Table, path: &Path, sheet_name: &str) -> Result<(), String> {
    let mut workbook = XlsxWorkbook::new();
    let header_format = Format::new().set_bold();

    let worksheet = workbook
        .add_worksheet()
        .set_name(sheet_name)
        .map_err(|e| format!("Failed to create sheet '{}': {}", sheet_name, e))?;

    for (col, header) in table.headers.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, header, &header_format)
            .map_err(|e| format!("Failed to write header: {}", e))?;
    }
    for (row_idx, row) in table.rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            worksheet
                .write_string((row_idx + 1) as u32, col as u16, value)
                .map_err(|e| format!("Failed to write row {}: {}", row_idx + 2, e))?;
        }
    }

    workbook
        .save(path)
        .map_err(|e| format!("Failed to save XLSX file: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn catalog() -> Table {
        Table::new(
            vec!["Product Name".into(), "Active".into(), "Annual Cost".into()],
            vec![
                vec!["Quill".into(), "TRUE".into(), "1200".into()],
                vec!["Desmos".into(), "TRUE".into()],
            ],
        )
    }

    #[test]
    fn test_xlsx_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.xlsx");
        export(&catalog(), &path, "Catalog").unwrap();

        let back = import(&path, None).unwrap();
        assert_eq!(back.headers, catalog().headers);
        assert_eq!(back.len(), 2);
        assert_eq!(back.cell(0, 0), "Quill");
        assert_eq!(back.cell(0, 2), "1200");
        assert_eq!(back.cell(1, 2), "");
    }

    #[test]
    fn test_interior_blank_rows_survive_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.xlsx");
        let mut table = catalog();
        table.rows.insert(1, vec![String::new(), String::new()]);
        table.rows.push(vec![String::new()]);
        export(&table, &path, "Catalog").unwrap();

        let back = import(&path, None).unwrap();
        assert_eq!(back.len(), 3);
        assert!(back.is_blank_row(1));
        assert_eq!(back.cell(2, 0), "Desmos");
    }

    #[test]
    fn test_named_sheet_lookup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.xlsx");
        export(&catalog(), &path, "Apps").unwrap();

        assert!(import(&path, Some("apps")).is_ok());
        let err = import(&path, Some("Missing")).unwrap_err();
        assert!(err.contains("Apps"));
    }

    #[test]
    fn test_cell_text_formats_numbers() {
        assert_eq!(cell_text(&Data::Float(1200.0)), "1200");
        assert_eq!(cell_text(&Data::Float(12.5)), "12.5");
        assert_eq!(cell_text(&Data::Bool(true)), "TRUE");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
