//! Recognition and translation of the purchasing vendor's license-inventory
//! export.
//!
//! The vendor feed records who *paid* for a product, not who uses it, so
//! department is always the school-wide placeholder and division names are
//! reduced to the three division labels.

use crate::model::{Field, SourceFormat};
use crate::normalize::parse_count;
use crate::table::Table;
use crate::vocab;

/// Columns of the vendor export. Three or more present means vendor format.
pub const VENDOR_SIGNATURE: &[&str] = &[
    "Product",
    "Vendor",
    "Licenses Purchased",
    "Total Cost",
    "Purchasing School",
    "Contract End Date",
    "Product Category",
    "Privacy Status",
];

const SIGNATURE_THRESHOLD: usize = 3;

pub const SCHOOL_WIDE_DEPARTMENT: &str = "School-wide";
pub const SITE_LICENSE: &str = "Site License";
pub const INDIVIDUAL_LICENSE: &str = "Individual";

pub fn detect_format(headers: &[String]) -> SourceFormat {
    let hits = VENDOR_SIGNATURE
        .iter()
        .filter(|sig| headers.iter().any(|h| h.trim().eq_ignore_ascii_case(sig)))
        .count();
    if hits >= SIGNATURE_THRESHOLD {
        SourceFormat::VendorInventory
    } else {
        SourceFormat::Generic
    }
}

/// Licence count at or above `site_threshold` reads as a site licence.
pub fn license_tier(count: Option<u32>, site_threshold: u32) -> &'static str {
    match count {
        Some(n) if n >= site_threshold => SITE_LICENSE,
        Some(n) if n > 0 => INDIVIDUAL_LICENSE,
        _ => "",
    }
}

/// Reduce a purchasing-school string to division labels.
///
/// `"Lincoln Elementary; Jefferson Middle School"` -> `"Elementary, Middle"`,
/// `"District Office"` -> `"School-wide"`.
pub fn clean_division(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if ["district", "all schools", "school-wide", "schoolwide", "whole school"]
        .iter()
        .any(|m| lower.contains(m))
    {
        return SCHOOL_WIDE_DEPARTMENT.to_string();
    }

    let mut elementary = false;
    let mut middle = false;
    let mut high = false;
    for part in lower.split([';', ',', '/', '|']) {
        let part = part.trim();
        if part.contains("junior high") || part.contains("middle") || part.contains("intermediate") {
            middle = true;
        } else if ["elementary", "primary", "lower school", "early learning", "early childhood"]
            .iter()
            .any(|m| part.contains(m))
        {
            elementary = true;
        } else if part.contains("high") || part.contains("upper school") || part.contains("secondary") {
            high = true;
        }
    }

    let labels: Vec<&str> = [(elementary, "Elementary"), (middle, "Middle"), (high, "High")]
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, label)| *label)
        .collect();
    if labels.is_empty() {
        raw.trim().to_string()
    } else {
        labels.join(", ")
    }
}

fn column(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
}

/// Rewrite a vendor export into a table with canonical headers.
pub fn translate(table: &Table, site_threshold: u32, default_category: &str) -> Table {
    let h = &table.headers;
    let product = column(h, "Product");
    let licenses = column(h, "Licenses Purchased");
    let cost = column(h, "Total Cost");
    let school = column(h, "Purchasing School");
    let end_date = column(h, "Contract End Date");
    let category = column(h, "Product Category");
    let website = column(h, "Product URL").or_else(|| column(h, "Website"));

    let fields = [
        Field::ProductName,
        Field::Active,
        Field::Division,
        Field::Department,
        Field::LicenseType,
        Field::LicenseCount,
        Field::AnnualCost,
        Field::Category,
        Field::RenewalDate,
        Field::Website,
    ];
    let headers = fields.iter().map(|f| f.canonical_header().to_string()).collect();

    let get = |row: usize, col: Option<usize>| -> String {
        col.map(|c| table.cell(row, c).trim().to_string()).unwrap_or_default()
    };

    let width = fields.len();
    let rows = (0..table.len())
        .map(|row| {
            if table.is_blank_row(row) {
                return vec![String::new(); width];
            }
            let count_raw = get(row, licenses);
            let raw_category = get(row, category);
            let category = vocab::canonical_category(&raw_category)
                .unwrap_or(default_category)
                .to_string();
            vec![
                get(row, product),
                "TRUE".to_string(),
                clean_division(&get(row, school)),
                SCHOOL_WIDE_DEPARTMENT.to_string(),
                license_tier(parse_count(&count_raw), site_threshold).to_string(),
                count_raw,
                get(row, cost),
                category,
                get(row, end_date),
                get(row, website),
            ]
        })
        .collect();

    Table::new(headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::ColumnMap;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn detection_needs_three_signature_columns() {
        assert_eq!(
            detect_format(&headers(&["Product", "Vendor", "Notes"])),
            SourceFormat::Generic
        );
        assert_eq!(
            detect_format(&headers(&["product", "Vendor", "Total Cost", "Notes"])),
            SourceFormat::VendorInventory
        );
        assert_eq!(
            detect_format(&headers(&["Product Name", "Active", "Division", "Department"])),
            SourceFormat::Generic
        );
    }

    #[test]
    fn license_tier_threshold() {
        assert_eq!(license_tier(Some(500), 100), SITE_LICENSE);
        assert_eq!(license_tier(Some(100), 100), SITE_LICENSE);
        assert_eq!(license_tier(Some(30), 100), INDIVIDUAL_LICENSE);
        assert_eq!(license_tier(Some(0), 100), "");
        assert_eq!(license_tier(None, 100), "");
    }

    #[test]
    fn division_cleaning() {
        assert_eq!(
            clean_division("Lincoln Elementary; Jefferson Middle School"),
            "Elementary, Middle"
        );
        assert_eq!(clean_division("Roosevelt Junior High"), "Middle");
        assert_eq!(clean_division("Central High School"), "High");
        assert_eq!(clean_division("Highland Elementary"), "Elementary");
        assert_eq!(clean_division("District Office"), "School-wide");
        assert_eq!(clean_division("Annex"), "Annex");
    }

    #[test]
    fn translation_produces_canonical_columns() {
        let table = Table::new(
            headers(&["Product", "Vendor", "Licenses Purchased", "Total Cost", "Purchasing School", "Product Category"]),
            vec![
                vec!["Quizzer".into(), "Q Inc".into(), "1,200".into(), "$4,000".into(), "Central High School".into(), "assessment".into()],
                vec!["Doodle".into(), "D LLC".into(), "25".into(), "0".into(), "Lincoln Elementary".into(), "Art stuff".into()],
            ],
        );
        let out = translate(&table, 100, "Other");
        let map = ColumnMap::resolve(&out.headers);
        for f in [Field::ProductName, Field::Active, Field::Division, Field::Department] {
            assert!(map.contains(f), "missing {f}");
        }
        let col = |f: Field| map.get(f).unwrap();
        assert_eq!(out.cell(0, col(Field::LicenseType)), SITE_LICENSE);
        assert_eq!(out.cell(0, col(Field::Division)), "High");
        assert_eq!(out.cell(0, col(Field::Category)), "Assessment");
        assert_eq!(out.cell(1, col(Field::LicenseType)), INDIVIDUAL_LICENSE);
        assert_eq!(out.cell(1, col(Field::Category)), "Other");
        assert_eq!(out.cell(1, col(Field::Department)), SCHOOL_WIDE_DEPARTMENT);
    }

    #[test]
    fn blank_vendor_rows_stay_blank_and_in_place() {
        let table = Table::new(
            headers(&["Product", "Vendor", "Total Cost", "Purchasing School"]),
            vec![
                vec!["Quizzer".into(), "Q Inc".into(), "10".into(), "Central High School".into()],
                vec!["".into(), " ".into(), "".into(), "".into()],
                vec!["Doodle".into(), "D LLC".into(), "0".into(), "Lincoln Elementary".into()],
            ],
        );
        let out = translate(&table, 100, "Other");
        assert_eq!(out.len(), 3);
        assert!(out.is_blank_row(1));
        let rows = crate::normalize::normalize_table(&out);
        assert_eq!(rows.iter().map(|r| r.row).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(rows[1].entry.product_name, "Doodle");
    }
}
