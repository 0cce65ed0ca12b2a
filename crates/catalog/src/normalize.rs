//! Row normalization: legacy header resolution and cell coercion.
//!
//! Headers are resolved once per table into a [`ColumnMap`]. Resolution
//! order per field: exact (case-insensitive) canonical header, then the
//! legacy aliases below in listed order, else absent. Coercion never fails;
//! malformed cells degrade to defaults and callers surface data-quality
//! issues themselves.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use crate::model::{format_cents, AnnualCost, CatalogEntry, Field};
use crate::table::Table;
use crate::vocab;

/// Bump when an alias is added, removed or re-pointed.
pub const ALIAS_TABLE_VERSION: u32 = 4;

/// Legacy header names accepted for each canonical field.
///
/// v1: original sheet ("Product Name", "Division", ...).
/// v2: camelCase export headers.
/// v3: "Whole School Core" renamed to "Org Core".
/// v4: "Grade Band" and "Cost/Year" from the budget workbook.
pub const FIELD_ALIASES: &[(Field, &[&str])] = &[
    (
        Field::ProductName,
        &["Product Name", "productName", "App Name", "Application", "Application Name", "Tool Name", "Name"],
    ),
    (Field::StableId, &["Product ID", "productId", "App ID", "stableId", "Stable ID", "UUID"]),
    (Field::Active, &["isActive", "Is Active", "Active?", "Enabled"]),
    (Field::Division, &["Divisions", "School Division", "School Level"]),
    (Field::Department, &["Dept", "Dept.", "Departments"]),
    (Field::Subjects, &["Subject", "Subject Area", "Subject(s)", "Tags"]),
    (
        Field::IsOrgCore,
        &["Is Org Core", "isOrgCore", "Org Core", "Whole School Core", "isWholeSchool", "Core Tool", "Official Core"],
    ),
    (Field::LicenseType, &["License Type", "licenseType", "License", "Licence Type"]),
    (Field::LicenseCount, &["License Count", "licenseCount", "Licenses", "# Licenses", "Seats"]),
    (Field::AnnualCost, &["Annual Cost", "annualCost", "Cost", "Cost/Year", "Yearly Cost", "Price"]),
    (Field::Category, &["Tool Category", "Type"]),
    (Field::Audience, &["Users", "User Type", "Intended Users"]),
    (Field::GradeLevels, &["Grade Levels", "gradeLevels", "Grades", "Grade Level", "Grade Band", "Grade Range"]),
    (Field::Description, &["Desc", "Summary", "What It Does"]),
    (Field::Website, &["URL", "Link", "Web Site", "Product URL"]),
    (Field::SupportEmail, &["Support Email", "supportEmail", "Support Contact", "Support"]),
    (Field::TutorialLink, &["Tutorial Link", "tutorialLink", "Tutorial", "Training Link", "Help Link"]),
    (Field::MobileSupport, &["Mobile Support", "mobileSupport", "Mobile App", "Mobile"]),
    (Field::SsoEnabled, &["SSO Enabled", "ssoEnabled", "SSO", "Single Sign-On"]),
    (Field::LogoUrl, &["Logo URL", "logoUrl", "Logo", "Icon URL"]),
    (Field::DateAdded, &["Date Added", "dateAdded", "Added", "Added On"]),
    (Field::RenewalDate, &["Renewal Date", "renewalDate", "Renewal", "Contract End", "Expiration Date"]),
];

fn header_key(h: &str) -> String {
    h.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Column map
// ---------------------------------------------------------------------------

/// Field -> column index for one header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    cols: BTreeMap<Field, usize>,
}

impl ColumnMap {
    pub fn resolve(headers: &[String]) -> Self {
        let keys: Vec<String> = headers.iter().map(|h| header_key(h)).collect();
        let mut cols = BTreeMap::new();

        for (field, aliases) in FIELD_ALIASES {
            let canonical = field.canonical_header();
            let found = keys.iter().position(|k| k == canonical).or_else(|| {
                aliases
                    .iter()
                    .find_map(|alias| keys.iter().position(|k| *k == header_key(alias)))
            });
            if let Some(idx) = found {
                cols.insert(*field, idx);
            }
        }

        Self { cols }
    }

    pub fn get(&self, field: Field) -> Option<usize> {
        self.cols.get(&field).copied()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.cols.contains_key(&field)
    }

    pub fn insert(&mut self, field: Field, col: usize) {
        self.cols.insert(field, col);
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.cols.keys().copied()
    }
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// Empty means absent or whitespace-only.
pub fn is_blank(cell: Option<&str>) -> bool {
    cell.map_or(true, |c| c.trim().is_empty())
}

/// `"true"`/`"false"` in any case; everything else is `false`.
pub fn parse_bool(cell: &str) -> bool {
    cell.trim().eq_ignore_ascii_case("true")
}

/// Strict variant used on the write path: `None` unless the cell is a boolean literal.
pub fn parse_bool_strict(cell: &str) -> Option<bool> {
    let t = cell.trim();
    if t.eq_ignore_ascii_case("true") {
        Some(true)
    } else if t.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Non-negative integer; thousands separators and fractional parts tolerated.
pub fn parse_count(cell: &str) -> Option<u32> {
    let cleaned: String = cell.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(n) = cleaned.parse::<u32>() {
        return Some(n);
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && *f >= 0.0 && *f <= u32::MAX as f64)
        .map(|f| f.trunc() as u32)
}

/// Largest annual cost accepted, in dollars. Anything above is a typo or a
/// pasted identifier and reads as unparseable.
pub const MAX_ANNUAL_COST_DOLLARS: f64 = 1_000_000_000_000.0;

/// Cost cell -> cents. Distinguishes missing, unparseable and zero.
pub fn parse_cost(cell: &str) -> AnnualCost {
    let t = cell.trim();
    if t.is_empty() {
        return AnnualCost::Unknown;
    }
    if t.eq_ignore_ascii_case("free") {
        return AnnualCost::Amount(0);
    }
    let cleaned: String = t
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '\u{a0}'))
        .collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() && (0.0..=MAX_ANNUAL_COST_DOLLARS).contains(&v) => {
            AnnualCost::Amount((v * 100.0).round() as i64)
        }
        _ => AnnualCost::Invalid(t.to_string()),
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%d-%b-%Y"];

/// Dates in the formats seen in historical sheets, ISO datetimes, or
/// spreadsheet serial day numbers.
pub fn parse_date(cell: &str) -> Option<NaiveDate> {
    let t = cell.trim();
    if t.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
            return Some(d);
        }
    }
    if t.len() > 10 && t.is_char_boundary(10) {
        if let Ok(d) = NaiveDate::parse_from_str(&t[..10], "%Y-%m-%d") {
            return Some(d);
        }
    }
    if let Ok(serial) = t.parse::<f64>() {
        if (1.0..=2_958_465.0).contains(&serial) {
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
            return epoch.checked_add_signed(Duration::days(serial.trunc() as i64));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Normalized row
// ---------------------------------------------------------------------------

/// A coerced entry plus the trimmed raw text of every column the source had.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    /// 0-based data row index in the source table.
    pub row: usize,
    pub entry: CatalogEntry,
    pub cells: BTreeMap<Field, String>,
}

impl NormalizedRow {
    /// Raw cell text, if the source had the column.
    pub fn cell(&self, field: Field) -> Option<&str> {
        self.cells.get(&field).map(String::as_str)
    }

    /// Raw cell text when present and non-empty.
    pub fn provided(&self, field: Field) -> Option<&str> {
        self.cell(field).filter(|c| !c.trim().is_empty())
    }

    pub fn is_empty(&self, field: Field) -> bool {
        is_blank(self.cell(field))
    }
}

pub fn normalize_row(table: &Table, row: usize, columns: &ColumnMap) -> NormalizedRow {
    let mut cells = BTreeMap::new();
    for field in columns.fields() {
        if let Some(col) = columns.get(field) {
            cells.insert(field, table.cell(row, col).trim().to_string());
        }
    }
    let text = |f: Field| cells.get(&f).cloned().unwrap_or_default();

    let entry = CatalogEntry {
        product_name: text(Field::ProductName),
        stable_id: Some(text(Field::StableId)).filter(|s| !s.is_empty()),
        active: parse_bool(&text(Field::Active)),
        division: text(Field::Division),
        department: text(Field::Department),
        subjects: text(Field::Subjects),
        is_org_core: parse_bool(&text(Field::IsOrgCore)),
        license_type: text(Field::LicenseType),
        license_count: parse_count(&text(Field::LicenseCount)).unwrap_or(0),
        annual_cost: parse_cost(&text(Field::AnnualCost)),
        category: text(Field::Category),
        audience: text(Field::Audience),
        grade_levels: text(Field::GradeLevels),
        description: text(Field::Description),
        website: text(Field::Website),
        support_email: text(Field::SupportEmail),
        tutorial_link: text(Field::TutorialLink),
        mobile_support: text(Field::MobileSupport),
        sso_enabled: parse_bool(&text(Field::SsoEnabled)),
        logo_url: text(Field::LogoUrl),
        date_added: parse_date(&text(Field::DateAdded)),
        renewal_date: parse_date(&text(Field::RenewalDate)),
    };

    NormalizedRow { row, entry, cells }
}

/// Normalize every data row of a table.
pub fn normalize_table(table: &Table) -> Vec<NormalizedRow> {
    let columns = ColumnMap::resolve(&table.headers);
    table
        .data_rows()
        .map(|row| normalize_row(table, row, &columns))
        .collect()
}

/// Convenience for callers that only need typed entries.
pub fn entries_from_table(table: &Table) -> Vec<CatalogEntry> {
    normalize_table(table).into_iter().map(|n| n.entry).collect()
}

// ---------------------------------------------------------------------------
// Write-path rendering
// ---------------------------------------------------------------------------

/// Canonical storage text for a non-empty cell about to be written.
///
/// Stricter than read coercion: a value that would degrade to a default is
/// rejected so a garbage cell never overwrites real data.
pub fn render_cell(field: Field, raw: &str) -> Result<String, String> {
    let t = raw.trim();
    match field {
        Field::Active | Field::IsOrgCore | Field::SsoEnabled => parse_bool_strict(t)
            .map(|b| if b { "TRUE".to_string() } else { "FALSE".to_string() })
            .ok_or_else(|| format!("'{t}' is not true/false")),
        Field::LicenseCount => parse_count(t)
            .map(|n| n.to_string())
            .ok_or_else(|| format!("'{t}' is not a license count")),
        Field::AnnualCost => match parse_cost(t) {
            AnnualCost::Amount(c) => Ok(format_cents(c)),
            _ => Err(format!("'{t}' is not a cost")),
        },
        Field::DateAdded | Field::RenewalDate => parse_date(t)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .ok_or_else(|| format!("'{t}' is not a date")),
        Field::GradeLevels => vocab::parse_grade_list(t)
            .map(|g| vocab::render_grade_list(&g))
            .map_err(|e| e.to_string()),
        Field::Audience => {
            vocab::parse_audience_list(t).map(|a| vocab::render_audience_list(&a))
        }
        Field::Category => vocab::canonical_category(t)
            .map(str::to_string)
            .ok_or_else(|| format!("'{t}' is not a known category")),
        _ => Ok(t.to_string()),
    }
}

/// Canonical form of an existing stored cell for comparison; legacy values
/// that no longer render compare by their trimmed text.
pub fn comparable(field: Field, raw: &str) -> String {
    render_cell(field, raw).unwrap_or_else(|_| raw.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn canonical_header_wins_over_alias() {
        let map = ColumnMap::resolve(&headers(&["App Name", "PRODUCT_NAME", "Active"]));
        assert_eq!(map.get(Field::ProductName), Some(1));
        assert_eq!(map.get(Field::Active), Some(2));
        assert_eq!(map.get(Field::Department), None);
    }

    #[test]
    fn legacy_aliases_resolve() {
        let map = ColumnMap::resolve(&headers(&[
            "Product Name",
            "Whole School Core",
            "Grade Band",
            " cost/year ",
            "Dept.",
        ]));
        assert_eq!(map.get(Field::ProductName), Some(0));
        assert_eq!(map.get(Field::IsOrgCore), Some(1));
        assert_eq!(map.get(Field::GradeLevels), Some(2));
        assert_eq!(map.get(Field::AnnualCost), Some(3));
        assert_eq!(map.get(Field::Department), Some(4));
    }

    #[test]
    fn aliases_are_unambiguous() {
        let mut seen = HashSet::new();
        for (field, aliases) in FIELD_ALIASES {
            assert!(seen.insert(field.canonical_header().to_string()));
            for alias in *aliases {
                assert!(seen.insert(header_key(alias)), "alias '{alias}' listed twice");
            }
        }
        assert_eq!(FIELD_ALIASES.len(), Field::ALL.len());
    }

    #[test]
    fn bool_coercion() {
        assert!(parse_bool("TRUE"));
        assert!(parse_bool(" true "));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("yes"));
        assert!(!parse_bool(""));
        assert_eq!(parse_bool_strict("Yes"), None);
    }

    #[test]
    fn cost_distinguishes_missing_invalid_and_zero() {
        assert_eq!(parse_cost(""), AnnualCost::Unknown);
        assert_eq!(parse_cost("  "), AnnualCost::Unknown);
        assert_eq!(parse_cost("0"), AnnualCost::Amount(0));
        assert_eq!(parse_cost("Free"), AnnualCost::Amount(0));
        assert_eq!(parse_cost("$1,200.50"), AnnualCost::Amount(120_050));
        assert_eq!(parse_cost("TBD"), AnnualCost::Invalid("TBD".into()));
        assert_eq!(parse_cost("-5"), AnnualCost::Invalid("-5".into()));
    }

    #[test]
    fn implausible_costs_are_invalid() {
        assert_eq!(
            parse_cost("99999999999999999"),
            AnnualCost::Invalid("99999999999999999".into())
        );
        assert_eq!(parse_cost("1e300"), AnnualCost::Invalid("1e300".into()));
        assert_eq!(
            parse_cost("$1,000,000,000,000"),
            AnnualCost::Amount(100_000_000_000_000)
        );
        assert!(render_cell(Field::AnnualCost, "99999999999999999").is_err());
    }

    #[test]
    fn count_and_date_coercion() {
        assert_eq!(parse_count("1,500"), Some(1500));
        assert_eq!(parse_count("12.0"), Some(12));
        assert_eq!(parse_count("lots"), None);
        let d = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        assert_eq!(parse_date("2025-07-01"), Some(d));
        assert_eq!(parse_date("7/1/2025"), Some(d));
        assert_eq!(parse_date("2025-07-01T00:00:00Z"), Some(d));
        assert_eq!(parse_date("45839"), Some(d));
        assert_eq!(parse_date("someday"), None);
    }

    #[test]
    fn malformed_row_degrades_to_defaults() {
        let table = Table::new(
            headers(&["Product Name", "Active", "License Count", "Annual Cost", "Renewal Date"]),
            vec![vec!["  Tool A ".into(), "maybe".into(), "many".into()]],
        );
        let rows = normalize_table(&table);
        let e = &rows[0].entry;
        assert_eq!(e.product_name, "Tool A");
        assert!(!e.active);
        assert_eq!(e.license_count, 0);
        assert_eq!(e.annual_cost, AnnualCost::Unknown);
        assert_eq!(e.renewal_date, None);
        assert!(rows[0].is_empty(Field::AnnualCost));
        assert!(rows[0].cell(Field::Department).is_none());
    }

    #[test]
    fn render_rejects_values_that_would_degrade() {
        assert_eq!(render_cell(Field::Active, "true").unwrap(), "TRUE");
        assert!(render_cell(Field::Active, "y").is_err());
        assert_eq!(render_cell(Field::AnnualCost, "$0").unwrap(), "0");
        assert!(render_cell(Field::AnnualCost, "call us").is_err());
        assert_eq!(
            render_cell(Field::GradeLevels, "6-8").unwrap(),
            "Grade 6, Grade 7, Grade 8"
        );
        assert!(render_cell(Field::GradeLevels, "6-8, Grade 13").is_err());
        assert_eq!(render_cell(Field::Category, "lms").unwrap(), "Learning Management");
        assert_eq!(render_cell(Field::Description, "  text ").unwrap(), "text");
    }
}
