use std::path::PathBuf;

use chrono::NaiveDate;

use appcat_catalog::model::SourceFormat;
use appcat_catalog::normalize::entries_from_table;
use appcat_catalog::validate::Severity;
use appcat_catalog::{
    classify, detect_overlaps, estimate_savings, reconcile, validate_catalog, CatalogStore, Field,
    ImportBatch, ImportMode, IssueKind, MemoryAudit, ReconcileOptions, SheetStore, Table,
};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_table(name: &str) -> Table {
    let path = fixtures_dir().join(name);
    let data = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    Table::from_csv_str(&data).unwrap()
}

fn load_store() -> SheetStore {
    SheetStore::from_table(load_table("catalog.csv"))
}

fn options() -> ReconcileOptions {
    ReconcileOptions {
        as_of: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        ..ReconcileOptions::default()
    }
}

fn cell(store: &SheetStore, name: &str, field: Field) -> String {
    let row = store
        .snapshot()
        .unwrap()
        .into_iter()
        .find(|r| r.entry.product_name == name)
        .unwrap_or_else(|| panic!("{name} not in catalog"))
        .row;
    store.read_cell(row, field).unwrap()
}

// -------------------------------------------------------------------------
// Classification
// -------------------------------------------------------------------------

#[test]
fn legacy_catalog_classifies() {
    let entries = entries_from_table(&load_table("catalog.csv"));
    let result = classify(&entries);

    assert_eq!(result.stats.total, 8);
    assert_eq!(result.stats.active, 7);
    assert_eq!(result.stats.inactive, 1);
    assert_eq!(result.stats.org_wide, 2);
    assert_eq!(result.stats.multi_division, 1);

    assert!(result.org_wide.core_apps.iter().any(|e| e.product_name == "Canvas"));
    assert!(result.org_wide.open_access_apps.iter().any(|e| e.product_name == "Raz-Kids"));
    assert!(result.middle.by_department["Math"].iter().any(|e| e.product_name == "Desmos"));
    assert!(result.high.by_department["Math"].iter().any(|e| e.product_name == "Desmos"));
    assert!(!result.elementary.contains("Canvas"));
    assert!(!result.high.contains("Retired Tool"));
}

// -------------------------------------------------------------------------
// Reconciliation
// -------------------------------------------------------------------------

#[test]
fn add_update_against_legacy_sheet() {
    let mut store = load_store();
    let mut audit = MemoryAudit::default();
    let batch = ImportBatch::new(load_table("add-update.csv"), ImportMode::AddUpdate);

    let summary = reconcile(&batch, &mut store, &mut audit, &options()).unwrap();

    assert_eq!(summary.added, 1);
    assert_eq!(summary.updated, 2);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.deactivated, 0);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].kind, IssueKind::Validation);
    assert_eq!(summary.errors[0].product_name, "Padlet");

    // Protected fields untouched, legacy headers kept.
    assert_eq!(cell(&store, "Desmos", Field::Department), "Math");
    assert_eq!(cell(&store, "Desmos", Field::Subjects), "Algebra");
    assert_eq!(cell(&store, "Desmos", Field::IsOrgCore), "FALSE");
    assert_eq!(store.headers()[4], "Dept");

    assert_eq!(cell(&store, "GeoGebra", Field::AnnualCost), "500");
    assert_eq!(cell(&store, "Typing Club", Field::AnnualCost), "120");
    assert_eq!(cell(&store, "Typing Club", Field::Description), "Keyboarding lessons");
    assert_eq!(
        cell(&store, "Typing Club", Field::GradeLevels),
        "Pre-K, Kindergarten, Grade 1, Grade 2, Grade 3, Grade 4, Grade 5"
    );

    assert_eq!(cell(&store, "Padlet", Field::Active), "TRUE");
    assert_eq!(cell(&store, "Padlet", Field::GradeLevels), "");
    assert_eq!(cell(&store, "Padlet", Field::Category), "Other");
    assert_eq!(cell(&store, "Padlet", Field::DateAdded), "2026-03-02");

    assert_eq!(audit.for_field(Field::Department).filter(|r| r.entry != "Padlet").count(), 0);
    let cost = audit
        .records
        .iter()
        .find(|r| r.entry == "app-003" && r.field == Field::AnnualCost)
        .unwrap();
    assert_eq!((cost.old_value.as_str(), cost.new_value.as_str()), ("450", "500"));
    assert_eq!(cost.sheet_row, 4);
    assert!(cost.operation.starts_with("reconcile:add-update:"));
}

#[test]
fn second_run_is_a_no_op() {
    let mut store = load_store();
    let mut audit = MemoryAudit::default();
    let batch = ImportBatch::new(load_table("add-update.csv"), ImportMode::AddUpdate);
    reconcile(&batch, &mut store, &mut audit, &options()).unwrap();
    let writes = audit.records.len();

    let again = reconcile(&batch, &mut store, &mut audit, &options()).unwrap();
    assert_eq!(again.added + again.updated, 0);
    assert_eq!(again.unchanged, 4);
    assert_eq!(audit.records.len(), writes);
}

#[test]
fn vendor_export_is_translated_then_merged() {
    let mut store = load_store();
    let mut audit = MemoryAudit::default();
    let batch = ImportBatch::new(load_table("vendor-export.csv"), ImportMode::AddUpdate);
    assert_eq!(batch.format, SourceFormat::VendorInventory);

    let summary = reconcile(&batch, &mut store, &mut audit, &options()).unwrap();
    assert_eq!(summary.source_format, SourceFormat::VendorInventory);
    assert_eq!(summary.added, 2);
    assert_eq!(summary.updated, 1);
    assert!(summary.errors.is_empty());

    assert_eq!(cell(&store, "Canvas", Field::AnnualCost), "12500");
    assert_eq!(cell(&store, "Canvas", Field::Department), "School-wide");
    assert_eq!(cell(&store, "Canvas", Field::RenewalDate), "2027-06-30");

    assert_eq!(cell(&store, "Seesaw", Field::Division), "Elementary");
    assert_eq!(cell(&store, "Seesaw", Field::Department), "School-wide");
    assert_eq!(cell(&store, "Seesaw", Field::LicenseType), "Site License");
    assert_eq!(cell(&store, "Seesaw", Field::Category), "Other");
    assert_eq!(cell(&store, "Newsela", Field::LicenseType), "Individual");
    assert_eq!(cell(&store, "Newsela", Field::Category), "Reading & Literacy");
}

#[test]
fn full_sync_deactivates_without_deleting() {
    let mut store = load_store();
    let mut audit = MemoryAudit::default();
    let before = store.row_count();
    let batch = ImportBatch::new(load_table("full-sync.csv"), ImportMode::FullSync);

    let summary = reconcile(&batch, &mut store, &mut audit, &options()).unwrap();
    assert_eq!(summary.deactivated, 4);
    // Canvas only picks up inferred grade levels.
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.unchanged, 2);
    assert_eq!(store.row_count(), before);

    assert_eq!(cell(&store, "GeoGebra", Field::Active), "FALSE");
    assert_eq!(cell(&store, "GeoGebra", Field::AnnualCost), "450");
    assert_eq!(cell(&store, "GeoGebra", Field::Department), "Math");
    assert_eq!(cell(&store, "Canvas", Field::Department), "School-wide");
    assert_eq!(audit.for_field(Field::Active).count(), 4);
}

#[test]
fn fill_missing_only_fills_gaps() {
    let mut store = load_store();
    let mut audit = MemoryAudit::default();
    let batch = ImportBatch::new(load_table("add-update.csv"), ImportMode::FillMissingOnly);

    let summary = reconcile(&batch, &mut store, &mut audit, &options()).unwrap();
    assert_eq!(summary.added, 0);
    assert_eq!(summary.skipped, 1);
    assert_eq!(cell(&store, "GeoGebra", Field::AnnualCost), "450");
    assert_eq!(cell(&store, "Typing Club", Field::AnnualCost), "TBD");
    assert_eq!(cell(&store, "Typing Club", Field::Description), "Keyboarding lessons");
    assert!(audit.records.iter().all(|r| !r.field.is_protected()));
}

// -------------------------------------------------------------------------
// Analytics
// -------------------------------------------------------------------------

#[test]
fn overlapping_math_tools_are_grouped() {
    let entries = entries_from_table(&load_table("catalog.csv"));
    let groups = detect_overlaps(&entries);

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].category, "Math Tools");
    let names: Vec<&str> = groups[0].members.iter().map(|m| m.product_name.as_str()).collect();
    assert_eq!(names, vec!["Desmos", "GeoGebra"]);
    assert_eq!(groups[0].potential_savings, 45_000);
    assert_eq!(estimate_savings(&groups), 45_000);
    assert_eq!(groups[0].members[0].cost_label, "Free");
    assert_eq!(groups[0].members[1].grade_range, "Grade 9 to Grade 12");
}

#[test]
fn validation_reports_gaps() {
    let entries = entries_from_table(&load_table("catalog.csv"));
    let issues = validate_catalog(&entries);

    let errors: Vec<_> = issues.iter().filter(|i| i.severity == Severity::Error).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].product_name, "Typing Club");
    assert_eq!(errors[0].field, Field::AnnualCost);
    assert!(issues
        .iter()
        .any(|i| i.product_name == "Canvas" && i.field == Field::GradeLevels));
    assert!(issues.iter().all(|i| i.product_name != "Retired Tool"));
}
