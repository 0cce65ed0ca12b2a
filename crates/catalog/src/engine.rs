//! Reconciliation of an import batch against the live catalog.
//!
//! One call walks `Parsed -> Validated -> [Translated] -> Reconciled ->
//! Applied -> Reported`. Structural problems stop at `Rejected` before any
//! write; per-row problems are collected and the batch continues.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::classify::DivisionFlags;
use crate::error::{CatalogError, IssueKind, RowIssue};
use crate::model::{
    identity_key, Field, FieldChange, ImportMode, ImportStage, Mutation, ReconcilePlan,
    ReconcileSummary, SourceFormat,
};
use crate::normalize::{comparable, normalize_table, render_cell, ColumnMap, NormalizedRow};
use crate::store::{AuditRecord, AuditSink, CatalogStore};
use crate::table::{ImportBatch, Table};
use crate::vendor;
use crate::vocab::{self, Audience, Grade};

/// Columns a generic batch must carry.
pub const REQUIRED_FIELDS: [Field; 4] = [
    Field::ProductName,
    Field::Active,
    Field::Division,
    Field::Department,
];

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Writes per call before stopping with `remaining > 0`. 0 disables the cap.
    pub max_writes_per_call: usize,
    pub vendor_site_license_threshold: u32,
    /// Placeholder category for new rows; never overwrites a real category.
    pub default_category: String,
    /// Stamped into `date_added` of new rows.
    pub as_of: NaiveDate,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            max_writes_per_call: 200,
            vendor_site_license_threshold: 100,
            default_category: vocab::DEFAULT_CATEGORY.to_string(),
            as_of: chrono::Utc::now().date_naive(),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Reconcile `batch` into `store`, auditing every field written.
pub fn reconcile<S, A>(
    batch: &ImportBatch,
    store: &mut S,
    audit: &mut A,
    options: &ReconcileOptions,
) -> Result<ReconcileSummary, CatalogError>
where
    S: CatalogStore + ?Sized,
    A: AuditSink + ?Sized,
{
    info!(
        batch_id = %batch.batch_id,
        mode = %batch.mode,
        format = %batch.format,
        rows = batch.table.len(),
        stage = %ImportStage::Parsed,
        "import batch received"
    );

    let table = match prepare_batch(batch, options) {
        Ok(t) => t,
        Err(e) => {
            warn!(batch_id = %batch.batch_id, stage = %ImportStage::Rejected, error = %e, "batch rejected");
            return Err(e);
        }
    };

    let snapshot = store.snapshot()?;
    let plan = plan_reconcile(&table, batch.mode, &snapshot, options);
    info!(
        batch_id = %batch.batch_id,
        stage = %ImportStage::Reconciled,
        mutations = plan.mutations.len(),
        unchanged = plan.unchanged,
        issues = plan.issues.len(),
        "mutations computed"
    );

    let operation = format!("reconcile:{}:{}", batch.mode, batch.batch_id);
    let applied = apply_plan(&plan, store, audit, options.max_writes_per_call, &operation)?;
    info!(
        batch_id = %batch.batch_id,
        stage = %ImportStage::Applied,
        added = applied.added,
        updated = applied.updated,
        deactivated = applied.deactivated,
        remaining = applied.remaining,
        "writes committed"
    );

    let mut errors = plan.issues;
    errors.extend(applied.issues);

    let summary = ReconcileSummary {
        batch_id: batch.batch_id.clone(),
        mode: batch.mode,
        source_format: batch.format,
        stage: ImportStage::Reported,
        added: applied.added,
        updated: applied.updated,
        unchanged: plan.unchanged,
        skipped: plan.skipped,
        deactivated: applied.deactivated,
        remaining: applied.remaining,
        errors,
    };
    info!(batch_id = %summary.batch_id, stage = %summary.stage, errors = summary.errors.len(), "import reported");
    Ok(summary)
}

/// Validate batch structure and translate vendor exports to canonical columns.
pub fn prepare_batch(batch: &ImportBatch, options: &ReconcileOptions) -> Result<Table, CatalogError> {
    if batch.table.headers.iter().all(|h| h.trim().is_empty()) {
        return Err(CatalogError::validation("batch has no header row"));
    }

    let table = match batch.format {
        SourceFormat::VendorInventory => {
            let t = vendor::translate(
                &batch.table,
                options.vendor_site_license_threshold,
                &options.default_category,
            );
            debug!(batch_id = %batch.batch_id, stage = %ImportStage::Translated, "vendor export translated");
            t
        }
        SourceFormat::Generic => batch.table.clone(),
    };

    let columns = ColumnMap::resolve(&table.headers);
    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .filter(|f| !columns.contains(**f))
        .map(|f| f.canonical_header())
        .collect();
    if !missing.is_empty() {
        return Err(CatalogError::Validation(format!(
            "batch is missing required column(s): {}",
            missing.join(", ")
        )));
    }

    if batch.mode == ImportMode::FullSync && table.data_rows().next().is_none() {
        return Err(CatalogError::validation(
            "full-sync batch has no data rows; refusing to deactivate the whole catalog",
        ));
    }

    debug!(batch_id = %batch.batch_id, stage = %ImportStage::Validated, "batch structure valid");
    Ok(table)
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Identity index over the active part of a snapshot.
struct ActiveIndex {
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl ActiveIndex {
    fn build(snapshot: &[NormalizedRow]) -> Self {
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        for (i, row) in snapshot.iter().enumerate() {
            if !row.entry.active || row.entry.product_name.trim().is_empty() {
                continue;
            }
            if let Some(id) = row.entry.stable_id_key() {
                by_id.entry(id.to_string()).or_insert(i);
            }
            by_name.entry(row.entry.name_key()).or_insert(i);
        }
        Self { by_id, by_name }
    }

    /// Stable id when both sides carry one, else normalized product name.
    fn find(&self, incoming: &NormalizedRow, snapshot: &[NormalizedRow]) -> Option<usize> {
        if let Some(id) = incoming.entry.stable_id_key() {
            if let Some(&i) = self.by_id.get(id) {
                return Some(i);
            }
        }
        let i = *self.by_name.get(&incoming.entry.name_key())?;
        match (incoming.entry.stable_id_key(), snapshot[i].entry.stable_id_key()) {
            (Some(a), Some(b)) if a != b => None,
            _ => Some(i),
        }
    }
}

fn batch_key(row: &NormalizedRow) -> String {
    match row.entry.stable_id_key() {
        Some(id) => format!("id:{id}"),
        None => format!("name:{}", row.entry.name_key()),
    }
}

fn issue_kind_for(field: Field) -> IssueKind {
    match field {
        Field::GradeLevels | Field::Audience | Field::Category => IssueKind::Validation,
        _ => IssueKind::DataQuality,
    }
}

/// Compute mutations for a translated, validated batch. Pure.
pub fn plan_reconcile(
    table: &Table,
    mode: ImportMode,
    snapshot: &[NormalizedRow],
    options: &ReconcileOptions,
) -> ReconcilePlan {
    let incoming = normalize_table(table);
    let index = ActiveIndex::build(snapshot);
    let mut plan = ReconcilePlan::default();
    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut matched: HashSet<usize> = HashSet::new();

    for row in &incoming {
        let name = row.entry.product_name.as_str();
        if name.is_empty() {
            plan.issues.push(RowIssue::new(row.row, "", IssueKind::Validation, "missing product name"));
            continue;
        }
        if !seen_keys.insert(batch_key(row)) {
            plan.issues.push(RowIssue::new(
                row.row,
                name,
                IssueKind::Validation,
                "duplicate of an earlier row in this batch",
            ));
            continue;
        }

        match index.find(row, snapshot) {
            Some(i) => {
                if !matched.insert(i) {
                    plan.issues.push(RowIssue::new(
                        row.row,
                        name,
                        IssueKind::Validation,
                        "matches a catalog entry already matched by another row",
                    ));
                    continue;
                }
                let existing = &snapshot[i];
                let changes = diff_row(existing, row, mode, options, &mut plan.issues);
                if changes.is_empty() {
                    plan.unchanged += 1;
                } else {
                    plan.mutations.push(Mutation::Update {
                        batch_row: row.row,
                        row: existing.row,
                        product_name: existing.entry.product_name.clone(),
                        changes,
                    });
                }
            }
            None if mode == ImportMode::FillMissingOnly => {
                debug!(product = name, "not in catalog; fill-missing-only never adds");
                plan.skipped += 1;
            }
            None => {
                if row.provided(Field::Active).is_some() && !row.entry.active {
                    debug!(product = name, "inactive row not in catalog; skipped");
                    plan.skipped += 1;
                    continue;
                }
                let values = new_row_values(row, options, &mut plan.issues);
                plan.mutations.push(Mutation::Add {
                    batch_row: row.row,
                    product_name: name.to_string(),
                    values,
                });
            }
        }
    }

    if mode == ImportMode::FullSync {
        for (i, existing) in snapshot.iter().enumerate() {
            if existing.entry.active && !existing.entry.product_name.trim().is_empty() && !matched.contains(&i) {
                plan.mutations.push(Mutation::Deactivate {
                    row: existing.row,
                    product_name: existing.entry.product_name.clone(),
                    old_value: existing.cell(Field::Active).unwrap_or("").to_string(),
                });
            }
        }
    }

    plan
}

/// Field-level changes for a matched row under the protected-field policy.
fn diff_row(
    existing: &NormalizedRow,
    incoming: &NormalizedRow,
    mode: ImportMode,
    options: &ReconcileOptions,
    issues: &mut Vec<RowIssue>,
) -> Vec<FieldChange> {
    let name = existing.entry.product_name.as_str();
    let mut changes = Vec::new();

    for field in Field::ALL {
        if field == Field::ProductName {
            continue;
        }
        let Some(new_raw) = incoming.provided(field) else {
            continue;
        };
        let old_raw = existing.cell(field).unwrap_or("");
        let old_empty = old_raw.trim().is_empty();

        if field.is_protected() {
            if mode == ImportMode::FillMissingOnly {
                debug!(product = name, %field, "protected field; fill-missing-only never writes it");
                continue;
            }
            if !old_empty {
                debug!(product = name, %field, kept = old_raw, offered = new_raw, "protected field kept");
                continue;
            }
        }
        if mode == ImportMode::FillMissingOnly && !old_empty {
            continue;
        }

        let new_value = match render_cell(field, new_raw) {
            Ok(v) => v,
            Err(msg) => {
                warn!(product = name, %field, error = %msg, "field write rejected");
                issues.push(RowIssue::new(
                    incoming.row,
                    name,
                    issue_kind_for(field),
                    format!("{field}: {msg}; field left unchanged"),
                ));
                continue;
            }
        };

        if field == Field::Category
            && !old_empty
            && new_value.eq_ignore_ascii_case(&options.default_category)
        {
            continue;
        }
        if comparable(field, old_raw) == new_value {
            continue;
        }
        changes.push(FieldChange {
            field,
            old_value: old_raw.to_string(),
            new_value,
        });
    }

    if incoming.provided(Field::GradeLevels).is_none() && existing.is_empty(Field::GradeLevels) {
        let value_of = |f: Field| -> String {
            changes
                .iter()
                .find(|c| c.field == f)
                .map(|c| c.new_value.clone())
                .unwrap_or_else(|| existing.cell(f).unwrap_or("").to_string())
        };
        if let Some(inferred) = infer_grades(&value_of(Field::Division), &value_of(Field::Audience)) {
            debug!(product = name, grades = %inferred, "grade levels inferred");
            changes.push(FieldChange {
                field: Field::GradeLevels,
                old_value: existing.cell(Field::GradeLevels).unwrap_or("").to_string(),
                new_value: inferred,
            });
        }
    }

    changes
}

fn new_row_values(
    incoming: &NormalizedRow,
    options: &ReconcileOptions,
    issues: &mut Vec<RowIssue>,
) -> Vec<(Field, String)> {
    let name = incoming.entry.product_name.as_str();
    let mut values = Vec::new();

    for field in Field::ALL {
        let Some(raw) = incoming.provided(field) else {
            continue;
        };
        match render_cell(field, raw) {
            Ok(v) => values.push((field, v)),
            Err(msg) => {
                warn!(product = name, %field, error = %msg, "field write rejected");
                issues.push(RowIssue::new(
                    incoming.row,
                    name,
                    issue_kind_for(field),
                    format!("{field}: {msg}; field left empty"),
                ));
            }
        }
    }

    let has = |values: &[(Field, String)], f: Field| values.iter().any(|(v, _)| *v == f);
    if !has(&values, Field::Active) {
        values.push((Field::Active, "TRUE".to_string()));
    }
    if !has(&values, Field::Category) {
        values.push((Field::Category, options.default_category.clone()));
    }
    if !has(&values, Field::DateAdded) {
        values.push((Field::DateAdded, options.as_of.format("%Y-%m-%d").to_string()));
    }
    if !has(&values, Field::GradeLevels) && incoming.provided(Field::GradeLevels).is_none() {
        if let Some(inferred) = infer_grades(&incoming.entry.division, &incoming.entry.audience) {
            values.push((Field::GradeLevels, inferred));
        }
    }

    values
}

/// Grades implied by division membership for student-facing tools.
/// Staff-only tools get nothing; their grade cell stays a blank placeholder.
pub fn infer_grades(division: &str, audience: &str) -> Option<String> {
    let serves_students = vocab::split_list(audience)
        .filter_map(Audience::parse)
        .any(|a| a == Audience::Student);
    if !serves_students {
        return None;
    }

    let lower = division.to_lowercase();
    let flags = DivisionFlags::parse(division);
    let grades: Vec<Grade> = if flags.all() || lower.contains("school-wide") || lower.contains("whole school") {
        Grade::all()
    } else {
        let mut g = Vec::new();
        if flags.elementary {
            g.extend(vocab::elementary_grades());
        }
        if flags.middle {
            g.extend(vocab::middle_grades());
        }
        if flags.high {
            g.extend(vocab::high_grades());
        }
        g
    };

    if grades.is_empty() {
        None
    } else {
        Some(vocab::render_grade_list(&grades))
    }
}

// ---------------------------------------------------------------------------
// Applying
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Applied {
    added: usize,
    updated: usize,
    deactivated: usize,
    remaining: usize,
    issues: Vec<RowIssue>,
}

/// Re-read the row's product name right before writing.
pub fn verify_identity<S: CatalogStore + ?Sized>(
    store: &S,
    row: usize,
    expected: &str,
) -> Result<(), CatalogError> {
    let found = store.read_cell(row, Field::ProductName)?;
    if identity_key(&found) == identity_key(expected) {
        Ok(())
    } else {
        Err(CatalogError::IdentityMismatch {
            row,
            expected: expected.to_string(),
            found,
        })
    }
}

/// Write all changes of one row, or none: a failure restores the cells
/// already written.
pub fn write_row<S: CatalogStore + ?Sized>(
    store: &mut S,
    row: usize,
    changes: &[FieldChange],
) -> Result<(), CatalogError> {
    for (i, change) in changes.iter().enumerate() {
        if let Err(e) = store.write_cell(row, change.field, &change.new_value) {
            for done in changes[..i].iter().rev() {
                if let Err(rollback) = store.write_cell(row, done.field, &done.old_value) {
                    warn!(row, field = %done.field, error = %rollback, "rollback write failed");
                }
            }
            return Err(e);
        }
    }
    Ok(())
}

fn row_issue(row: usize, product: &str, err: &CatalogError) -> RowIssue {
    let kind = match err {
        CatalogError::IdentityMismatch { .. } => IssueKind::IdentityMismatch,
        _ => IssueKind::Store,
    };
    RowIssue::new(row, product, kind, err.to_string())
}

fn apply_plan<S, A>(
    plan: &ReconcilePlan,
    store: &mut S,
    audit: &mut A,
    cap: usize,
    operation: &str,
) -> Result<Applied, CatalogError>
where
    S: CatalogStore + ?Sized,
    A: AuditSink + ?Sized,
{
    let mut out = Applied::default();

    for (i, mutation) in plan.mutations.iter().enumerate() {
        if cap > 0 && i >= cap {
            out.remaining = plan.mutations.len() - i;
            info!(cap, remaining = out.remaining, "write cap reached; re-run to continue");
            break;
        }

        match mutation {
            Mutation::Add { batch_row, product_name, values } => match store.append_row(values) {
                Ok(row) => {
                    let entry = entry_label(values, product_name);
                    for (field, value) in values {
                        audit.append(AuditRecord::new(operation, &entry, row, *field, "", value))?;
                    }
                    out.added += 1;
                }
                Err(e) => {
                    warn!(product = %product_name, error = %e, "add failed");
                    out.issues.push(row_issue(*batch_row, product_name, &e));
                }
            },
            Mutation::Update { batch_row, row, product_name, changes } => {
                let result = verify_identity(&*store, *row, product_name)
                    .and_then(|_| write_row(store, *row, changes));
                match result {
                    Ok(()) => {
                        let entry = stored_entry_label(&*store, *row, product_name);
                        for c in changes {
                            audit.append(AuditRecord::new(
                                operation, &entry, *row, c.field, &c.old_value, &c.new_value,
                            ))?;
                        }
                        out.updated += 1;
                    }
                    Err(e) => {
                        warn!(product = %product_name, row, error = %e, "row write skipped");
                        out.issues.push(row_issue(*batch_row, product_name, &e));
                    }
                }
            }
            Mutation::Deactivate { row, product_name, old_value } => {
                let change = FieldChange {
                    field: Field::Active,
                    old_value: old_value.clone(),
                    new_value: "FALSE".to_string(),
                };
                let result = verify_identity(&*store, *row, product_name)
                    .and_then(|_| write_row(store, *row, std::slice::from_ref(&change)));
                match result {
                    Ok(()) => {
                        let entry = stored_entry_label(&*store, *row, product_name);
                        audit.append(AuditRecord::new(
                            operation, &entry, *row, Field::Active, old_value, "FALSE",
                        ))?;
                        out.deactivated += 1;
                    }
                    Err(e) => {
                        warn!(product = %product_name, row, error = %e, "deactivation skipped");
                        out.issues.push(row_issue(*row, product_name, &e));
                    }
                }
            }
        }
    }

    Ok(out)
}

/// Audit entry for an existing row: its stable id when set, else the name.
fn stored_entry_label<S: CatalogStore + ?Sized>(store: &S, row: usize, product_name: &str) -> String {
    store
        .read_cell(row, Field::StableId)
        .ok()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| product_name.to_string())
}

fn entry_label(values: &[(Field, String)], product_name: &str) -> String {
    values
        .iter()
        .find(|(f, v)| *f == Field::StableId && !v.is_empty())
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| product_name.to_string())
}
