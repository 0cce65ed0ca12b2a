//! Human-readable output. `--json` bypasses this module entirely.

use appcat_catalog::model::{format_dollars, Mutation, ReconcilePlan};
use appcat_catalog::{
    estimate_savings, ClassifiedCatalog, EnrichSummary, ImportBatch, Issue, OverlapGroup,
    ReconcileSummary, Severity, TierView,
};

fn names(entries: &[appcat_catalog::CatalogEntry]) -> String {
    entries
        .iter()
        .map(|e| e.product_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn tier(lines: &mut Vec<String>, label: &str, view: &TierView) {
    lines.push(format!("{} ({})", label, view.len()));
    if !view.core_apps.is_empty() {
        lines.push(format!("  Core:         {}", names(&view.core_apps)));
    }
    if !view.open_access_apps.is_empty() {
        lines.push(format!("  Open access:  {}", names(&view.open_access_apps)));
    }
    for (dept, entries) in &view.by_department {
        lines.push(format!("  {}: {}", dept, names(entries)));
    }
}

pub fn classified(c: &ClassifiedCatalog) -> String {
    let mut lines = Vec::new();
    tier(&mut lines, "Organization-wide", &c.org_wide);
    tier(&mut lines, "Elementary", &c.elementary);
    tier(&mut lines, "Middle", &c.middle);
    tier(&mut lines, "High", &c.high);

    let s = &c.stats;
    lines.push(String::new());
    lines.push(format!(
        "{} entries: {} active, {} inactive, {} multi-division, {} unassigned",
        s.total, s.active, s.inactive, s.multi_division, s.unassigned
    ));
    if s.without_department > 0 {
        lines.push(format!(
            "{} department-specific placement(s) hidden: no department",
            s.without_department
        ));
    }
    lines.push(String::new());
    lines.join("\n")
}

pub fn overlaps(groups: &[OverlapGroup]) -> String {
    if groups.is_empty() {
        return "No overlapping tools found.\n".to_string();
    }

    let mut lines = Vec::new();
    for group in groups {
        lines.push(format!("{} ({} tools)", group.category, group.members.len()));
        for m in &group.members {
            let grades = if m.grade_range.is_empty() { "all grades" } else { m.grade_range.as_str() };
            lines.push(format!(
                "  {:<28} {:>12}  {}  {}",
                m.product_name, m.cost_label, m.division, grades
            ));
        }
        lines.push(format!("  {}", group.recommendation));
        lines.push(String::new());
    }
    lines.push(format!(
        "Estimated savings: {} per year",
        format_dollars(estimate_savings(groups))
    ));
    lines.push(String::new());
    lines.join("\n")
}

pub fn issues(issues: &[Issue]) -> String {
    let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();
    let mut lines: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
    lines.push(format!("{} error(s), {} warning(s)", errors, issues.len() - errors));
    lines.push(String::new());
    lines.join("\n")
}

pub fn summary(s: &ReconcileSummary) -> String {
    let mut lines = vec![
        format!("reconcile {} (batch {}, {} format)", s.mode, s.batch_id, s.source_format),
        format!("  added:        {}", s.added),
        format!("  updated:      {}", s.updated),
        format!("  unchanged:    {}", s.unchanged),
        format!("  skipped:      {}", s.skipped),
        format!("  deactivated:  {}", s.deactivated),
    ];
    if s.remaining > 0 {
        lines.push(format!("  remaining:    {} (run again to continue)", s.remaining));
    }
    if !s.errors.is_empty() {
        lines.push(format!("  errors:       {}", s.errors.len()));
        for e in &s.errors {
            lines.push(format!("    {}", e));
        }
    }
    lines.push(String::new());
    lines.join("\n")
}

pub fn plan(batch: &ImportBatch, plan: &ReconcilePlan) -> String {
    let mut lines = vec![format!(
        "dry run: {} (batch {}, {} format), nothing written",
        batch.mode, batch.batch_id, batch.format
    )];
    for m in &plan.mutations {
        match m {
            Mutation::Add { product_name, values, .. } => {
                lines.push(format!("  + {} ({} field(s))", product_name, values.len()));
            }
            Mutation::Update { product_name, changes, .. } => {
                lines.push(format!("  ~ {}", product_name));
                for c in changes {
                    lines.push(format!("      {}: '{}' -> '{}'", c.field, c.old_value, c.new_value));
                }
            }
            Mutation::Deactivate { product_name, .. } => {
                lines.push(format!("  - {}", product_name));
            }
        }
    }
    lines.push(format!(
        "  {} change(s), {} unchanged, {} skipped",
        plan.mutations.len(),
        plan.unchanged,
        plan.skipped
    ));
    for issue in &plan.issues {
        lines.push(format!("  ! {}", issue));
    }
    lines.push(String::new());
    lines.join("\n")
}

pub fn enrichment(s: &EnrichSummary) -> String {
    let mut lines = vec![format!("enriched {} row(s)", s.filled)];
    if s.remaining > 0 {
        lines.push(format!("{} row(s) left for a later run", s.remaining));
    }
    for f in &s.failed {
        lines.push(format!("  ! {}", f));
    }
    lines.push(String::new());
    lines.join("\n")
}
