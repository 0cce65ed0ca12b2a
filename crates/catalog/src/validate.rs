//! Catalog health checks for admin tooling.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::model::{AnnualCost, CatalogEntry, Field};
use crate::normalize::NormalizedRow;
use crate::vocab;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub severity: Severity,
    /// 0-based data row: the slice index for [`validate_catalog`], the table
    /// row for [`validate_rows`].
    pub row: usize,
    pub product_name: String,
    pub field: Field,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} row {} ({}) {}: {}",
            self.severity, self.row, self.product_name, self.field, self.message
        )
    }
}

/// Descriptive fields whose absence is reported as a data-quality warning.
const DESCRIPTIVE_FIELDS: [Field; 4] = [
    Field::Description,
    Field::Category,
    Field::Audience,
    Field::GradeLevels,
];

/// Required-field and data-quality gaps. Inactive entries are only checked
/// for a product name.
pub fn validate_catalog(entries: &[CatalogEntry]) -> Vec<Issue> {
    check(entries.iter().enumerate())
}

/// Same checks over normalized rows; issues carry the rows' table indices,
/// which stay correct when the sheet has blank rows.
pub fn validate_rows(rows: &[NormalizedRow]) -> Vec<Issue> {
    check(rows.iter().map(|r| (r.row, &r.entry)))
}

fn check<'a>(entries: impl Iterator<Item = (usize, &'a CatalogEntry)>) -> Vec<Issue> {
    let mut issues = Vec::new();
    let mut names: HashMap<String, usize> = HashMap::new();
    let mut ids: HashMap<String, usize> = HashMap::new();

    for (row, e) in entries {
        let mut push = |severity, field, message: String| {
            issues.push(Issue {
                severity,
                row,
                product_name: e.product_name.clone(),
                field,
                message,
            });
        };

        if e.product_name.trim().is_empty() {
            push(Severity::Error, Field::ProductName, "product name is empty".into());
            continue;
        }
        if !e.active {
            continue;
        }

        if let Some(first) = names.insert(e.name_key(), row) {
            push(
                Severity::Error,
                Field::ProductName,
                format!("duplicate active product name (first seen at row {first})"),
            );
        }
        if let Some(id) = e.stable_id_key() {
            if let Some(first) = ids.insert(id.to_lowercase(), row) {
                push(
                    Severity::Error,
                    Field::StableId,
                    format!("duplicate id '{id}' (first seen at row {first})"),
                );
            }
        }

        if e.division.trim().is_empty() {
            push(Severity::Error, Field::Division, "division is empty".into());
        }
        if e.department.trim().is_empty() {
            push(Severity::Error, Field::Department, "department is empty".into());
        }

        if !e.grade_levels.trim().is_empty() {
            if let Err(err) = vocab::parse_grade_list(&e.grade_levels) {
                push(Severity::Error, Field::GradeLevels, err.to_string());
            }
        }
        if !e.audience.trim().is_empty() {
            if let Err(msg) = vocab::parse_audience_list(&e.audience) {
                push(Severity::Error, Field::Audience, msg);
            }
        }
        if !e.category.trim().is_empty() && vocab::canonical_category(&e.category).is_none() {
            push(
                Severity::Warning,
                Field::Category,
                format!("'{}' is not a known category", e.category.trim()),
            );
        }
        if let AnnualCost::Invalid(raw) = &e.annual_cost {
            push(Severity::Error, Field::AnnualCost, format!("'{raw}' is not a cost"));
        }

        for field in DESCRIPTIVE_FIELDS {
            let value = match field {
                Field::Description => &e.description,
                Field::Category => &e.category,
                Field::Audience => &e.audience,
                _ => &e.grade_levels,
            };
            if value.trim().is_empty() {
                push(Severity::Warning, field, "missing".into());
            }
        }
    }

    issues
}
