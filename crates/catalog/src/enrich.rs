//! Fill missing descriptive fields through a text-completion service.
//!
//! The service is abstract ([`CompletionClient`]); the CLI supplies an HTTP
//! implementation. Calls are spaced by a fixed delay and capped per run.
//! Failures are recorded per row and never retried within the run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::{verify_identity, write_row};
use crate::error::{CatalogError, IssueKind, RowIssue};
use crate::model::{Field, FieldChange};
use crate::normalize::{render_cell, NormalizedRow};
use crate::store::{AuditRecord, AuditSink, CatalogStore};
use crate::vocab;

/// Fields the completion service may fill. None of them is protected.
pub const ENRICHABLE_FIELDS: [Field; 4] = [
    Field::Description,
    Field::Category,
    Field::Audience,
    Field::GradeLevels,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    pub product_name: String,
    pub website: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

pub trait CompletionClient {
    /// Raw completion text for one request.
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub inter_call_delay: Duration,
    pub max_calls_per_run: usize,
    /// Subset of [`ENRICHABLE_FIELDS`] to fill; a row is a candidate when
    /// any of them is empty.
    pub fields: Vec<Field>,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            inter_call_delay: Duration::from_millis(1500),
            max_calls_per_run: 25,
            fields: ENRICHABLE_FIELDS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichSummary {
    /// Rows that received at least one field.
    pub filled: usize,
    pub failed: Vec<RowIssue>,
    /// Candidate rows not attempted in this run.
    pub remaining: usize,
}

/// Expected response shape. List fields may arrive as arrays or strings.
#[derive(Debug, Default, Deserialize)]
struct Suggestion {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    audience: Option<Value>,
    #[serde(default, alias = "gradeLevels")]
    grade_levels: Option<Value>,
}

impl Suggestion {
    fn value(&self, field: Field) -> Option<String> {
        let text = match field {
            Field::Description => self.description.clone(),
            Field::Category => self.category.clone(),
            Field::Audience => self.audience.as_ref().and_then(list_text),
            Field::GradeLevels => self.grade_levels.as_ref().and_then(list_text),
            _ => None,
        };
        text.filter(|t| !t.trim().is_empty())
    }
}

fn list_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|i| i.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        ),
        _ => None,
    }
}

/// Parse the first JSON object in a completion, tolerating surrounding prose
/// or code fences.
fn parse_suggestion(text: &str) -> Result<Suggestion, CompletionError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let body = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => return Err(CompletionError::Malformed("no JSON object in response".into())),
    };
    serde_json::from_str(body).map_err(|e| CompletionError::Malformed(e.to_string()))
}

pub fn build_prompt(row: &NormalizedRow, fields: &[Field]) -> String {
    let wanted: Vec<&str> = fields.iter().map(|f| f.canonical_header()).collect();
    format!(
        "Describe the education technology product \"{name}\"{site}.\n\
         Reply with one JSON object with keys: {keys}.\n\
         description: one or two sentences for teachers.\n\
         category: one of {categories}.\n\
         audience: list drawn from Teacher, Student, Staff, Parent.\n\
         grade_levels: list drawn from Pre-K, Kindergarten, Grade 1 .. Grade 12.",
        name = row.entry.product_name,
        site = if row.entry.website.is_empty() {
            String::new()
        } else {
            format!(" ({})", row.entry.website)
        },
        keys = wanted.join(", "),
        categories = vocab::CATEGORIES.join(", "),
    )
}

fn missing_fields(row: &NormalizedRow, fields: &[Field]) -> Vec<Field> {
    fields
        .iter()
        .copied()
        .filter(|f| ENRICHABLE_FIELDS.contains(f) && !f.is_protected() && row.is_empty(*f))
        .collect()
}

/// Scan active rows from the top and fill empty descriptive fields.
pub fn enrich_missing<S, C, A>(
    store: &mut S,
    client: &C,
    audit: &mut A,
    options: &EnrichOptions,
) -> Result<EnrichSummary, CatalogError>
where
    S: CatalogStore + ?Sized,
    C: CompletionClient + ?Sized,
    A: AuditSink + ?Sized,
{
    let snapshot = store.snapshot()?;
    let candidates: Vec<(NormalizedRow, Vec<Field>)> = snapshot
        .into_iter()
        .filter(|r| r.entry.active && !r.entry.product_name.is_empty())
        .filter_map(|r| {
            let missing = missing_fields(&r, &options.fields);
            (!missing.is_empty()).then_some((r, missing))
        })
        .collect();

    info!(candidates = candidates.len(), max_calls = options.max_calls_per_run, "enrichment started");

    let mut summary = EnrichSummary::default();
    let total = candidates.len();

    for (calls, (row, missing)) in candidates.iter().enumerate() {
        if calls >= options.max_calls_per_run {
            summary.remaining = total - calls;
            break;
        }
        if calls > 0 && !options.inter_call_delay.is_zero() {
            std::thread::sleep(options.inter_call_delay);
        }

        let name = row.entry.product_name.as_str();
        let request = CompletionRequest {
            product_name: name.to_string(),
            website: row.entry.website.clone(),
            prompt: build_prompt(row, missing),
        };

        let suggestion = client
            .complete(&request)
            .and_then(|text| parse_suggestion(&text));
        let suggestion = match suggestion {
            Ok(s) => s,
            Err(e) => {
                warn!(product = name, error = %e, "completion failed");
                summary.failed.push(RowIssue::new(row.row, name, IssueKind::ExternalService, e.to_string()));
                if matches!(e, CompletionError::RateLimited(_)) {
                    summary.remaining = total - calls - 1;
                    info!(remaining = summary.remaining, "rate limited; stopping run");
                    break;
                }
                continue;
            }
        };

        let mut changes = Vec::new();
        for field in missing {
            let Some(raw) = suggestion.value(*field) else {
                continue;
            };
            match render_cell(*field, &raw) {
                Ok(value) => changes.push(FieldChange {
                    field: *field,
                    old_value: row.cell(*field).unwrap_or("").to_string(),
                    new_value: value,
                }),
                Err(msg) => {
                    debug!(product = name, %field, error = %msg, "suggested value rejected");
                    summary.failed.push(RowIssue::new(
                        row.row,
                        name,
                        IssueKind::Validation,
                        format!("{field}: {msg}"),
                    ));
                }
            }
        }
        if changes.is_empty() {
            continue;
        }

        let written = verify_identity(&*store, row.row, name).and_then(|_| write_row(store, row.row, &changes));
        match written {
            Ok(()) => {
                let entry = row.entry.stable_id_key().unwrap_or(name);
                for c in &changes {
                    audit.append(AuditRecord::new("enrich", entry, row.row, c.field, &c.old_value, &c.new_value))?;
                }
                summary.filled += 1;
            }
            Err(e) => {
                let kind = match e {
                    CatalogError::IdentityMismatch { .. } => IssueKind::IdentityMismatch,
                    _ => IssueKind::Store,
                };
                warn!(product = name, error = %e, "enrichment write skipped");
                summary.failed.push(RowIssue::new(row.row, name, kind, e.to_string()));
            }
        }
    }

    info!(
        filled = summary.filled,
        failed = summary.failed.len(),
        remaining = summary.remaining,
        "enrichment finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use crate::store::{MemoryAudit, SheetStore};
    use crate::table::Table;

    struct Scripted {
        replies: RefCell<VecDeque<Result<String, CompletionError>>>,
        seen: RefCell<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, CompletionError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl CompletionClient for Scripted {
        fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
            self.seen.borrow_mut().push(request.product_name.clone());
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(CompletionError::Unavailable("script exhausted".into())))
        }
    }

    fn store() -> SheetStore {
        SheetStore::from_table(
            Table::from_csv_str(
                "Product Name,Active,Division,Department,Description,Category,Audience,Grade Levels\n\
                 Alpha,TRUE,High,Math,,,,\n\
                 Beta,TRUE,High,Math,Has one,Math,Student,9-12\n\
                 Gamma,TRUE,Middle,,,Science,,\n\
                 Old,FALSE,High,,,,,\n",
            )
            .unwrap(),
        )
    }

    fn options(max: usize) -> EnrichOptions {
        EnrichOptions {
            inter_call_delay: Duration::ZERO,
            max_calls_per_run: max,
            ..EnrichOptions::default()
        }
    }

    #[test]
    fn fills_only_empty_fields_and_audits() {
        let mut s = store();
        let mut audit = MemoryAudit::default();
        let client = Scripted::new(vec![
            Ok(r#"```json
{"description": "Graphs.", "category": "math", "audience": ["Students"], "grade_levels": "9-10"}
```"#
                .into()),
            Ok(r#"{"description": "Labs.", "category": "Math", "audience": "Student", "grade_levels": ["Grade 6"]}"#.into()),
        ]);
        let summary = enrich_missing(&mut s, &client, &mut audit, &options(10)).unwrap();

        assert_eq!(*client.seen.borrow(), vec!["Alpha", "Gamma"]);
        assert_eq!(summary.filled, 2);
        assert!(summary.failed.is_empty());
        assert_eq!(s.read_cell(0, Field::Category).unwrap(), "Math");
        assert_eq!(s.read_cell(0, Field::Audience).unwrap(), "Student");
        assert_eq!(s.read_cell(0, Field::GradeLevels).unwrap(), "Grade 9, Grade 10");
        assert_eq!(s.read_cell(2, Field::Category).unwrap(), "Science");
        assert_eq!(s.read_cell(2, Field::Department).unwrap(), "");
        assert!(audit.records.iter().all(|r| r.operation == "enrich"));
        assert_eq!(audit.records.len(), 4 + 3);
    }

    #[test]
    fn failures_are_recorded_not_retried() {
        let mut s = store();
        let mut audit = MemoryAudit::default();
        let client = Scripted::new(vec![
            Ok("I cannot help with that.".into()),
            Ok(r#"{"description": "Labs.", "grade_levels": "Grade 13"}"#.into()),
        ]);
        let summary = enrich_missing(&mut s, &client, &mut audit, &options(10)).unwrap();
        assert_eq!(client.seen.borrow().len(), 2);
        assert_eq!(summary.filled, 1);
        assert_eq!(summary.failed.len(), 2);
        assert_eq!(summary.failed[0].kind, IssueKind::ExternalService);
        assert_eq!(summary.failed[1].kind, IssueKind::Validation);
        assert_eq!(s.read_cell(2, Field::Description).unwrap(), "Labs.");
        assert_eq!(s.read_cell(2, Field::GradeLevels).unwrap(), "");
    }

    #[test]
    fn rate_limit_stops_the_run() {
        let mut s = store();
        let mut audit = MemoryAudit::default();
        let client = Scripted::new(vec![Err(CompletionError::RateLimited("429".into()))]);
        let summary = enrich_missing(&mut s, &client, &mut audit, &options(10)).unwrap();
        assert_eq!(client.seen.borrow().len(), 1);
        assert_eq!(summary.remaining, 1);
        assert!(audit.records.is_empty());
    }

    #[test]
    fn call_cap_leaves_remaining() {
        let mut s = store();
        let mut audit = MemoryAudit::default();
        let client = Scripted::new(vec![Ok(r#"{"description": "Graphs."}"#.into())]);
        let summary = enrich_missing(&mut s, &client, &mut audit, &options(1)).unwrap();
        assert_eq!(summary.filled, 1);
        assert_eq!(summary.remaining, 1);
    }

    #[test]
    fn prompt_names_product_and_keys() {
        let rows = s_rows();
        let prompt = build_prompt(&rows[0], &[Field::Description, Field::Audience]);
        assert!(prompt.contains("\"Alpha\""));
        assert!(prompt.contains("keys: description, audience"));
    }

    fn s_rows() -> Vec<NormalizedRow> {
        store().snapshot().unwrap()
    }
}
