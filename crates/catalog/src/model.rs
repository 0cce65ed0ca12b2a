use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::RowIssue;
use crate::vocab::{self, Audience, Grade};

// ---------------------------------------------------------------------------
// Canonical fields
// ---------------------------------------------------------------------------

/// Canonical catalog columns. Header strings are resolved to these once per
/// table (see [`crate::normalize::ColumnMap`]); nothing downstream looks at
/// raw header text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    ProductName,
    StableId,
    Active,
    Division,
    Department,
    Subjects,
    IsOrgCore,
    LicenseType,
    LicenseCount,
    AnnualCost,
    Category,
    Audience,
    GradeLevels,
    Description,
    Website,
    SupportEmail,
    TutorialLink,
    MobileSupport,
    SsoEnabled,
    LogoUrl,
    DateAdded,
    RenewalDate,
}

impl Field {
    pub const ALL: [Field; 22] = [
        Field::ProductName,
        Field::StableId,
        Field::Active,
        Field::Division,
        Field::Department,
        Field::Subjects,
        Field::IsOrgCore,
        Field::LicenseType,
        Field::LicenseCount,
        Field::AnnualCost,
        Field::Category,
        Field::Audience,
        Field::GradeLevels,
        Field::Description,
        Field::Website,
        Field::SupportEmail,
        Field::TutorialLink,
        Field::MobileSupport,
        Field::SsoEnabled,
        Field::LogoUrl,
        Field::DateAdded,
        Field::RenewalDate,
    ];

    /// Header written when a store has to create this column.
    pub fn canonical_header(&self) -> &'static str {
        match self {
            Self::ProductName => "product_name",
            Self::StableId => "id",
            Self::Active => "active",
            Self::Division => "division",
            Self::Department => "department",
            Self::Subjects => "subjects",
            Self::IsOrgCore => "is_org_core",
            Self::LicenseType => "license_type",
            Self::LicenseCount => "license_count",
            Self::AnnualCost => "annual_cost",
            Self::Category => "category",
            Self::Audience => "audience",
            Self::GradeLevels => "grade_levels",
            Self::Description => "description",
            Self::Website => "website",
            Self::SupportEmail => "support_email",
            Self::TutorialLink => "tutorial_link",
            Self::MobileSupport => "mobile_support",
            Self::SsoEnabled => "sso_enabled",
            Self::LogoUrl => "logo_url",
            Self::DateAdded => "date_added",
            Self::RenewalDate => "renewal_date",
        }
    }

    /// Manually curated: never silently overwritten by an import.
    pub fn is_protected(&self) -> bool {
        matches!(self, Self::Department | Self::Subjects | Self::IsOrgCore)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Self::Active | Self::IsOrgCore | Self::SsoEnabled)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_header())
    }
}

// ---------------------------------------------------------------------------
// Cost
// ---------------------------------------------------------------------------

/// Annual cost in cents. `Amount(0)` is "Free" and is never conflated with
/// a missing or unparseable cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnnualCost {
    #[default]
    Unknown,
    Invalid(String),
    Amount(i64),
}

impl AnnualCost {
    pub fn cents(&self) -> Option<i64> {
        match self {
            Self::Amount(c) => Some(*c),
            _ => None,
        }
    }

    /// Cost used for arithmetic; unknown counts as nothing.
    pub fn cents_or_zero(&self) -> i64 {
        self.cents().unwrap_or(0)
    }

    pub fn is_free(&self) -> bool {
        matches!(self, Self::Amount(0))
    }

    pub fn label(&self) -> String {
        match self {
            Self::Amount(0) => "Free".to_string(),
            Self::Amount(c) => format_dollars(*c),
            Self::Unknown | Self::Invalid(_) => "Unknown".to_string(),
        }
    }
}

/// Storage rendering: `1234.5` dollars -> `"1234.50"`, whole dollars without a fraction.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    if abs % 100 == 0 {
        format!("{sign}{}", abs / 100)
    } else {
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Display rendering with thousands separators: `"$1,234.50"`.
pub fn format_dollars(cents: i64) -> String {
    let abs = cents.unsigned_abs();
    let whole = (abs / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if cents < 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", abs % 100)
}

// ---------------------------------------------------------------------------
// Catalog entry
// ---------------------------------------------------------------------------

/// One application record, fully coerced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub product_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stable_id: Option<String>,
    pub active: bool,
    pub division: String,
    pub department: String,
    pub subjects: String,
    pub is_org_core: bool,
    pub license_type: String,
    pub license_count: u32,
    pub annual_cost: AnnualCost,
    pub category: String,
    pub audience: String,
    pub grade_levels: String,
    pub description: String,
    pub website: String,
    pub support_email: String,
    pub tutorial_link: String,
    pub mobile_support: String,
    pub sso_enabled: bool,
    pub logo_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_added: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_date: Option<NaiveDate>,
}

impl CatalogEntry {
    pub fn named(name: &str) -> Self {
        Self {
            product_name: name.to_string(),
            active: true,
            ..Self::default()
        }
    }

    /// Case-insensitive, trimmed product name used for identity matching.
    pub fn name_key(&self) -> String {
        identity_key(&self.product_name)
    }

    pub fn stable_id_key(&self) -> Option<&str> {
        self.stable_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Expanded grade set; unparseable lists count as unknown (empty).
    pub fn grade_set(&self) -> Vec<Grade> {
        vocab::parse_grade_list(&self.grade_levels).unwrap_or_default()
    }

    /// Audience values that belong to the vocabulary; stray tokens are dropped.
    pub fn audience_set(&self) -> Vec<Audience> {
        vocab::split_list(&self.audience)
            .filter_map(|t| Audience::parse(t))
            .collect()
    }

    pub fn serves(&self, audience: Audience) -> bool {
        self.audience_set().contains(&audience)
    }
}

pub fn identity_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Case-insensitive, accent-folded key for alphabetical presentation order.
pub fn name_sort_key(name: &str) -> String {
    name.trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportMode {
    AddUpdate,
    FullSync,
    FillMissingOnly,
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddUpdate => write!(f, "add-update"),
            Self::FullSync => write!(f, "full-sync"),
            Self::FillMissingOnly => write!(f, "fill-missing-only"),
        }
    }
}

impl FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "add-update" | "add_update" => Ok(Self::AddUpdate),
            "full-sync" | "full_sync" => Ok(Self::FullSync),
            "fill-missing-only" | "fill_missing_only" | "fill-missing" => Ok(Self::FillMissingOnly),
            other => Err(format!(
                "unknown import mode \"{other}\" (expected add-update, full-sync or fill-missing-only)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Generic,
    /// License-inventory export from the purchasing vendor feed.
    VendorInventory,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic => write!(f, "generic"),
            Self::VendorInventory => write!(f, "vendor_inventory"),
        }
    }
}

/// Per-call import state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStage {
    Parsed,
    Validated,
    Translated,
    Reconciled,
    Applied,
    Reported,
    Rejected,
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsed => write!(f, "parsed"),
            Self::Validated => write!(f, "validated"),
            Self::Translated => write!(f, "translated"),
            Self::Reconciled => write!(f, "reconciled"),
            Self::Applied => write!(f, "applied"),
            Self::Reported => write!(f, "reported"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: Field,
    pub old_value: String,
    pub new_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    Add {
        batch_row: usize,
        product_name: String,
        values: Vec<(Field, String)>,
    },
    Update {
        batch_row: usize,
        row: usize,
        product_name: String,
        changes: Vec<FieldChange>,
    },
    Deactivate {
        row: usize,
        product_name: String,
        old_value: String,
    },
}

impl Mutation {
    pub fn product_name(&self) -> &str {
        match self {
            Self::Add { product_name, .. }
            | Self::Update { product_name, .. }
            | Self::Deactivate { product_name, .. } => product_name,
        }
    }
}

/// Mutations computed against one snapshot, before any write.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcilePlan {
    pub mutations: Vec<Mutation>,
    pub unchanged: usize,
    /// Batch rows deliberately not acted on (not in catalog under
    /// fill-missing-only, or new rows marked inactive).
    pub skipped: usize,
    pub issues: Vec<RowIssue>,
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileSummary {
    pub batch_id: String,
    pub mode: ImportMode,
    pub source_format: SourceFormat,
    pub stage: ImportStage,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub deactivated: usize,
    /// Mutations left for a follow-up call once the write cap was reached.
    pub remaining: usize,
    pub errors: Vec<RowIssue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_labels() {
        assert_eq!(AnnualCost::Amount(0).label(), "Free");
        assert_eq!(AnnualCost::Amount(123_450).label(), "$1,234.50");
        assert_eq!(AnnualCost::Amount(99).label(), "$0.99");
        assert_eq!(AnnualCost::Unknown.label(), "Unknown");
        assert_eq!(AnnualCost::Invalid("TBD".into()).label(), "Unknown");
    }

    #[test]
    fn cents_storage_rendering() {
        assert_eq!(format_cents(0), "0");
        assert_eq!(format_cents(120_000), "1200");
        assert_eq!(format_cents(120_050), "1200.50");
        assert_eq!(format_cents(5), "0.05");
    }

    #[test]
    fn import_mode_parse() {
        assert_eq!("add-update".parse::<ImportMode>().unwrap(), ImportMode::AddUpdate);
        assert_eq!("Full-Sync".parse::<ImportMode>().unwrap(), ImportMode::FullSync);
        assert_eq!(
            "fill_missing_only".parse::<ImportMode>().unwrap(),
            ImportMode::FillMissingOnly
        );
        assert!("replace".parse::<ImportMode>().is_err());
    }

    #[test]
    fn sort_key_folds_case_and_accents() {
        assert_eq!(name_sort_key("Éclair"), "eclair");
        assert!(name_sort_key("apple") < name_sort_key("Banana"));
        assert!(name_sort_key("Éclair") < name_sort_key("Fable"));
    }

    #[test]
    fn protected_fields() {
        let protected: Vec<Field> = Field::ALL.iter().copied().filter(Field::is_protected).collect();
        assert_eq!(protected, vec![Field::Department, Field::Subjects, Field::IsOrgCore]);
    }
}
