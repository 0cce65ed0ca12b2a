use std::fmt;

use serde::Serialize;

/// Structural failures: anything returned as `Err` aborts the call before
/// (or without) writing. Per-row problems are reported as [`RowIssue`]s.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Required external connection parameters are absent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Batch shape is unusable (missing required columns, empty header row).
    #[error("validation error: {0}")]
    Validation(String),

    /// Row drifted since the snapshot was taken.
    #[error("row {row}: expected '{expected}', found '{found}'")]
    IdentityMismatch {
        row: usize,
        expected: String,
        found: String,
    },

    /// Completion collaborator failed (unreachable, rate-limited, unparseable).
    #[error("external service error: {0}")]
    ExternalService(String),

    /// A store rejected a read or write.
    #[error("store error: {0}")]
    Store(String),

    /// Table could not be read.
    #[error("IO error: {0}")]
    Io(String),
}

impl CatalogError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}

// ---------------------------------------------------------------------------
// Row-level issues
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Validation,
    IdentityMismatch,
    ExternalService,
    DataQuality,
    Store,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::IdentityMismatch => write!(f, "identity_mismatch"),
            Self::ExternalService => write!(f, "external_service"),
            Self::DataQuality => write!(f, "data_quality"),
            Self::Store => write!(f, "store"),
        }
    }
}

/// A problem isolated to one row. Collected, never fatal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
    /// 0-based data row in the batch (or store row for enrichment/deactivation).
    pub row: usize,
    pub product_name: String,
    pub kind: IssueKind,
    pub message: String,
}

impl RowIssue {
    pub fn new(row: usize, product_name: &str, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            row,
            product_name: product_name.to_string(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {} ({}): [{}] {}", self.row, self.product_name, self.kind, self.message)
    }
}
