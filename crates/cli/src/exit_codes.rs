//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | Success                                                   |
//! | 1    | General error (store, file or audit log failure)          |
//! | 2    | Usage error (bad arguments, unreadable input file)        |
//! | 3    | Configuration missing or invalid                          |
//! | 4    | Import batch rejected before any write                    |
//! | 5    | Command finished but reported row-level problems          |
//! | 6    | Completion client could not be set up                     |
//! | 7    | Catalog row changed underneath the command                |

use appcat_catalog::CatalogError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// No catalog configured, malformed appcat.toml, missing endpoint.
pub const EXIT_CONFIG: u8 = 3;

/// Batch failed structural checks (missing required columns, empty full sync).
pub const EXIT_BATCH_REJECTED: u8 = 4;

/// Rows were skipped with errors (reconcile, enrich) or the catalog has
/// error-severity issues (validate).
pub const EXIT_ROW_ISSUES: u8 = 5;

/// Completion service cannot be used at all.
pub const EXIT_SERVICE: u8 = 6;

/// Identity re-check failed outside per-row handling.
pub const EXIT_IDENTITY: u8 = 7;

/// Map a CatalogError to its exit code.
pub fn catalog_exit_code(err: &CatalogError) -> u8 {
    match err {
        CatalogError::Configuration(_) => EXIT_CONFIG,
        CatalogError::Validation(_) => EXIT_BATCH_REJECTED,
        CatalogError::IdentityMismatch { .. } => EXIT_IDENTITY,
        CatalogError::ExternalService(_) => EXIT_SERVICE,
        CatalogError::Store(_) | CatalogError::Io(_) => EXIT_ERROR,
    }
}
