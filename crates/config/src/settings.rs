// Application settings
// Loaded from ~/.config/appcat/appcat.toml (or --config)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use appcat_catalog::vocab;
use appcat_catalog::{CatalogError, EnrichOptions, ReconcileOptions};

/// Where the catalog and its audit trail live
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Catalog sheet (csv, tsv, xlsx). Required for every command.
    pub catalog: Option<PathBuf>,

    /// Worksheet name when the catalog is a workbook
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,

    /// Append-only audit log; defaults to `<catalog>-audit.csv`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    /// Mutations applied per call; 0 disables the cap
    pub max_writes_per_call: usize,

    /// Vendor licence count at which a purchase reads as a site licence
    pub vendor_site_license_threshold: u32,

    /// Category given to new rows without one
    pub default_category: String,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            max_writes_per_call: 200,
            vendor_site_license_threshold: 100,
            default_category: vocab::DEFAULT_CATEGORY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentSettings {
    /// Chat-completions endpoint. Required by `enrich`.
    pub endpoint: Option<String>,

    /// Model identifier passed through to the endpoint
    pub model: String,

    /// Key lookup name: APPCAT_<PROVIDER>_KEY or keychain entry
    pub provider: String,

    pub inter_call_delay_ms: u64,
    pub max_calls_per_run: usize,
    pub timeout_secs: u64,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: "gpt-4o-mini".to_string(),
            provider: "openai".to_string(),
            inter_call_delay_ms: 1500,
            max_calls_per_run: 25,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub reconcile: ReconcileSettings,
    pub enrichment: EnrichmentSettings,

    /// Directory relative store paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Settings {
    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("appcat");
        config_dir.join("appcat.toml")
    }

    pub fn from_toml_str(text: &str) -> Result<Self, CatalogError> {
        let settings: Settings = toml::from_str(text)
            .map_err(|e| CatalogError::Configuration(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings. An explicit path must exist; a missing default file
    /// yields defaults (commands that need a catalog then fail on
    /// [`Settings::catalog_path`]).
    pub fn load(explicit: Option<&Path>) -> Result<Self, CatalogError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => Self::config_path(),
        };

        if !path.exists() {
            if explicit.is_some() {
                return Err(CatalogError::Configuration(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(Self {
                base_dir: PathBuf::from("."),
                ..Self::default()
            });
        }

        let text = fs::read_to_string(&path)
            .map_err(|e| CatalogError::Configuration(format!("{}: {e}", path.display())))?;
        let mut settings = Self::from_toml_str(&text)?;
        settings.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(settings)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if vocab::canonical_category(&self.reconcile.default_category).is_none() {
            return Err(CatalogError::Configuration(format!(
                "reconcile.default_category '{}' is not a known category",
                self.reconcile.default_category
            )));
        }
        if self.enrichment.max_calls_per_run == 0 {
            return Err(CatalogError::Configuration(
                "enrichment.max_calls_per_run must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }

    /// Apply a `--catalog` override from the command line.
    pub fn with_catalog(mut self, catalog: Option<PathBuf>) -> Self {
        if let Some(c) = catalog {
            // Command-line paths are relative to the working directory
            let c = if c.is_absolute() {
                c
            } else {
                std::env::current_dir().map(|d| d.join(&c)).unwrap_or(c)
            };
            self.store.catalog = Some(c);
        }
        self
    }

    pub fn catalog_path(&self) -> Result<PathBuf, CatalogError> {
        self.store
            .catalog
            .as_deref()
            .map(|p| self.resolve(p))
            .ok_or_else(|| {
                CatalogError::Configuration(
                    "no catalog configured: set [store] catalog in appcat.toml or pass --catalog".to_string(),
                )
            })
    }

    pub fn audit_log_path(&self) -> Result<PathBuf, CatalogError> {
        if let Some(p) = &self.store.audit_log {
            return Ok(self.resolve(p));
        }
        let catalog = self.catalog_path()?;
        let stem = catalog
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("catalog")
            .to_string();
        Ok(catalog.with_file_name(format!("{stem}-audit.csv")))
    }

    pub fn reconcile_options(&self, as_of: NaiveDate) -> ReconcileOptions {
        ReconcileOptions {
            max_writes_per_call: self.reconcile.max_writes_per_call,
            vendor_site_license_threshold: self.reconcile.vendor_site_license_threshold,
            default_category: vocab::canonical_category(&self.reconcile.default_category)
                .unwrap_or(vocab::DEFAULT_CATEGORY)
                .to_string(),
            as_of,
        }
    }

    pub fn enrich_options(&self) -> EnrichOptions {
        EnrichOptions {
            inter_call_delay: Duration::from_millis(self.enrichment.inter_call_delay_ms),
            max_calls_per_run: self.enrichment.max_calls_per_run,
            ..EnrichOptions::default()
        }
    }

    pub fn completion_endpoint(&self) -> Result<&str, CatalogError> {
        self.enrichment
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| {
                CatalogError::Configuration("enrichment.endpoint is not set".to_string())
            })
    }

    /// Write a commented starter file if none exists.
    pub fn create_default_file(path: &Path) -> Result<bool, String> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        fs::write(path, DEFAULT_FILE).map_err(|e| e.to_string())?;
        Ok(true)
    }
}

const DEFAULT_FILE: &str = r#"# appcat settings

[store]
# catalog = "catalog.csv"
# audit_log = "catalog-audit.csv"

[reconcile]
max_writes_per_call = 200
vendor_site_license_threshold = 100
default_category = "Other"

[enrichment]
# endpoint = "https://api.openai.com/v1/chat/completions"
model = "gpt-4o-mini"
provider = "openai"
inter_call_delay_ms = 1500
max_calls_per_run = 25
"#;
