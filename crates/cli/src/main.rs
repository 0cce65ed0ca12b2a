// appcat - application catalog reconciliation and reporting

mod completion;
mod exit_codes;
mod report;

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, info, warn};

use appcat_catalog::engine::prepare_batch;
use appcat_catalog::normalize::{normalize_table, NormalizedRow};
use appcat_catalog::{
    classify, detect_overlaps, enrich_missing, plan_reconcile, reconcile, validate_rows,
    AuditSink, CatalogEntry, CatalogError, CatalogStore, Field, ImportBatch, ImportMode,
    MemoryAudit, Severity, SheetStore, Table,
};
use appcat_config::keys::{self, ProviderKey};
use appcat_config::Settings;
use appcat_io::CsvAuditLog;

use completion::HttpCompletionClient;
use exit_codes::{
    catalog_exit_code, EXIT_CONFIG, EXIT_ERROR, EXIT_ROW_ISSUES, EXIT_SERVICE, EXIT_SUCCESS,
    EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "appcat")]
#[command(about = "Reconcile, classify and audit a school's application catalog")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (default: <config dir>/appcat/appcat.toml)
    #[arg(long, global = true, env = "APPCAT_CONFIG")]
    config: Option<PathBuf>,

    /// Catalog file, overriding [store] catalog
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Log line format on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter settings file
    Init,

    /// Show active apps grouped by division and tier
    Classify,

    /// Apply an import batch to the catalog
    #[command(after_help = "\
Examples:
  appcat reconcile purchases.csv --mode add-update
  appcat reconcile vendor-export.xlsx --batch-sheet Licenses
  appcat reconcile roster.csv --mode full-sync --dry-run")]
    Reconcile {
        /// Batch file (csv, tsv, xlsx, xls, ods)
        batch: PathBuf,

        /// add-update, full-sync or fill-missing-only
        #[arg(long, short = 'm', default_value = "add-update")]
        mode: ImportMode,

        /// Worksheet to read when the batch is a workbook
        #[arg(long)]
        batch_sheet: Option<String>,

        /// Compute the changes without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Find tools with the same job serving the same students
    Overlaps,

    /// Check required fields, vocabularies and duplicates
    Validate {
        /// Exit non-zero on warnings too
        #[arg(long)]
        strict: bool,
    },

    /// Fill empty descriptive fields through the completion service
    Enrich {
        /// Maximum completion calls this run (default from settings)
        #[arg(long)]
        limit: Option<usize>,

        /// Fields to fill (default: all descriptive fields)
        #[arg(long, value_enum, value_delimiter = ',')]
        fields: Vec<EnrichField>,
    },

    /// Manage the completion service API key
    #[command(subcommand)]
    Key(KeyCommands),
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Store a key read from stdin in the system keychain
    Set {
        /// Provider name (default from settings)
        provider: Option<String>,
    },
    /// Report where the key would be read from
    Status { provider: Option<String> },
    /// Remove a stored key from the keychain
    Delete { provider: Option<String> },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EnrichField {
    Description,
    Category,
    Audience,
    GradeLevels,
}

impl From<EnrichField> for Field {
    fn from(f: EnrichField) -> Self {
        match f {
            EnrichField::Description => Field::Description,
            EnrichField::Category => Field::Category,
            EnrichField::Audience => Field::Audience,
            EnrichField::GradeLevels => Field::GradeLevels,
        }
    }
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  appcat-catalog ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "appcat=info",
        1 => "appcat=debug",
        _ => "appcat=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(io::stderr)
                .init();
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let result = run(&cli);

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    if let Commands::Init = cli.command {
        return cmd_init(cli.config.as_deref());
    }

    let settings = Settings::load(cli.config.as_deref())
        .map_err(CliError::catalog)?
        .with_catalog(cli.catalog.clone());
    let ctx = Context {
        settings,
        json: cli.json,
    };

    match &cli.command {
        Commands::Init => Ok(()),
        Commands::Classify => cmd_classify(&ctx),
        Commands::Reconcile {
            batch,
            mode,
            batch_sheet,
            dry_run,
        } => cmd_reconcile(&ctx, batch, *mode, batch_sheet.as_deref(), *dry_run),
        Commands::Overlaps => cmd_overlaps(&ctx),
        Commands::Validate { strict } => cmd_validate(&ctx, *strict),
        Commands::Enrich { limit, fields } => cmd_enrich(&ctx, *limit, fields),
        Commands::Key(key_cmd) => cmd_key(&ctx, key_cmd),
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Create error from a catalog error with its registered exit code.
    pub fn catalog(err: CatalogError) -> Self {
        let code = catalog_exit_code(&err);
        let hint = match &err {
            CatalogError::Configuration(_) => Some(format!(
                "run `appcat init` or edit {}",
                Settings::config_path().display()
            )),
            CatalogError::Validation(_) => {
                Some("nothing was written; fix the batch file and run again".to_string())
            }
            CatalogError::IdentityMismatch { .. } => Some(
                "the catalog changed on disk after it was loaded; nothing was written, run the command again"
                    .to_string(),
            ),
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }

    /// Command completed but some rows were not processed cleanly.
    pub fn row_issues(count: usize, what: &str) -> Self {
        Self {
            code: EXIT_ROW_ISSUES,
            message: format!("{} {}", count, what),
            hint: None,
        }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

struct Context {
    settings: Settings,
    json: bool,
}

impl Context {
    fn catalog_path(&self) -> Result<PathBuf, CliError> {
        self.settings.catalog_path().map_err(CliError::catalog)
    }

    fn load_rows(&self) -> Result<Vec<NormalizedRow>, CliError> {
        let path = self.catalog_path()?;
        let table = appcat_io::load_table(&path, self.settings.store.sheet.as_deref())
            .map_err(CliError::io)?;
        debug!(path = %path.display(), rows = table.len(), "catalog loaded");
        Ok(normalize_table(&table))
    }

    fn load_entries(&self) -> Result<Vec<CatalogEntry>, CliError> {
        Ok(self.load_rows()?.into_iter().map(|r| r.entry).collect())
    }

    fn open_audit(&self) -> Result<CsvAuditLog, CliError> {
        let path = self.settings.audit_log_path().map_err(CliError::catalog)?;
        CsvAuditLog::open(&path).map_err(CliError::io)
    }

    /// Load the catalog for editing. Returns the store plus an untouched copy
    /// of what was read, for [`Context::commit`].
    fn load_store_for_edit(&self, path: &Path) -> Result<(SheetStore, Table), CliError> {
        appcat_io::ensure_writable(path).map_err(CliError::io)?;
        let store = appcat_io::load_store(path, self.settings.store.sheet.as_deref())
            .map_err(CliError::io)?;
        let original = store.table().clone();
        Ok((store, original))
    }

    /// Save an edited store, then publish the records buffered while editing.
    /// The audit log only ever describes writes that reached the catalog file.
    fn commit(
        &self,
        store: &SheetStore,
        original: &Table,
        path: &Path,
        pending: MemoryAudit,
        log: &mut CsvAuditLog,
    ) -> Result<(), CliError> {
        appcat_io::verify_unchanged(original, path, self.settings.store.sheet.as_deref())
            .map_err(CliError::catalog)?;
        appcat_io::save_store(store, path).map_err(CliError::io)?;
        for record in pending.records {
            log.append(record).map_err(CliError::catalog)?;
        }
        info!(
            path = %path.display(),
            audit_records = log.appended(),
            audit_log = %log.path().display(),
            "catalog saved"
        );
        Ok(())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError::io(e.to_string()))?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", text).map_err(|e| CliError::io(e.to_string()))
}

fn print_text(text: &str) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .map_err(|e| CliError::io(e.to_string()))
}

// ============================================================================
// init
// ============================================================================

fn cmd_init(config: Option<&Path>) -> Result<(), CliError> {
    let path = config.map(Path::to_path_buf).unwrap_or_else(Settings::config_path);
    let created = Settings::create_default_file(&path).map_err(CliError::io)?;
    if created {
        println!("wrote {}", path.display());
    } else {
        println!("{} already exists", path.display());
    }
    Ok(())
}

// ============================================================================
// classify / overlaps / validate
// ============================================================================

fn cmd_classify(ctx: &Context) -> Result<(), CliError> {
    let entries = ctx.load_entries()?;
    let classified = classify(&entries);
    info!(
        total = classified.stats.total,
        active = classified.stats.active,
        org_wide = classified.stats.org_wide,
        "catalog classified"
    );
    if ctx.json {
        print_json(&classified)
    } else {
        print_text(&report::classified(&classified))
    }
}

fn cmd_overlaps(ctx: &Context) -> Result<(), CliError> {
    let entries = ctx.load_entries()?;
    let groups = detect_overlaps(&entries);
    info!(groups = groups.len(), "overlaps detected");
    if ctx.json {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Output<'a> {
            groups: &'a [appcat_catalog::OverlapGroup],
            estimated_savings: i64,
        }
        print_json(&Output {
            groups: &groups,
            estimated_savings: appcat_catalog::estimate_savings(&groups),
        })
    } else {
        print_text(&report::overlaps(&groups))
    }
}

fn cmd_validate(ctx: &Context, strict: bool) -> Result<(), CliError> {
    let issues = validate_rows(&ctx.load_rows()?);
    let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();
    let warnings = issues.len() - errors;
    info!(errors, warnings, "catalog validated");

    if ctx.json {
        print_json(&issues)?;
    } else {
        print_text(&report::issues(&issues))?;
    }

    if errors > 0 || (strict && warnings > 0) {
        let count = if strict { issues.len() } else { errors };
        return Err(CliError::row_issues(count, "catalog issue(s) found"));
    }
    Ok(())
}

// ============================================================================
// reconcile
// ============================================================================

fn cmd_reconcile(
    ctx: &Context,
    batch_path: &Path,
    mode: ImportMode,
    batch_sheet: Option<&str>,
    dry_run: bool,
) -> Result<(), CliError> {
    let catalog_path = ctx.catalog_path()?;
    let table = appcat_io::load_table(batch_path, batch_sheet).map_err(CliError::args)?;
    let batch = ImportBatch::new(table, mode);
    let options = ctx
        .settings
        .reconcile_options(chrono::Local::now().date_naive());

    if dry_run {
        let store = appcat_io::load_store(&catalog_path, ctx.settings.store.sheet.as_deref())
            .map_err(CliError::io)?;
        let prepared = prepare_batch(&batch, &options).map_err(CliError::catalog)?;
        let snapshot = store.snapshot().map_err(CliError::catalog)?;
        let plan = plan_reconcile(&prepared, batch.mode, &snapshot, &options);
        if ctx.json {
            print_json(&plan)?;
        } else {
            print_text(&report::plan(&batch, &plan))?;
        }
        if !plan.issues.is_empty() {
            return Err(CliError::row_issues(plan.issues.len(), "batch row(s) would be skipped"));
        }
        return Ok(());
    }

    let (mut store, original) = ctx.load_store_for_edit(&catalog_path)?;
    let mut log = ctx.open_audit()?;
    let mut pending = MemoryAudit::default();
    let summary = reconcile(&batch, &mut store, &mut pending, &options).map_err(CliError::catalog)?;

    if summary.added + summary.updated + summary.deactivated > 0 {
        ctx.commit(&store, &original, &catalog_path, pending, &mut log)?;
    }

    if ctx.json {
        print_json(&summary)?;
    } else {
        print_text(&report::summary(&summary))?;
    }

    if !summary.errors.is_empty() {
        return Err(CliError::row_issues(summary.errors.len(), "batch row(s) reported errors"));
    }
    if summary.remaining > 0 {
        warn!(remaining = summary.remaining, "write cap reached; run the same batch again to continue");
    }
    Ok(())
}

// ============================================================================
// enrich
// ============================================================================

fn cmd_enrich(ctx: &Context, limit: Option<usize>, fields: &[EnrichField]) -> Result<(), CliError> {
    let catalog_path = ctx.catalog_path()?;
    let endpoint = ctx.settings.completion_endpoint().map_err(CliError::catalog)?;

    let enrichment = &ctx.settings.enrichment;
    let lookup = keys::get_api_key(&enrichment.provider).map_err(CliError::catalog)?;
    if lookup.present {
        debug!(source = lookup.source.as_str(), "API key resolved");
    } else {
        warn!(
            provider = %lookup.provider,
            env = %lookup.env_var,
            "no API key found; calling endpoint without authorization"
        );
    }

    let client = HttpCompletionClient::new(
        endpoint,
        &enrichment.model,
        lookup.key,
        Duration::from_secs(enrichment.timeout_secs),
    )
    .map_err(|e| CliError { code: EXIT_SERVICE, message: e, hint: None })?;

    let mut options = ctx.settings.enrich_options();
    if let Some(limit) = limit {
        if limit == 0 {
            return Err(CliError::args("--limit must be at least 1"));
        }
        options.max_calls_per_run = limit;
    }
    if !fields.is_empty() {
        options.fields = fields.iter().copied().map(Field::from).collect();
    }

    let (mut store, original) = ctx.load_store_for_edit(&catalog_path)?;
    let mut log = ctx.open_audit()?;
    let mut pending = MemoryAudit::default();

    let summary = enrich_missing(&mut store, &client, &mut pending, &options).map_err(CliError::catalog)?;

    if summary.filled > 0 {
        ctx.commit(&store, &original, &catalog_path, pending, &mut log)?;
    }

    if ctx.json {
        print_json(&summary)?;
    } else {
        print_text(&report::enrichment(&summary))?;
    }

    if !summary.failed.is_empty() {
        return Err(CliError::row_issues(summary.failed.len(), "row(s) could not be enriched"));
    }
    Ok(())
}

// ============================================================================
// key
// ============================================================================

fn cmd_key(ctx: &Context, cmd: &KeyCommands) -> Result<(), CliError> {
    let default_provider = ctx.settings.enrichment.provider.as_str();
    let slot = |provider: &Option<String>| {
        ProviderKey::new(provider.as_deref().unwrap_or(default_provider)).map_err(CliError::catalog)
    };
    match cmd {
        KeyCommands::Set { provider } => {
            let slot = slot(provider)?;
            let mut key = String::new();
            io::stdin()
                .read_to_string(&mut key)
                .map_err(|e| CliError::io(e.to_string()))?;
            if key.trim().is_empty() {
                return Err(CliError::args("no key on stdin")
                    .with_hint(format!("echo $KEY | appcat key set {}", slot.provider())));
            }
            slot.store(&key).map_err(|e| CliError {
                code: EXIT_CONFIG,
                message: e,
                hint: Some(format!("set {} instead", slot.env_var())),
            })?;
            println!("stored key for {}", slot.provider());
            Ok(())
        }
        KeyCommands::Status { provider } => {
            let lookup = slot(provider)?.lookup();
            if ctx.json {
                print_json(&lookup)
            } else {
                print_text(&format!("{}\n", lookup.describe()))
            }
        }
        KeyCommands::Delete { provider } => {
            let slot = slot(provider)?;
            slot.delete()
                .map_err(|e| CliError { code: EXIT_CONFIG, message: e, hint: None })?;
            println!("deleted key for {}", slot.provider());
            Ok(())
        }
    }
}
