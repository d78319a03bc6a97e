//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use attachport_core::{BatchProgress, BatchSummary, Importer, pending_units, run_batch};
use attachport_remote::UploadDir;
use attachport_shared::{
    AppConfig, AttachportError, IdRange, ImportConfig, ImportOutcome, ImportReport, ImportTracker,
    UnitId, init_config, init_config_at, load_config, load_config_from,
};
use attachport_storage::Storage;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// attachport: bring remotely hosted post media home.
#[derive(Parser)]
#[command(
    name = "attachport",
    version,
    about = "Import remotely hosted images and documents referenced by posts into local uploads.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.attachport/attachport.toml.
    #[arg(long, global = true, env = "ATTACHPORT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Import attachments for one post, or for every unprocessed post in a range.
    Import {
        /// Import this post only (even if already processed).
        #[arg(long, conflicts_with_all = ["min", "max"])]
        id: Option<i64>,

        /// Lowest post id to include.
        #[arg(long)]
        min: Option<i64>,

        /// Highest post id to include.
        #[arg(long)]
        max: Option<i64>,

        /// Allowed source host (repeatable). Replaces the configured list.
        #[arg(long = "domain", value_name = "HOST")]
        domains: Vec<String>,

        /// Posts imported in parallel.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print reports as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Load content units from a JSON export into the database.
    Seed {
        /// JSON file containing an array of content units.
        file: PathBuf,
    },

    /// Show import progress.
    Status {
        /// Print counts as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Forget which posts have been processed.
    Reset,

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "attachport=info",
        1 => "attachport=debug",
        _ => "attachport=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Import {
            id,
            min,
            max,
            domains,
            concurrency,
            json,
        } => {
            let selection = match id {
                Some(id) => Selection::One(UnitId(id)),
                None => Selection::Pending(IdRange {
                    min: min.map(UnitId),
                    max: max.map(UnitId),
                }),
            };
            cmd_import(config_path, selection, domains, concurrency, json).await
        }
        Command::Seed { file } => cmd_seed(config_path, &file).await,
        Command::Status { json } => cmd_status(config_path, json).await,
        Command::Reset => cmd_reset(config_path).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn load_app_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let db_path = config.storage.database_path()?;
    let storage = Storage::open(&db_path)
        .await
        .wrap_err_with(|| format!("failed to open database at {}", db_path.display()))?;
    Ok(Arc::new(storage))
}

// ---------------------------------------------------------------------------
// import
// ---------------------------------------------------------------------------

enum Selection {
    One(UnitId),
    Pending(IdRange),
}

async fn cmd_import(
    config_path: Option<&Path>,
    selection: Selection,
    domains: Vec<String>,
    concurrency: Option<usize>,
    json: bool,
) -> Result<()> {
    let config = load_app_config(config_path)?;

    let mut import_config = ImportConfig::from(&config);
    if !domains.is_empty() {
        import_config = import_config.with_domains(domains);
    }
    if let Some(n) = concurrency {
        import_config = import_config.with_concurrency(n);
    }
    if import_config.allow_list.is_empty() {
        info!("no domain allow-list configured, every host is accepted");
    }

    let storage = open_storage(&config).await?;
    let uploads = UploadDir::new(
        config.storage.uploads_path()?,
        config.storage.uploads_url.as_str(),
    );
    let importer = Arc::new(Importer::new(
        import_config,
        uploads,
        storage.clone(),
        storage.clone(),
        storage.clone(),
    )?);

    match selection {
        Selection::One(id) => {
            let report = importer.import_unit(id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Selection::Pending(range) => {
            let ids = pending_units(storage.as_ref(), storage.as_ref(), range).await?;
            if ids.is_empty() {
                println!("Nothing to import: every post in range has been processed.");
                return Ok(());
            }

            let progress: Arc<dyn BatchProgress> = if json {
                Arc::new(attachport_core::SilentProgress)
            } else {
                Arc::new(CliProgress::new())
            };
            let summary = run_batch(importer, ids, progress).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
            if !summary.failures.is_empty() {
                return Err(eyre!(
                    "{} post(s) could not be imported",
                    summary.failures.len()
                ));
            }
        }
    }
    Ok(())
}

fn print_report(report: &ImportReport) {
    println!();
    println!("  Post {}", report.unit_id);
    if report.is_empty() {
        println!("    no remote media found");
    }
    for (url, outcome) in &report.outcomes {
        match outcome {
            ImportOutcome::Imported { local_url, .. } => println!("    ✓ {url} → {local_url}"),
            ImportOutcome::Ineligible(reason) => println!("    - {url}: {reason}"),
            ImportOutcome::Failed(failure) => println!("    ✗ {url}: {failure}"),
        }
    }
}

fn print_summary(summary: &BatchSummary) {
    for report in summary.reports.iter().filter(|r| !r.is_empty()) {
        print_report(report);
    }
    for failure in &summary.failures {
        println!();
        println!("  Post {}: {}", failure.unit_id, failure.message);
    }

    println!();
    println!("  Import finished");
    println!("  Run:         {}", summary.run_id);
    println!("  Posts:       {}", summary.units_processed());
    println!("  Imported:    {}", summary.attachments_imported());
    println!("  Ineligible:  {}", summary.candidates_ineligible());
    println!("  Failed:      {}", summary.candidates_failed());
    println!(
        "  Duration:    {:.1}s",
        summary.elapsed.as_secs_f64()
    );
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Batch progress bar.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        bar.set_style(style);
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }
}

impl BatchProgress for CliProgress {
    fn started(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_message("importing");
    }

    fn unit_done(&self, report: &ImportReport) {
        self.bar.inc(1);
        self.bar.set_message(format!(
            "post {} ({} imported)",
            report.unit_id,
            report.imported_count()
        ));
    }

    fn unit_failed(&self, id: UnitId, error: &AttachportError) {
        self.bar.inc(1);
        self.bar.println(format!("  post {id}: {error}"));
    }

    fn finished(&self, _summary: &BatchSummary) {
        self.bar.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// seed / status / reset
// ---------------------------------------------------------------------------

async fn cmd_seed(config_path: Option<&Path>, file: &Path) -> Result<()> {
    let config = load_app_config(config_path)?;
    let json = std::fs::read_to_string(file)
        .wrap_err_with(|| format!("failed to read {}", file.display()))?;

    let storage = open_storage(&config).await?;
    let count = storage.import_units_json(&json).await?;
    println!(
        "Seeded {count} content unit(s) into {}",
        config.storage.database_path()?.display()
    );
    Ok(())
}

async fn cmd_status(config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = load_app_config(config_path)?;
    let storage = Storage::open_readonly(&config.storage.database_path()?).await?;
    let progress = storage.progress().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&progress)?);
        return Ok(());
    }

    println!();
    println!("  Posts:       {}", progress.posts);
    println!("  Processed:   {}", progress.processed);
    println!("  Pending:     {}", progress.pending());
    println!("  Attachments: {}", progress.attachments);
    println!();
    Ok(())
}

async fn cmd_reset(config_path: Option<&Path>) -> Result<()> {
    let config = load_app_config(config_path)?;
    let storage = open_storage(&config).await?;
    let removed = storage.reset_all().await?;
    println!("Cleared {removed} import marker(s).");
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => {
            init_config_at(path)?;
            path.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load_app_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
