//! CLI command definitions, routing, and tracing setup.

use std::future::Future;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use cloudmouse_core::export::DEFAULT_EXPORT_DIR;
use cloudmouse_core::{
    ExportOptions, ImportOptions, ImportReport, ProgressReporter, convert_dir, convert_file,
    export_from_db, import_clean_dir, sanitize_dir,
};
use cloudmouse_provisioning::{
    DEFAULT_ESPTOOL, ProvisionObserver, ProvisionOptions, SerialTiming, Stage, current_batch,
    provision, resolve_firmware_path, validate_args,
};
use cloudmouse_shared::{Catalog, ExportSettings, load_catalog, load_credentials};
use cloudmouse_storage::{Database, Registration};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// CloudMouse tools: SDK documentation pipeline and device provisioning.
#[derive(Parser)]
#[command(
    name = "cloudmouse",
    version,
    about = "Publish CloudMouse SDK reference docs and provision devices.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Clean generated reference pages into CMS-ready HTML.
    Sanitize {
        /// Generator output directory.
        input_dir: PathBuf,

        /// Directory for the cleaned pages and index.
        output_dir: PathBuf,

        /// Catalog TOML replacing the built-in component table.
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Load cleaned pages into the CMS.
    Import {
        /// Output of `cloudmouse sanitize`.
        #[arg(long)]
        clean_dir: PathBuf,

        /// Run everything, then roll back.
        #[arg(long)]
        dry_run: bool,

        /// Credentials JSON (defaults to ~/.cloudmouse/config.json).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Catalog TOML replacing the built-in component table.
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Connection URL overriding the credentials file. A `sqlite:` URL
        /// targets a local sandbox database.
        #[arg(long, env = "CLOUDMOUSE_DATABASE_URL")]
        database_url: Option<String>,
    },

    /// Export CMS pages, or local HTML files, to Markdown.
    ///
    /// `--export-db [output_dir]` reads the CMS; otherwise pass an input
    /// file and output file, or an input and output directory.
    Export {
        /// Export pages from the CMS database.
        #[arg(long)]
        export_db: bool,

        /// Category to export from the CMS.
        #[arg(long, default_value = cloudmouse_core::export::DEFAULT_EXPORT_CATEGORY)]
        category: String,

        /// Paths: `[output_dir]` with `--export-db`, else `<input> <output>`.
        #[arg(num_args = 0..=2)]
        paths: Vec<PathBuf>,
    },

    /// Flash a device and register it in the production database.
    Provision {
        /// Serial port (e.g. /dev/ttyUSB0 or COM3).
        #[arg(long)]
        port: Option<String>,

        /// Firmware binary to flash.
        #[arg(long = "bin", alias = "firmware")]
        firmware: Option<String>,

        /// Only register; do not flash.
        #[arg(long)]
        skip_flash: bool,

        /// Only print production counts.
        #[arg(long)]
        stats: bool,

        /// Credentials JSON (defaults to ~/.cloudmouse/config.json).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Flasher command.
        #[arg(long, default_value = DEFAULT_ESPTOOL)]
        esptool: String,

        /// Connection URL overriding the credentials file.
        #[arg(long, env = "CLOUDMOUSE_DATABASE_URL")]
        database_url: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "cloudmouse=info",
        1 => "cloudmouse=debug",
        _ => "cloudmouse=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
    match cli.command {
        Command::Sanitize {
            input_dir,
            output_dir,
            catalog,
        } => cmd_sanitize(&input_dir, &output_dir, catalog.as_deref()),
        Command::Import {
            clean_dir,
            dry_run,
            config,
            catalog,
            database_url,
        } => {
            cmd_import(
                clean_dir,
                dry_run,
                config.as_deref(),
                catalog.as_deref(),
                database_url,
            )
            .await
        }
        Command::Export {
            export_db,
            category,
            paths,
        } => cmd_export(export_db, category, &paths).await,
        Command::Provision {
            port,
            firmware,
            skip_flash,
            stats,
            config,
            esptool,
            database_url,
        } => {
            validate_args(port.as_deref(), firmware.as_deref(), skip_flash, stats)?;
            let db_url = resolve_database_url(database_url, config.as_deref())?;
            if stats {
                cmd_stats(&db_url).await
            } else {
                let firmware = match firmware.as_deref() {
                    Some(raw) if !skip_flash => Some(resolve_firmware_path(raw)?),
                    _ => None,
                };
                let operator = load_credentials(config.as_deref())?.operator()?.to_string();
                let opts = ProvisionOptions {
                    port: port.unwrap_or_default(),
                    firmware,
                    esptool,
                    operator,
                    serial: SerialTiming::default(),
                };
                cmd_provision(&db_url, &opts).await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_sanitize(input_dir: &Path, output_dir: &Path, catalog: Option<&Path>) -> Result<()> {
    let catalog = load_catalog(catalog)?;
    info!(input = %input_dir.display(), output = %output_dir.display(), "sanitizing");

    let reporter = CliProgress::new();
    let report = sanitize_dir(input_dir, output_dir, &catalog, &reporter)?;

    println!();
    println!("  Sanitize complete");
    println!("  Written:   {}", report.written.len());
    println!("  Missing:   {}", report.missing.len());
    println!("  Empty:     {}", report.empty.len());
    println!("  Unmapped:  {}", report.unmapped.len());
    println!("  Output:    {}", output_dir.display());
    println!();
    Ok(())
}

async fn cmd_import(
    clean_dir: PathBuf,
    dry_run: bool,
    config: Option<&Path>,
    catalog: Option<&Path>,
    database_url: Option<String>,
) -> Result<()> {
    let catalog = load_catalog(catalog)?;
    let url = resolve_database_url(database_url, config)?;
    let db = open_database(&url, Some(&catalog)).await?;

    let opts = ImportOptions { clean_dir, dry_run };
    let reporter = CliProgress::new();
    let result = interruptible(import_clean_dir(&db, &catalog, &opts, &reporter)).await;
    reporter.clear();
    db.close().await;

    print_import_report(&result?);
    Ok(())
}

fn print_import_report(report: &ImportReport) {
    println!();
    if report.dry_run {
        println!("  Dry run: nothing was written");
    } else {
        println!("  Import complete");
    }
    println!(
        "  Categories: {} created, {} updated",
        report.categories_created, report.categories_updated
    );
    println!(
        "  Pages:      {} created, {} updated",
        report.pages_created, report.pages_updated
    );
    println!(
        "  Links:      {} rewritten in {} pages, {} unmapped",
        report.links.links_rewritten, report.links.pages_updated, report.links.misses
    );
    if !report.skipped.is_empty() {
        println!("  Skipped:    {}", report.skipped.join(", "));
    }
    if !report.failures.is_empty() {
        println!("  Failures:");
        for failure in &report.failures {
            println!("    - {failure}");
        }
    }
    println!();
}

async fn cmd_export(export_db: bool, category: String, paths: &[PathBuf]) -> Result<()> {
    let reporter = CliProgress::new();

    if export_db {
        if paths.len() > 1 {
            return Err(eyre!("--export-db takes at most one output directory"));
        }
        if dotenvy::dotenv().is_ok() {
            info!("loaded .env");
        }
        let settings = ExportSettings::from_env();
        settings.validate()?;

        let db = open_database(&settings.database_url()?, None).await?;
        let opts = ExportOptions {
            output_dir: paths
                .first()
                .cloned()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_DIR)),
            category,
            service_host: settings.service_host,
        };
        let result = interruptible(export_from_db(&db, &opts, &reporter)).await;
        db.close().await;
        let report = result?;

        println!();
        println!("  Exported {} pages to {}", report.written.len(), opts.output_dir.display());
        println!();
        return Ok(());
    }

    let [input, output] = paths else {
        return Err(eyre!(
            "expected <input.html> <output.md> or <input_dir> <output_dir> (or use --export-db)"
        ));
    };

    if input.is_dir() {
        let report = convert_dir(input, output, &reporter)?;
        println!();
        println!("  Converted {} files into {}", report.written.len(), output.display());
        println!();
    } else if input.is_file() {
        convert_file(input, output)?;
        reporter.clear();
        println!("  Converted {} -> {}", input.display(), output.display());
    } else {
        return Err(eyre!("input not found: {}", input.display()));
    }
    Ok(())
}

async fn cmd_stats(db_url: &str) -> Result<()> {
    let db = open_database(db_url, None).await?;
    let batch = current_batch();
    let counts = db.device_counts(&batch).await;
    db.close().await;
    let counts = counts?;

    println!();
    println!("  Total devices:             {}", counts.total);
    println!("  Current batch ({batch}): {}", counts.batch);
    println!();
    Ok(())
}

async fn cmd_provision(db_url: &str, opts: &ProvisionOptions) -> Result<()> {
    println!();
    println!("  CloudMouse Provisioning v{}", env!("CARGO_PKG_VERSION"));
    println!("  Operator: {}", opts.operator);
    println!("  Port:     {}", opts.port);
    match &opts.firmware {
        Some(path) => println!("  Firmware: {}", path.display()),
        None => println!("  Firmware: N/A (skip flash)"),
    }
    println!();

    let db = open_database(db_url, None).await?;
    let observer = CliProvision::new();
    let result = interruptible(provision(&db, opts, &observer)).await;
    observer.clear();
    db.close().await;
    let report = result?;

    let db_id = match report.registration {
        Registration::Inserted(id) => id.to_string(),
        Registration::AlreadyRegistered => {
            warn!(uuid = %report.device.uuid, "device already in database");
            "Already registered".to_string()
        }
    };

    println!();
    println!("  Device ready for packaging");
    println!("  UUID:       {}", report.device.uuid);
    println!("  Device ID:  {}", report.device.device_id);
    println!("  MAC:        {}", report.device.mac_address);
    println!("  DB ID:      {db_id}");
    println!();
    println!("  Total devices:             {}", report.counts.total);
    println!("  Current batch ({}): {}", report.batch, report.counts.batch);
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Explicit URL first, then the credentials file.
fn resolve_database_url(explicit: Option<String>, config: Option<&Path>) -> Result<String> {
    match explicit.filter(|u| !u.is_empty()) {
        Some(url) => Ok(url),
        None => Ok(load_credentials(config)?.database_url()?),
    }
}

/// Connect; a sandbox database also gets the schema and, for imports, the
/// root category the CMS would already have.
async fn open_database(url: &str, catalog: Option<&Catalog>) -> Result<Database> {
    let db = Database::connect(url).await?;
    if Database::is_sandbox_url(url) {
        db.apply_sandbox_schema().await?;
        if let Some(catalog) = catalog {
            let cms = &catalog.cms;
            db.seed_root_category(&cms.root_category, &cms.root_category.to_lowercase(), &cms.language)
                .await?;
        }
        info!("using sandbox database");
    }
    Ok(db)
}

/// Run `fut` until it finishes or Ctrl-C arrives. Dropping the future
/// rolls back any open transaction and closes the serial port.
async fn interruptible<T>(fut: impl Future<Output = cloudmouse_shared::Result<T>>) -> Result<T> {
    tokio::select! {
        result = fut => Ok(result?),
        _ = tokio::signal::ctrl_c() => Err(eyre!("interrupted by user")),
    }
}

// ---------------------------------------------------------------------------
// Progress display
// ---------------------------------------------------------------------------

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Pipeline progress on an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self { spinner: spinner() }
    }

    fn clear(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_done(&self, name: &str, current: usize, total: usize) {
        self.spinner.set_message(format!("[{current}/{total}] {name}"));
    }

    fn done(&self, _summary: &str) {
        self.spinner.finish_and_clear();
    }
}

/// Stage spinner that turns into a percentage bar while flashing.
struct CliProvision {
    bar: ProgressBar,
    interactive: bool,
}

impl CliProvision {
    fn new() -> Self {
        Self {
            bar: spinner(),
            interactive: std::io::stderr().is_terminal(),
        }
    }

    fn clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProvisionObserver for CliProvision {
    fn stage(&self, stage: Stage) {
        if self.bar.length().is_some() {
            self.bar.set_style(spinner_style());
            self.bar.unset_length();
        }
        info!(stage = %stage, "provisioning");
        self.bar.set_message(stage.to_string());
    }

    fn flash_progress(&self, percent: u8) {
        if self.bar.length().is_none() {
            self.bar.set_style(
                ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos:>3}%")
                    .unwrap()
                    .progress_chars("=> "),
            );
            self.bar.set_length(100);
        }
        self.bar.set_position(u64::from(percent));
    }

    fn wants_flash_progress(&self) -> bool {
        self.interactive
    }
}
