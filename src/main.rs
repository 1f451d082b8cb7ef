//! Monitorable - cloud resource and alarm coverage auditor
//!
//! Discovers resources across regions and services, correlates them with
//! monitoring alarms, and renders an audit, an inventory, or a monitoring
//! configuration.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Configuration or runtime error
//!   2 - Some items could not be collected and --fail-on-errors was set

mod analysis;
mod cli;
mod config;
mod models;
mod providers;
mod report;
mod scheduler;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::Args;
use config::{Config, ConfigError, CONFIG_FILE};
use models::ReportMetadata;
use providers::{AlarmProvider, InventorySnapshot, ServiceRegistry, SnapshotAlarmProvider};
use report::Report;
use scheduler::Scheduler;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config is read before logging so its verbose flag can apply
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, config.general.verbose);

    info!("Monitorable v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {:?}", config);

    match run_audit(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Audit failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .monitorable.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    eprintln!("Created {} with default settings.", CONFIG_FILE);
    Ok(())
}

/// Initialize logging on stderr; `RUST_LOG` overrides the verbosity flags.
fn init_logging(args: &Args, verbose_by_default: bool) {
    let level = if verbose_by_default && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete audit workflow. Returns exit code (0 or 2).
async fn run_audit(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    let snapshot = InventorySnapshot::new(config.inventory_dir());
    let available_regions = snapshot
        .regions()
        .with_context(|| format!("Failed to list regions in {}", snapshot.root().display()))?;
    let registry = ServiceRegistry::from_snapshot(&snapshot);

    let settings = match config.resolve(&available_regions, &registry) {
        Ok(settings) => settings,
        Err(e) => return Ok(config_error(e)),
    };
    info!(
        regions = settings.regions.len(),
        services = settings.services.len(),
        format = %settings.format,
        "Starting collection"
    );

    let alarms: Option<Arc<dyn AlarmProvider>> = if settings.format.needs_alarms() {
        Some(Arc::new(SnapshotAlarmProvider::new(snapshot.clone())))
    } else {
        None
    };

    let scheduler = Scheduler::new(settings.concurrency).with_progress(!args.quiet);
    let data = scheduler
        .run(&registry, alarms, &settings.regions, &settings.services)
        .await?;

    let view = match analysis::build_view(data.resources, settings.tags.as_ref()) {
        Ok(view) => view,
        Err(e) => return Ok(config_error(e)),
    };

    let report = Report {
        metadata: ReportMetadata {
            generated_at: Utc::now(),
            regions: settings.regions.clone(),
            services: settings.services.clone(),
            duration_seconds: start_time.elapsed().as_secs_f64(),
        },
        view,
        alarms: data.alarms,
        collection: data.collection,
    };

    let output = report::render(settings.format, &report)?;

    match settings.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            eprintln!("Report saved to: {}", path.display());
        }
        None => print!("{}", output),
    }

    let failures = report.collection.failures();
    if !failures.is_empty() {
        eprintln!(
            "{} of {} region/service combinations could not be collected:",
            failures.len(),
            report.collection.items.len()
        );
        for failure in &failures {
            eprintln!("  {}/{}: {}", failure.region, failure.service, failure.error);
        }

        if args.fail_on_errors {
            return Ok(2);
        }
    }

    Ok(0)
}

/// Report a configuration error and return the exit code for it.
fn config_error(e: ConfigError) -> i32 {
    error!("Invalid configuration: {}", e);
    eprintln!("Error: {}", e);
    1
}

/// Load configuration from `--config` or the default location.
///
/// Runs before logging is set up, so problems go straight to stderr.
fn load_config(args: &Args) -> Result<Config> {
    Config::load_or_default(args.config.as_deref(), Path::new(CONFIG_FILE))
}
