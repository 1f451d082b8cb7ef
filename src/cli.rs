//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;

/// Monitorable - audit cloud resources and their alarm coverage
///
/// Discovers resources across regions and services, checks which of them
/// are covered by monitoring alarms, and renders the findings.
///
/// Examples:
///   monitorable --inventory ./inventory
///   monitorable --regions us-east-1,ap-southeast-2 --skip sqs
///   monitorable --tag env --filter prod --format cfn-guardian -o guardian.yaml
///   monitorable --format tags
///   monitorable --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Output format
    ///
    /// Defaults to the config file value, or audit.
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .monitorable.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write the output to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Regions to query (comma-separated)
    ///
    /// Example: --regions us-east-1,ap-southeast-2
    #[arg(long, value_name = "REGIONS", value_delimiter = ',')]
    pub regions: Option<Vec<String>>,

    /// Services to skip (comma-separated)
    ///
    /// Example: --skip sqs,lambda
    #[arg(long, value_name = "SERVICES", value_delimiter = ',')]
    pub skip: Option<Vec<String>>,

    /// Tag key to group resources by
    #[arg(long, value_name = "KEY")]
    pub tag: Option<String>,

    /// Tag value to limit resources to (requires a grouping tag)
    #[arg(long, value_name = "VALUE")]
    pub filter: Option<String>,

    /// Inventory directory to audit
    #[arg(long, value_name = "DIR", env = "MONITORABLE_INVENTORY")]
    pub inventory: Option<PathBuf>,

    /// Number of concurrent provider calls
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Exit with code 2 if any region or service could not be collected
    #[arg(long)]
    pub fail_on_errors: bool,

    /// Generate a default .monitorable.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Resource listing with alarm coverage (default)
    #[default]
    Audit,
    /// JSON resource inventory
    Json,
    /// YAML resource inventory
    Yaml,
    /// Tag keys and values in use
    Tags,
    /// cfn-monitor configuration
    CfnMonitor,
    /// cfn-guardian configuration
    CfnGuardian,
}

impl OutputFormat {
    /// Name as accepted on the command line and in config files.
    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Audit => "audit",
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
            OutputFormat::Tags => "tags",
            OutputFormat::CfnMonitor => "cfn-monitor",
            OutputFormat::CfnGuardian => "cfn-guardian",
        }
    }

    /// Every supported format name.
    pub fn names() -> Vec<&'static str> {
        Self::value_variants().iter().map(|f| f.name()).collect()
    }

    /// Parses a format name, case-sensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::value_variants()
            .iter()
            .copied()
            .find(|f| f.name() == name)
    }

    /// Only the audit format needs alarm coverage.
    pub fn needs_alarms(&self) -> bool {
        matches!(self, OutputFormat::Audit)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.tag.as_deref() == Some("") {
            return Err("Tag key must not be empty".to_string());
        }

        if let Some(ref regions) = self.regions {
            if regions.iter().any(|r| r.trim().is_empty()) {
                return Err("Region names must not be empty".to_string());
            }
        }

        if let Some(ref inventory) = self.inventory {
            if inventory.exists() && !inventory.is_dir() {
                return Err(format!(
                    "Inventory path is not a directory: {}",
                    inventory.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
