//! Configuration file handling.
//!
//! This module handles loading `.monitorable.toml`, merging it with CLI
//! arguments, and resolving the result into validated [`Settings`].

use crate::analysis::TagSelection;
use crate::cli::OutputFormat;
use crate::providers::ServiceRegistry;
use crate::scheduler::DEFAULT_CONCURRENCY;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".monitorable.toml";

/// Invalid configuration, detected before any collection starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A region, service or format name that is not supported.
    #[error("{provided} is not a valid {kind}\nvalid {kind}s: {supported}")]
    Invalid {
        kind: &'static str,
        provided: String,
        supported: String,
    },

    #[error("A tag filter requires a tag to group by (--tag)")]
    FilterWithoutGroup,

    #[error("Tag key must not be empty")]
    EmptyTagKey,

    #[error("No {0} selected")]
    EmptySelection(&'static str),

    #[error("Concurrency must be at least 1")]
    ZeroConcurrency,
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Region and service selection.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Tag grouping and filtering.
    #[serde(default)]
    pub tags: TagConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Output format name.
    #[serde(default = "default_format")]
    pub format: String,

    /// Output file path; stdout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Inventory directory to audit.
    #[serde(default = "default_inventory")]
    pub inventory: String,

    /// Number of concurrent provider calls.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            output: None,
            inventory: default_inventory(),
            concurrency: default_concurrency(),
            verbose: false,
        }
    }
}

fn default_format() -> String {
    OutputFormat::default().name().to_string()
}

fn default_inventory() -> String {
    "inventory".to_string()
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

/// Region and service selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Regions to query; every available region when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,

    /// Services to skip.
    #[serde(default)]
    pub skip: Vec<String>,
}

/// Tag grouping settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagConfig {
    /// Tag key to group resources by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Tag value to keep; requires `group`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Fully validated run settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub format: OutputFormat,
    pub regions: Vec<String>,
    /// Registered services minus the skipped ones.
    pub services: Vec<String>,
    pub concurrency: usize,
    pub tags: Option<TagSelection>,
    pub output: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Loads `explicit` if given, otherwise `default_path` if it exists,
    /// otherwise the built-in defaults.
    ///
    /// A config file that exists but cannot be read or parsed is always an
    /// error.
    pub fn load_or_default(explicit: Option<&Path>, default_path: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if default_path.exists() {
            Self::load(default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(format) = args.format {
            self.general.format = format.name().to_string();
        }
        if let Some(ref output) = args.output {
            self.general.output = Some(output.display().to_string());
        }
        if let Some(ref inventory) = args.inventory {
            self.general.inventory = inventory.display().to_string();
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }

        if let Some(ref regions) = args.regions {
            self.scan.regions = Some(regions.clone());
        }
        if let Some(ref skip) = args.skip {
            self.scan.skip = skip.clone();
        }

        if let Some(ref tag) = args.tag {
            self.tags.group = Some(tag.clone());
        }
        if let Some(ref filter) = args.filter {
            self.tags.filter = Some(filter.clone());
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Inventory directory to audit.
    pub fn inventory_dir(&self) -> PathBuf {
        PathBuf::from(&self.general.inventory)
    }

    /// Validates the merged configuration against the available regions
    /// and registered services.
    pub fn resolve(
        &self,
        available_regions: &[String],
        registry: &ServiceRegistry,
    ) -> Result<Settings, ConfigError> {
        let format = OutputFormat::from_name(&self.general.format).ok_or_else(|| {
            ConfigError::Invalid {
                kind: "format",
                provided: self.general.format.clone(),
                supported: format!("{:?}", OutputFormat::names()),
            }
        })?;

        if self.general.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        let regions = match self.scan.regions {
            Some(ref requested) => {
                check_all_supported("region", requested, available_regions)?;
                requested.clone()
            }
            None => available_regions.to_vec(),
        };
        if regions.is_empty() {
            return Err(ConfigError::EmptySelection("regions"));
        }

        let supported_services = registry.names();
        check_all_supported("service", &self.scan.skip, &supported_services)?;

        let services: Vec<String> = supported_services
            .into_iter()
            .filter(|s| !self.scan.skip.contains(s))
            .collect();
        if services.is_empty() {
            return Err(ConfigError::EmptySelection("services"));
        }

        let tags = TagSelection::new(self.tags.group.as_deref(), self.tags.filter.as_deref())?;

        Ok(Settings {
            format,
            regions,
            services,
            concurrency: self.general.concurrency,
            tags,
            output: self.general.output.as_ref().map(PathBuf::from),
        })
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

/// Fails on the first value not present in `supported`.
fn check_all_supported(
    kind: &'static str,
    values: &[String],
    supported: &[String],
) -> Result<(), ConfigError> {
    match values.iter().find(|v| !supported.contains(v)) {
        Some(invalid) => Err(ConfigError::Invalid {
            kind,
            provided: invalid.clone(),
            supported: format!("{:?}", supported),
        }),
        None => Ok(()),
    }
}
