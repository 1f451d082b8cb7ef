//! Data models for the resource auditor.
//!
//! This module contains the records produced by service and alarm
//! providers, the unit of dispatch used by the scheduler, and the
//! per-item outcomes recorded during collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A single cloud resource discovered by a service provider in one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Identifier of the service that produced the record (e.g. `ec2`).
    pub service: String,
    /// Region the resource lives in.
    pub region: String,
    /// Provider-assigned identifier.
    pub id: String,
    /// Human-readable name, when the service exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tags attached to the resource.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Service-specific fields, opaque to the auditor.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl ResourceRecord {
    /// Creates a record with no name, tags or metadata.
    pub fn new(service: &str, region: &str, id: &str) -> Self {
        Self {
            service: service.to_string(),
            region: region.to_string(),
            id: id.to_string(),
            name: None,
            tags: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a tag, replacing any previous value under the same key.
    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    /// Returns the value of a tag, if present.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Name if known, identifier otherwise.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// State reported by an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmState {
    Ok,
    Alarm,
    InsufficientData,
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmState::Ok => write!(f, "OK"),
            AlarmState::Alarm => write!(f, "ALARM"),
            AlarmState::InsufficientData => write!(f, "INSUFFICIENT_DATA"),
        }
    }
}

/// A monitoring alarm fetched for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRecord {
    /// Region the alarm was fetched from.
    pub region: String,
    /// Alarm name.
    pub name: String,
    /// Identifier of the monitored resource, when it can be determined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Current alarm state.
    pub state: AlarmState,
    /// Kind of alarm, usually the metric it watches.
    #[serde(rename = "type")]
    pub alarm_type: String,
}

/// One unit of dispatch: discover a single service in a single region.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub region: String,
    pub service: String,
}

impl WorkItem {
    pub fn new(region: &str, service: &str) -> Self {
        Self {
            region: region.to_string(),
            service: service.to_string(),
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.service)
    }
}

/// What happened to a dispatched work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    /// The provider returned this many resources (possibly zero).
    Collected(usize),
    /// The provider call failed; nothing was contributed.
    Failed(String),
}

/// What happened to one region's alarm fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionAlarmOutcome {
    /// Alarms were fetched; this many were returned.
    Checked(usize),
    /// The alarm fetch failed, coverage in this region is unknown.
    Failed(String),
}

/// A work item that could not be collected, with the reported error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub region: String,
    pub service: String,
    pub error: String,
}

/// Per-item outcomes of the resource collection phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionReport {
    /// Outcome of every dispatched work item.
    pub items: BTreeMap<WorkItem, ItemOutcome>,
}

impl CollectionReport {
    /// Work items whose provider call failed.
    pub fn failures(&self) -> Vec<ItemFailure> {
        self.items
            .iter()
            .filter_map(|(item, outcome)| match outcome {
                ItemOutcome::Failed(error) => Some(ItemFailure {
                    region: item.region.clone(),
                    service: item.service.clone(),
                    error: error.clone(),
                }),
                ItemOutcome::Collected(_) => None,
            })
            .collect()
    }

    /// Number of work items that completed successfully.
    pub fn collected_count(&self) -> usize {
        self.items
            .values()
            .filter(|o| matches!(o, ItemOutcome::Collected(_)))
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.items
            .values()
            .any(|o| matches!(o, ItemOutcome::Failed(_)))
    }
}

/// Metadata about a rendered report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Date and time the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Regions that were queried.
    pub regions: Vec<String>,
    /// Services that were queried.
    pub services: Vec<String>,
    /// Duration of the collection in seconds.
    pub duration_seconds: f64,
}
