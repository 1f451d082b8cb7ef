//! Providers backed by an exported inventory directory.
//!
//! Layout:
//!
//! ```text
//! <root>/<region>/<service>.json   array of resource objects
//! <root>/<region>/alarms.json      array of alarm objects
//! ```
//!
//! Each region is a subdirectory of the root. A missing service file means
//! the service has no resources in that region; a missing region directory
//! or a malformed file is an error.

use super::{AlarmProvider, ProviderError, ServiceProvider};
use crate::models::{AlarmRecord, AlarmState, ResourceRecord};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Alarm dimensions that identify the monitored resource, in lookup order.
const TARGET_DIMENSIONS: &[&str] = &[
    "InstanceId",
    "DBInstanceIdentifier",
    "FunctionName",
    "QueueName",
    "TableName",
    "LoadBalancerName",
    "LoadBalancer",
    "TargetGroup",
    "AutoScalingGroupName",
    "CacheClusterId",
    "ReplicationGroupId",
    "ClusterIdentifier",
    "ClusterName",
    "DistributionId",
    "ApiName",
];

const ALARMS_FILE: &str = "alarms.json";

/// Handle on an inventory directory.
#[derive(Debug, Clone)]
pub struct InventorySnapshot {
    root: PathBuf,
}

impl InventorySnapshot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Regions present in the inventory, sorted.
    pub fn regions(&self) -> Result<Vec<String>, ProviderError> {
        let entries = fs::read_dir(&self.root).map_err(|source| ProviderError::Io {
            path: self.root.display().to_string(),
            source,
        })?;

        self.region_names(entries.map(|entry| entry.map(|e| e.path())))
    }

    /// Names of the visible subdirectories among `paths`, sorted. An entry
    /// that cannot be read fails the whole listing.
    fn region_names(
        &self,
        paths: impl IntoIterator<Item = std::io::Result<PathBuf>>,
    ) -> Result<Vec<String>, ProviderError> {
        let mut regions = Vec::new();

        for path in paths {
            let path = path.map_err(|source| ProviderError::Io {
                path: self.root.display().to_string(),
                source,
            })?;
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) {
                if !name.starts_with('.') {
                    regions.push(name);
                }
            }
        }

        regions.sort();
        Ok(regions)
    }

    fn region_dir(&self, region: &str) -> Result<PathBuf, ProviderError> {
        let dir = self.root.join(region);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(ProviderError::RegionUnavailable(region.to_string()))
        }
    }

    /// Reads a JSON array file; `Ok(None)` when the file does not exist.
    fn read_array<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<Vec<T>>, ProviderError> {
        if !path.exists() {
            debug!("No inventory file at {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|source| ProviderError::Io {
            path: path.display().to_string(),
            source,
        })?;

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| ProviderError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }
}

/// Tags as exported: either a plain map or a list of `Key`/`Value` pairs.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTags {
    Map(BTreeMap<String, String>),
    List(Vec<RawTag>),
}

#[derive(Debug, Deserialize)]
struct RawTag {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value", default)]
    value: String,
}

impl RawTags {
    fn into_map(self) -> BTreeMap<String, String> {
        match self {
            RawTags::Map(map) => map,
            RawTags::List(list) => list.into_iter().map(|t| (t.key, t.value)).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawResource {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tags: Option<RawTags>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawAlarm {
    name: String,
    state: AlarmState,
    #[serde(default)]
    metric: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    dimensions: BTreeMap<String, String>,
    #[serde(default)]
    target: Option<String>,
}

impl RawAlarm {
    fn into_record(self, region: &str) -> AlarmRecord {
        let target = self.target.or_else(|| target_from_dimensions(&self.dimensions));
        let alarm_type = self
            .metric
            .or(self.namespace)
            .unwrap_or_else(|| "unknown".to_string());

        AlarmRecord {
            region: region.to_string(),
            name: self.name,
            target,
            state: self.state,
            alarm_type,
        }
    }
}

/// Picks the monitored resource identifier out of an alarm's dimensions.
pub fn target_from_dimensions(dimensions: &BTreeMap<String, String>) -> Option<String> {
    TARGET_DIMENSIONS
        .iter()
        .find_map(|key| dimensions.get(*key))
        .cloned()
}

/// Service provider reading `<region>/<service>.json`.
#[derive(Debug, Clone)]
pub struct SnapshotServiceProvider {
    snapshot: InventorySnapshot,
    service: String,
}

impl SnapshotServiceProvider {
    pub fn new(snapshot: InventorySnapshot, service: &str) -> Self {
        Self {
            snapshot,
            service: service.to_string(),
        }
    }
}

impl ServiceProvider for SnapshotServiceProvider {
    fn service(&self) -> &str {
        &self.service
    }

    fn discover(&self, region: &str) -> Result<Vec<ResourceRecord>, ProviderError> {
        let path = self
            .snapshot
            .region_dir(region)?
            .join(format!("{}.json", self.service));

        let raw: Vec<RawResource> = self.snapshot.read_array(&path)?.unwrap_or_default();

        Ok(raw
            .into_iter()
            .map(|r| ResourceRecord {
                service: self.service.clone(),
                region: region.to_string(),
                id: r.id,
                name: r.name,
                tags: r.tags.map(RawTags::into_map).unwrap_or_default(),
                metadata: r.extra,
            })
            .collect())
    }
}

/// Alarm provider reading `<region>/alarms.json`.
#[derive(Debug, Clone)]
pub struct SnapshotAlarmProvider {
    snapshot: InventorySnapshot,
}

impl SnapshotAlarmProvider {
    pub fn new(snapshot: InventorySnapshot) -> Self {
        Self { snapshot }
    }
}

impl AlarmProvider for SnapshotAlarmProvider {
    fn fetch_alarms(&self, region: &str) -> Result<Vec<AlarmRecord>, ProviderError> {
        let path = self.snapshot.region_dir(region)?.join(ALARMS_FILE);
        let raw: Vec<RawAlarm> = self.snapshot.read_array(&path)?.unwrap_or_default();

        Ok(raw.into_iter().map(|a| a.into_record(region)).collect())
    }
}
