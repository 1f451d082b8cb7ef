//! Resource and alarm providers.
//!
//! A provider answers one question for one region: which resources does
//! this service have, or which alarms exist. Calls are blocking and may be
//! made concurrently for different regions and services.

pub mod registry;
pub mod snapshot;

pub use registry::ServiceRegistry;
pub use snapshot::{InventorySnapshot, SnapshotAlarmProvider, SnapshotServiceProvider};

use crate::models::{AlarmRecord, ResourceRecord};
use thiserror::Error;

/// Error returned by a single provider call.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The region cannot be queried at all.
    #[error("Region {0} is not available")]
    RegionUnavailable(String),

    /// Reading the underlying data failed.
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The data was read but could not be understood.
    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    /// The worker executing the call panicked or was aborted.
    #[error("Worker failed: {0}")]
    Worker(String),
}

/// Discovers the resources of one service.
pub trait ServiceProvider: Send + Sync {
    /// Identifier of the service this provider discovers.
    fn service(&self) -> &str;

    /// Returns every resource of this service in `region`.
    fn discover(&self, region: &str) -> Result<Vec<ResourceRecord>, ProviderError>;
}

/// Fetches the monitoring alarms of a region.
pub trait AlarmProvider: Send + Sync {
    fn fetch_alarms(&self, region: &str) -> Result<Vec<AlarmRecord>, ProviderError>;
}
