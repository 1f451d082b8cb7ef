//! Coverage statistics over a set of resources.

use super::aggregator::{AlarmCoverage, MonitorStatus};
use crate::models::ResourceRecord;
use serde::Serialize;
use std::collections::BTreeMap;

/// Counts of resources by monitoring status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoverageSummary {
    pub total: usize,
    pub monitored: usize,
    pub unmonitored: usize,
    pub unknown: usize,
    pub not_evaluated: usize,
    /// Resource count per service.
    pub by_service: BTreeMap<String, usize>,
}

impl CoverageSummary {
    pub fn from_resources<'a>(
        resources: impl IntoIterator<Item = &'a ResourceRecord>,
        coverage: &AlarmCoverage,
    ) -> Self {
        let mut summary = Self::default();

        for resource in resources {
            summary.total += 1;
            match coverage.status(resource) {
                MonitorStatus::Monitored(_) => summary.monitored += 1,
                MonitorStatus::Unmonitored => summary.unmonitored += 1,
                MonitorStatus::Unknown => summary.unknown += 1,
                MonitorStatus::NotEvaluated => summary.not_evaluated += 1,
            }
            *summary
                .by_service
                .entry(resource.service.clone())
                .or_insert(0) += 1;
        }

        summary
    }
}

/// Group resources by service, keeping their relative order.
pub fn group_by_service<'a>(
    resources: impl IntoIterator<Item = &'a ResourceRecord>,
) -> BTreeMap<&'a str, Vec<&'a ResourceRecord>> {
    let mut grouped: BTreeMap<&str, Vec<&ResourceRecord>> = BTreeMap::new();

    for resource in resources {
        grouped
            .entry(resource.service.as_str())
            .or_default()
            .push(resource);
    }

    grouped
}

/// Distinct values per tag key, with the number of resources carrying each.
pub fn tag_distribution<'a>(
    resources: impl IntoIterator<Item = &'a ResourceRecord>,
) -> BTreeMap<&'a str, BTreeMap<&'a str, usize>> {
    let mut dist: BTreeMap<&str, BTreeMap<&str, usize>> = BTreeMap::new();

    for resource in resources {
        for (key, value) in &resource.tags {
            *dist
                .entry(key.as_str())
                .or_default()
                .entry(value.as_str())
                .or_default() += 1;
        }
    }

    dist
}

/// Services with the most unmonitored resources, worst first.
pub fn least_covered_services<'a>(
    resources: impl IntoIterator<Item = &'a ResourceRecord>,
    coverage: &AlarmCoverage,
    n: usize,
) -> Vec<(&'a str, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();

    for resource in resources {
        if coverage.status(resource) == MonitorStatus::Unmonitored {
            *counts.entry(resource.service.as_str()).or_default() += 1;
        }
    }

    let mut services: Vec<_> = counts.into_iter().collect();
    services.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
    services.truncate(n);

    services
}
