//! cfn-monitor and cfn-guardian configuration output.
//!
//! Both formats map every resource onto the template or resource group its
//! service corresponds to. Services missing from the catalog fall back to
//! their own identifier.

use super::Report;
use crate::analysis::ResourceView;
use crate::models::ResourceRecord;
use crate::providers::registry::service_spec;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// One monitored resource. Identifiers repeat across regions and
/// services, so every entry carries both.
#[derive(Debug, Serialize)]
struct MonitorEntry<'a> {
    id: &'a str,
    region: &'a str,
    service: &'a str,
    template: &'a str,
}

#[derive(Debug, Serialize)]
struct MonitorDocument<'a> {
    resources: Vec<MonitorEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct GuardianResource<'a> {
    #[serde(rename = "Id")]
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct GuardianDocument<'a> {
    #[serde(rename = "Resources")]
    resources: BTreeMap<&'a str, Vec<GuardianResource<'a>>>,
}

fn monitor_template(service: &str) -> &str {
    service_spec(service)
        .map(|spec| spec.monitor_template)
        .unwrap_or(service)
}

fn guardian_group(service: &str) -> &str {
    service_spec(service)
        .map(|spec| spec.guardian_group)
        .unwrap_or(service)
}

fn monitor_document(resources: &[ResourceRecord]) -> MonitorDocument<'_> {
    MonitorDocument {
        resources: resources
            .iter()
            .map(|r| MonitorEntry {
                id: &r.id,
                region: &r.region,
                service: &r.service,
                template: monitor_template(&r.service),
            })
            .collect(),
    }
}

fn guardian_document(resources: &[ResourceRecord]) -> GuardianDocument<'_> {
    let mut groups: BTreeMap<&str, Vec<GuardianResource>> = BTreeMap::new();
    for resource in resources {
        groups
            .entry(guardian_group(&resource.service))
            .or_default()
            .push(GuardianResource { id: &resource.id });
    }
    GuardianDocument { resources: groups }
}

/// Serializes one document for a flat view, or one per tag value.
fn render_per_view<'a, T: Serialize>(
    view: &'a ResourceView,
    build: impl Fn(&'a [ResourceRecord]) -> T,
) -> Result<String> {
    match view {
        ResourceView::Flat(resources) => {
            Ok(serde_yaml::to_string(&build(resources.as_slice()))?)
        }
        ResourceView::Grouped(grouped) => {
            let documents: BTreeMap<&str, T> = grouped
                .buckets()
                .iter()
                .map(|(value, resources)| (value.as_str(), build(resources.as_slice())))
                .collect();
            Ok(serde_yaml::to_string(&documents)?)
        }
    }
}

/// Generate a cfn-monitor configuration.
pub fn generate_cfn_monitor(report: &Report) -> Result<String> {
    render_per_view(&report.view, monitor_document)
}

/// Generate a cfn-guardian configuration.
pub fn generate_cfn_guardian(report: &Report) -> Result<String> {
    render_per_view(&report.view, guardian_document)
}
