//! Audit, inventory and tag report generation.
//!
//! The audit report is Markdown; the inventory reports serialize the same
//! document as JSON or YAML.

use super::Report;
use crate::analysis::{
    group_by_service, least_covered_services, tag_distribution, AlarmCoverage, AlarmIndex,
    CoverageSummary, ResourceView,
};
use crate::models::{
    AlarmRecord, CollectionReport, ItemFailure, RegionAlarmOutcome, ReportMetadata,
    ResourceRecord,
};
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// Generate the complete audit report.
pub fn generate_audit_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# Monitorable Audit\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_summary_section(&report.view, &report.alarms));
    output.push_str(&generate_resources_section(&report.view, &report.alarms));
    output.push_str(&generate_collection_section(&report.collection));
    output.push_str(&generate_alarm_checks_section(&report.alarms));

    if let Some(index) = report.alarms.index() {
        output.push_str(&generate_unmatched_section(index));
    }

    output.push_str(&generate_footer());

    output
}

/// Escape a value for use inside a Markdown table cell.
fn cell(value: &str) -> String {
    value.replace('|', "\\|")
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Regions:** {}\n", metadata.regions.join(", ")));
    section.push_str(&format!(
        "- **Services:** {}\n",
        metadata.services.join(", ")
    ));
    section.push_str(&format!(
        "- **Collection Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the coverage summary section.
fn generate_summary_section(view: &ResourceView, alarms: &AlarmCoverage) -> String {
    let resources = view.resources();
    let summary = CoverageSummary::from_resources(resources.iter().copied(), alarms);
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Monitored | Unmonitored | Unknown | Not Evaluated | **Total** |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | **{}** |\n\n",
        summary.monitored,
        summary.unmonitored,
        summary.unknown,
        summary.not_evaluated,
        summary.total
    ));

    if !summary.by_service.is_empty() {
        section.push_str("### Resources by Service\n\n");
        section.push_str("| Service | Resources |\n");
        section.push_str("|:---|:---:|\n");
        for (service, count) in &summary.by_service {
            section.push_str(&format!("| {} | {} |\n", service, count));
        }
        section.push('\n');
    }

    let worst = least_covered_services(resources.iter().copied(), alarms, 5);
    if !worst.is_empty() {
        section.push_str("### Least Covered Services\n\n");
        section.push_str("| Service | Unmonitored |\n");
        section.push_str("|:---|:---:|\n");
        for (service, count) in worst {
            section.push_str(&format!("| {} | {} |\n", service, count));
        }
        section.push('\n');
    }

    section
}

/// Generate the resources section, one table per service.
fn generate_resources_section(view: &ResourceView, alarms: &AlarmCoverage) -> String {
    let mut section = String::new();

    match view {
        ResourceView::Flat(resources) => {
            section.push_str("## Resources\n\n");
            if resources.is_empty() {
                section.push_str("No resources were found.\n\n");
            }
            section.push_str(&generate_service_tables(resources, alarms, "###"));
        }
        ResourceView::Grouped(grouped) => {
            section.push_str(&format!("## Resources by Tag `{}`\n\n", grouped.key()));
            if grouped.is_empty() {
                section.push_str(&format!(
                    "No resources carry the tag `{}`.\n\n",
                    grouped.key()
                ));
            }
            for (value, resources) in grouped.buckets() {
                section.push_str(&format!("### {} = {}\n\n", grouped.key(), value));
                section.push_str(&generate_service_tables(resources, alarms, "####"));
            }
        }
    }

    section
}

fn generate_service_tables(
    resources: &[ResourceRecord],
    alarms: &AlarmCoverage,
    heading: &str,
) -> String {
    let mut section = String::new();

    for (service, records) in group_by_service(resources) {
        section.push_str(&format!("{} {} ({})\n\n", heading, service, records.len()));
        section.push_str("| Region | Resource | Name | Alarms | Status |\n");
        section.push_str("|:---|:---|:---|:---|:---|\n");

        for resource in records {
            let names: Vec<&str> = alarms
                .index()
                .map(|index| index.alarms_for(&resource.region, &resource.id))
                .unwrap_or(&[])
                .iter()
                .map(|a| a.name.as_str())
                .collect();
            let alarm_cell = if names.is_empty() {
                "-".to_string()
            } else {
                cell(&names.join(", "))
            };

            section.push_str(&format!(
                "| {} | `{}` | {} | {} | {} |\n",
                resource.region,
                cell(&resource.id),
                cell(resource.name.as_deref().unwrap_or("-")),
                alarm_cell,
                alarms.status(resource)
            ));
        }
        section.push('\n');
    }

    section
}

/// Generate the section listing work items that could not be collected.
fn generate_collection_section(collection: &CollectionReport) -> String {
    let mut section = String::new();
    section.push_str("## Collection\n\n");

    let failures = collection.failures();
    if failures.is_empty() {
        section.push_str(&format!(
            "All {} region/service combinations were collected.\n\n",
            collection.items.len()
        ));
        return section;
    }

    section.push_str(&format!(
        "{} of {} region/service combinations were **not collected**; \
         their resources are missing from this report.\n\n",
        failures.len(),
        collection.items.len()
    ));
    section.push_str("| Region | Service | Error |\n");
    section.push_str("|:---|:---|:---|\n");
    for failure in &failures {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            failure.region,
            failure.service,
            cell(&failure.error)
        ));
    }
    section.push('\n');

    section
}

/// Generate the per-region alarm check section.
fn generate_alarm_checks_section(alarms: &AlarmCoverage) -> String {
    let mut section = String::new();
    section.push_str("## Alarm Checks\n\n");

    let index = match alarms {
        AlarmCoverage::NotCollected => {
            section.push_str("Alarm coverage was not evaluated.\n\n");
            return section;
        }
        AlarmCoverage::Correlated(index) => index,
    };

    section.push_str("| Region | Result |\n");
    section.push_str("|:---|:---|\n");
    for (region, outcome) in index.regions() {
        let result = match outcome {
            RegionAlarmOutcome::Checked(0) => "no alarms found".to_string(),
            RegionAlarmOutcome::Checked(n) => format!("{} alarms", n),
            RegionAlarmOutcome::Failed(error) => format!("**check failed**: {}", cell(error)),
        };
        section.push_str(&format!("| {} | {} |\n", region, result));
    }
    section.push('\n');

    section
}

fn alarm_rows(alarms: &[&AlarmRecord]) -> String {
    let mut rows = String::new();
    rows.push_str("| Region | Alarm | Target | State | Type |\n");
    rows.push_str("|:---|:---|:---|:---|:---|\n");
    for alarm in alarms {
        rows.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            alarm.region,
            cell(&alarm.name),
            cell(alarm.target.as_deref().unwrap_or("-")),
            alarm.state,
            cell(&alarm.alarm_type)
        ));
    }
    rows.push('\n');
    rows
}

/// Generate the sections for alarms that match no scanned resource.
fn generate_unmatched_section(index: &AlarmIndex) -> String {
    let mut section = String::new();

    let unmatched = index.unmatched_alarms();
    if !unmatched.is_empty() {
        section.push_str("## Unmatched Alarms\n\n");
        section.push_str("These alarms target resources that were not found in the scan.\n\n");
        section.push_str(&alarm_rows(&unmatched));
    }

    let untargeted: Vec<&AlarmRecord> = index.untargeted().iter().collect();
    if !untargeted.is_empty() {
        section.push_str("## Untargeted Alarms\n\n");
        section.push_str(&alarm_rows(&untargeted));
    }

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by monitorable*\n".to_string()
}

/// Resources keyed by service, optionally nested under a tag value.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ResourcesDocument<'a> {
    Flat(BTreeMap<&'a str, Vec<&'a ResourceRecord>>),
    Grouped(BTreeMap<&'a str, BTreeMap<&'a str, Vec<&'a ResourceRecord>>>),
}

/// Shared shape of the JSON and YAML inventory reports.
#[derive(Debug, Serialize)]
struct InventoryDocument<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    group_by: Option<&'a str>,
    resources: ResourcesDocument<'a>,
    not_collected: Vec<ItemFailure>,
}

impl<'a> InventoryDocument<'a> {
    fn new(report: &'a Report) -> Self {
        let (group_by, resources) = match &report.view {
            ResourceView::Flat(resources) => {
                (None, ResourcesDocument::Flat(group_by_service(resources)))
            }
            ResourceView::Grouped(grouped) => (
                Some(grouped.key()),
                ResourcesDocument::Grouped(
                    grouped
                        .buckets()
                        .iter()
                        .map(|(value, records)| (value.as_str(), group_by_service(records)))
                        .collect(),
                ),
            ),
        };

        Self {
            group_by,
            resources,
            not_collected: report.collection.failures(),
        }
    }
}

/// Generate a JSON inventory report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(&InventoryDocument::new(report)).map_err(Into::into)
}

/// Generate a YAML inventory report.
pub fn generate_yaml_report(report: &Report) -> Result<String> {
    serde_yaml::to_string(&InventoryDocument::new(report)).map_err(Into::into)
}

/// Generate the tag usage report.
pub fn generate_tags_report(report: &Report) -> String {
    let resources = report.view.resources();
    let dist = tag_distribution(resources.iter().copied());
    let mut output = String::new();

    output.push_str("# Tags\n\n");
    output.push_str(&format!(
        "{} resources, {} tag keys\n\n",
        resources.len(),
        dist.len()
    ));

    for (key, values) in &dist {
        let tagged: usize = values.values().sum();
        output.push_str(&format!("## {}\n\n", key));
        output.push_str("| Value | Resources |\n");
        output.push_str("|:---|:---:|\n");

        let mut values: Vec<_> = values.iter().collect();
        values.sort_by_key(|(_, count)| std::cmp::Reverse(**count));
        for (value, count) in values {
            let value = if value.is_empty() { "(empty)" } else { *value };
            output.push_str(&format!("| {} | {} |\n", cell(value), count));
        }
        if tagged < resources.len() {
            output.push_str(&format!("| *(untagged)* | {} |\n", resources.len() - tagged));
        }
        output.push('\n');
    }

    output
}
