//! Report rendering.
//!
//! Every format is a pure function of the final resource view, the alarm
//! coverage and the collection outcomes.

pub mod cloudformation;
pub mod generator;

pub use cloudformation::{generate_cfn_guardian, generate_cfn_monitor};
pub use generator::{
    generate_audit_report, generate_json_report, generate_tags_report, generate_yaml_report,
};

use crate::analysis::{AlarmCoverage, ResourceView};
use crate::cli::OutputFormat;
use crate::models::{CollectionReport, ReportMetadata};
use anyhow::Result;

/// Everything a renderer may read.
#[derive(Debug, Clone)]
pub struct Report {
    pub metadata: ReportMetadata,
    /// Final resources, flat or grouped by tag.
    pub view: ResourceView,
    pub alarms: AlarmCoverage,
    pub collection: CollectionReport,
}

/// Renders `report` in `format`.
pub fn render(format: OutputFormat, report: &Report) -> Result<String> {
    match format {
        OutputFormat::Audit => Ok(generate_audit_report(report)),
        OutputFormat::Json => generate_json_report(report),
        OutputFormat::Yaml => generate_yaml_report(report),
        OutputFormat::Tags => Ok(generate_tags_report(report)),
        OutputFormat::CfnMonitor => generate_cfn_monitor(report),
        OutputFormat::CfnGuardian => generate_cfn_guardian(report),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::analysis::{Aggregator, TagSelection};
    use crate::models::{AlarmRecord, AlarmState, ResourceRecord, WorkItem};
    use chrono::Utc;

    /// Two regions; eu-west-1 alarms failed, us-east-1/rds not collected.
    pub fn sample_report(tag: Option<(&str, Option<&str>)>) -> Report {
        let aggregator = Aggregator::new();
        let mut web = ResourceRecord::new("ec2", "us-east-1", "i-1").with_tag("env", "prod");
        web.name = Some("web".to_string());
        aggregator.add(
            &WorkItem::new("us-east-1", "ec2"),
            vec![
                web,
                ResourceRecord::new("ec2", "us-east-1", "i-2").with_tag("env", "dev"),
            ],
        );
        aggregator.add(
            &WorkItem::new("eu-west-1", "sqs"),
            vec![ResourceRecord::new("sqs", "eu-west-1", "q-1").with_tag("env", "prod")],
        );
        aggregator.add(&WorkItem::new("eu-west-1", "ec2"), vec![]);
        aggregator.record_failure(&WorkItem::new("us-east-1", "rds"), "access denied");

        aggregator.begin_alarm_collection().unwrap();
        aggregator
            .correlate(
                "us-east-1",
                vec![
                    AlarmRecord {
                        region: "us-east-1".to_string(),
                        name: "web-cpu".to_string(),
                        target: Some("i-1".to_string()),
                        state: AlarmState::Alarm,
                        alarm_type: "CPUUtilization".to_string(),
                    },
                    AlarmRecord {
                        region: "us-east-1".to_string(),
                        name: "old-db".to_string(),
                        target: Some("db-gone".to_string()),
                        state: AlarmState::InsufficientData,
                        alarm_type: "FreeStorageSpace".to_string(),
                    },
                    AlarmRecord {
                        region: "us-east-1".to_string(),
                        name: "billing".to_string(),
                        target: None,
                        state: AlarmState::Ok,
                        alarm_type: "EstimatedCharges".to_string(),
                    },
                ],
            )
            .unwrap();
        aggregator
            .record_alarm_failure("eu-west-1", "access denied")
            .unwrap();
        aggregator.finish_alarm_collection().unwrap();

        let data = aggregator.freeze();
        let selection = tag.map(|(key, filter)| {
            TagSelection::new(Some(key), filter).unwrap().unwrap()
        });

        Report {
            metadata: ReportMetadata {
                generated_at: Utc::now(),
                regions: vec!["eu-west-1".to_string(), "us-east-1".to_string()],
                services: vec!["ec2".to_string(), "rds".to_string(), "sqs".to_string()],
                duration_seconds: 1.5,
            },
            view: crate::analysis::build_view(data.resources, selection.as_ref()).unwrap(),
            alarms: data.alarms,
            collection: data.collection,
        }
    }
}
