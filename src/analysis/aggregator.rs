//! Resource aggregation and alarm correlation.
//!
//! The [`Aggregator`] is the only shared mutable state of a run. Completed
//! work items are merged into it as they arrive, in any order; once every
//! resource item is done, alarm fetches are correlated against the merged
//! resource identifiers. [`Aggregator::freeze`] then hands out a read-only
//! [`AuditData`] for grouping and rendering.

use crate::models::{
    AlarmRecord, CollectionReport, ItemOutcome, RegionAlarmOutcome, ResourceRecord, WorkItem,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

/// Progress of alarm collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmPhase {
    NotCollected,
    Collecting,
    Correlated,
}

impl fmt::Display for AlarmPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmPhase::NotCollected => write!(f, "not collected"),
            AlarmPhase::Collecting => write!(f, "collecting"),
            AlarmPhase::Correlated => write!(f, "correlated"),
        }
    }
}

/// Error raised when alarm operations happen in the wrong phase.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregatorError {
    #[error("Cannot {operation} while alarm collection is {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: AlarmPhase,
    },
}

/// Alarms indexed by region, then by the identifier of the resource they
/// monitor. Identifiers are only unique within a region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlarmIndex {
    by_target: BTreeMap<String, BTreeMap<String, Vec<AlarmRecord>>>,
    unmatched: BTreeSet<(String, String)>,
    untargeted: Vec<AlarmRecord>,
    regions: BTreeMap<String, RegionAlarmOutcome>,
}

impl AlarmIndex {
    /// Alarms in `region` whose target is `id`.
    pub fn alarms_for(&self, region: &str, id: &str) -> &[AlarmRecord] {
        self.by_target
            .get(region)
            .and_then(|targets| targets.get(id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether `target` is referenced by alarms in `region` but was not
    /// among the resources scanned in that region.
    pub fn is_unmatched(&self, region: &str, target: &str) -> bool {
        self.unmatched
            .contains(&(region.to_string(), target.to_string()))
    }

    /// Alarms targeting resources outside the scanned set.
    pub fn unmatched_alarms(&self) -> Vec<&AlarmRecord> {
        self.unmatched
            .iter()
            .flat_map(|(region, target)| self.alarms_for(region, target))
            .collect()
    }

    /// Alarms whose target could not be determined.
    pub fn untargeted(&self) -> &[AlarmRecord] {
        &self.untargeted
    }

    /// Outcome of the alarm fetch for every region that was checked.
    pub fn regions(&self) -> &BTreeMap<String, RegionAlarmOutcome> {
        &self.regions
    }

    pub fn region_outcome(&self, region: &str) -> Option<&RegionAlarmOutcome> {
        self.regions.get(region)
    }

    /// Total number of alarms held, matched or not.
    pub fn alarm_count(&self) -> usize {
        self.by_target
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum::<usize>()
            + self.untargeted.len()
    }
}

/// Monitoring status of a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    /// Alarm collection did not run for this output.
    NotEvaluated,
    /// The alarm fetch for the resource's region failed.
    Unknown,
    /// Alarms were fetched and none target this resource.
    Unmonitored,
    /// This many alarms target the resource.
    Monitored(usize),
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::NotEvaluated => write!(f, "not evaluated"),
            MonitorStatus::Unknown => write!(f, "unknown"),
            MonitorStatus::Unmonitored => write!(f, "UNMONITORED"),
            MonitorStatus::Monitored(n) => write!(f, "monitored ({})", n),
        }
    }
}

/// Alarm knowledge available to renderers.
#[derive(Debug, Clone, PartialEq)]
pub enum AlarmCoverage {
    NotCollected,
    Correlated(AlarmIndex),
}

impl AlarmCoverage {
    pub fn index(&self) -> Option<&AlarmIndex> {
        match self {
            AlarmCoverage::NotCollected => None,
            AlarmCoverage::Correlated(index) => Some(index),
        }
    }

    /// Monitoring status of `resource`.
    pub fn status(&self, resource: &ResourceRecord) -> MonitorStatus {
        let index = match self {
            AlarmCoverage::NotCollected => return MonitorStatus::NotEvaluated,
            AlarmCoverage::Correlated(index) => index,
        };

        let alarms = index.alarms_for(&resource.region, &resource.id).len();
        if alarms > 0 {
            return MonitorStatus::Monitored(alarms);
        }

        match index.region_outcome(&resource.region) {
            Some(RegionAlarmOutcome::Checked(_)) => MonitorStatus::Unmonitored,
            Some(RegionAlarmOutcome::Failed(_)) | None => MonitorStatus::Unknown,
        }
    }
}

/// Frozen result of a run, read by grouping and rendering.
#[derive(Debug, Clone)]
pub struct AuditData {
    /// Every collected resource, sorted by service, region and identifier.
    pub resources: Vec<ResourceRecord>,
    /// Outcome of every resource work item.
    pub collection: CollectionReport,
    /// Alarm coverage, if alarm collection ran.
    pub alarms: AlarmCoverage,
}

#[derive(Debug)]
struct AggregatorState {
    resources: Vec<ResourceRecord>,
    /// (region, id) of every collected resource.
    known_ids: HashSet<(String, String)>,
    items: BTreeMap<WorkItem, ItemOutcome>,
    phase: AlarmPhase,
    alarms: AlarmIndex,
}

/// Thread-safe, append-only collecting sink.
#[derive(Debug)]
pub struct Aggregator {
    state: Mutex<AggregatorState>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AggregatorState {
                resources: Vec::new(),
                known_ids: HashSet::new(),
                items: BTreeMap::new(),
                phase: AlarmPhase::NotCollected,
                alarms: AlarmIndex::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merges the resources collected by one work item.
    ///
    /// A second completion for the same item is ignored.
    pub fn add(&self, item: &WorkItem, records: Vec<ResourceRecord>) {
        let mut state = self.lock();

        if state.items.contains_key(item) {
            warn!(item = %item, "Duplicate completion ignored");
            return;
        }

        debug!(item = %item, count = records.len(), "Merging resources");
        state
            .items
            .insert(item.clone(), ItemOutcome::Collected(records.len()));
        for record in &records {
            state
                .known_ids
                .insert((record.region.clone(), record.id.clone()));
        }
        state.resources.extend(records);
    }

    /// Records that a work item failed; it contributes no resources.
    pub fn record_failure(&self, item: &WorkItem, error: &str) {
        let mut state = self.lock();

        if state.items.contains_key(item) {
            warn!(item = %item, "Duplicate completion ignored");
            return;
        }

        state
            .items
            .insert(item.clone(), ItemOutcome::Failed(error.to_string()));
    }

    pub fn alarm_phase(&self) -> AlarmPhase {
        self.lock().phase
    }

    /// Moves alarm correlation from `NotCollected` to `Collecting`.
    pub fn begin_alarm_collection(&self) -> Result<(), AggregatorError> {
        let mut state = self.lock();
        match state.phase {
            AlarmPhase::NotCollected => {
                state.phase = AlarmPhase::Collecting;
                Ok(())
            }
            phase => Err(AggregatorError::InvalidPhase {
                operation: "begin alarm collection",
                phase,
            }),
        }
    }

    /// Indexes the alarms fetched for `region` against known resources.
    ///
    /// Alarms whose target is not a scanned resource are kept under their
    /// target and flagged unmatched.
    pub fn correlate(&self, region: &str, alarms: Vec<AlarmRecord>) -> Result<(), AggregatorError> {
        let mut state = self.lock();
        if state.phase != AlarmPhase::Collecting {
            return Err(AggregatorError::InvalidPhase {
                operation: "correlate alarms",
                phase: state.phase,
            });
        }

        let state = &mut *state;
        state
            .alarms
            .regions
            .insert(region.to_string(), RegionAlarmOutcome::Checked(alarms.len()));

        for alarm in alarms {
            match alarm.target.clone() {
                Some(target) => {
                    let key = (region.to_string(), target);
                    if !state.known_ids.contains(&key) {
                        state.alarms.unmatched.insert(key.clone());
                    }
                    state
                        .alarms
                        .by_target
                        .entry(key.0)
                        .or_default()
                        .entry(key.1)
                        .or_default()
                        .push(alarm);
                }
                None => state.alarms.untargeted.push(alarm),
            }
        }

        Ok(())
    }

    /// Records that the alarm fetch for `region` failed.
    pub fn record_alarm_failure(&self, region: &str, error: &str) -> Result<(), AggregatorError> {
        let mut state = self.lock();
        if state.phase != AlarmPhase::Collecting {
            return Err(AggregatorError::InvalidPhase {
                operation: "record an alarm failure",
                phase: state.phase,
            });
        }

        state.alarms.regions.insert(
            region.to_string(),
            RegionAlarmOutcome::Failed(error.to_string()),
        );
        Ok(())
    }

    /// Moves alarm correlation from `Collecting` to `Correlated`.
    pub fn finish_alarm_collection(&self) -> Result<(), AggregatorError> {
        let mut state = self.lock();
        match state.phase {
            AlarmPhase::Collecting => {
                state.phase = AlarmPhase::Correlated;
                Ok(())
            }
            phase => Err(AggregatorError::InvalidPhase {
                operation: "finish alarm collection",
                phase,
            }),
        }
    }

    /// Consumes the aggregator and returns the frozen result.
    pub fn freeze(self) -> AuditData {
        let mut state = self
            .state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);

        state.resources.sort_by(|a, b| {
            (&a.service, &a.region, &a.id).cmp(&(&b.service, &b.region, &b.id))
        });

        let alarms = match state.phase {
            AlarmPhase::NotCollected => AlarmCoverage::NotCollected,
            AlarmPhase::Correlated => AlarmCoverage::Correlated(state.alarms),
            AlarmPhase::Collecting => {
                warn!("Alarm collection was not finished; coverage may be partial");
                AlarmCoverage::Correlated(state.alarms)
            }
        };

        AuditData {
            resources: state.resources,
            collection: CollectionReport { items: state.items },
            alarms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlarmState;

    fn alarm(region: &str, name: &str, target: Option<&str>) -> AlarmRecord {
        AlarmRecord {
            region: region.to_string(),
            name: name.to_string(),
            target: target.map(String::from),
            state: AlarmState::Ok,
            alarm_type: "CPUUtilization".to_string(),
        }
    }

    #[test]
    fn test_add_and_freeze_sorts_resources() {
        let aggregator = Aggregator::new();
        aggregator.add(
            &WorkItem::new("us-east-1", "rds"),
            vec![ResourceRecord::new("rds", "us-east-1", "db-1")],
        );
        aggregator.add(
            &WorkItem::new("us-east-1", "ec2"),
            vec![
                ResourceRecord::new("ec2", "us-east-1", "i-2"),
                ResourceRecord::new("ec2", "us-east-1", "i-1"),
            ],
        );

        let data = aggregator.freeze();
        let ids: Vec<_> = data.resources.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["i-1", "i-2", "db-1"]);
        assert_eq!(data.collection.collected_count(), 2);
        assert_eq!(data.alarms, AlarmCoverage::NotCollected);
    }

    #[test]
    fn test_duplicate_completion_ignored() {
        let aggregator = Aggregator::new();
        let item = WorkItem::new("us-east-1", "ec2");
        aggregator.add(&item, vec![ResourceRecord::new("ec2", "us-east-1", "i-1")]);
        aggregator.add(&item, vec![ResourceRecord::new("ec2", "us-east-1", "i-1")]);
        aggregator.record_failure(&item, "late failure");

        let data = aggregator.freeze();
        assert_eq!(data.resources.len(), 1);
        assert_eq!(data.collection.items[&item], ItemOutcome::Collected(1));
    }

    #[test]
    fn test_failure_distinct_from_empty() {
        let aggregator = Aggregator::new();
        aggregator.add(&WorkItem::new("us-east-1", "ec2"), vec![]);
        aggregator.record_failure(&WorkItem::new("us-east-1", "rds"), "throttled");

        let data = aggregator.freeze();
        assert_eq!(
            data.collection.items[&WorkItem::new("us-east-1", "ec2")],
            ItemOutcome::Collected(0)
        );
        assert_eq!(
            data.collection.items[&WorkItem::new("us-east-1", "rds")],
            ItemOutcome::Failed("throttled".to_string())
        );
    }

    #[test]
    fn test_correlation_monitored_unmonitored_unmatched() {
        let aggregator = Aggregator::new();
        aggregator.add(
            &WorkItem::new("us-east-1", "ec2"),
            vec![
                ResourceRecord::new("ec2", "us-east-1", "A"),
                ResourceRecord::new("ec2", "us-east-1", "B"),
            ],
        );

        aggregator.begin_alarm_collection().unwrap();
        aggregator
            .correlate(
                "us-east-1",
                vec![alarm("us-east-1", "a-cpu", Some("A")), alarm("us-east-1", "c-cpu", Some("C"))],
            )
            .unwrap();
        aggregator.finish_alarm_collection().unwrap();

        let data = aggregator.freeze();
        let a = &data.resources[0];
        let b = &data.resources[1];
        assert_eq!(data.alarms.status(a), MonitorStatus::Monitored(1));
        assert_eq!(data.alarms.status(b), MonitorStatus::Unmonitored);

        let index = data.alarms.index().unwrap();
        assert!(index.is_unmatched("us-east-1", "C"));
        assert!(!index.is_unmatched("us-east-1", "A"));
        assert_eq!(index.alarms_for("us-east-1", "C").len(), 1);
        let unmatched = index.unmatched_alarms();
        assert_eq!(unmatched.len(), 1);
        assert_eq!(unmatched[0].name, "c-cpu");
    }

    #[test]
    fn test_failed_region_is_unknown() {
        let aggregator = Aggregator::new();
        aggregator.add(
            &WorkItem::new("eu-west-1", "sqs"),
            vec![ResourceRecord::new("sqs", "eu-west-1", "q-1")],
        );
        aggregator.add(
            &WorkItem::new("us-east-1", "sqs"),
            vec![ResourceRecord::new("sqs", "us-east-1", "q-2")],
        );

        aggregator.begin_alarm_collection().unwrap();
        aggregator
            .record_alarm_failure("eu-west-1", "access denied")
            .unwrap();
        aggregator.correlate("us-east-1", vec![]).unwrap();
        aggregator.finish_alarm_collection().unwrap();

        let data = aggregator.freeze();
        let index = data.alarms.index().unwrap();
        assert_eq!(
            index.region_outcome("eu-west-1"),
            Some(&RegionAlarmOutcome::Failed("access denied".to_string()))
        );
        assert_eq!(
            index.region_outcome("us-east-1"),
            Some(&RegionAlarmOutcome::Checked(0))
        );
        assert_eq!(data.alarms.status(&data.resources[0]), MonitorStatus::Unknown);
        assert_eq!(data.alarms.status(&data.resources[1]), MonitorStatus::Unmonitored);
    }

    #[test]
    fn test_same_id_in_two_regions_matched_per_region() {
        let aggregator = Aggregator::new();
        aggregator.add(
            &WorkItem::new("us-east-1", "sqs"),
            vec![ResourceRecord::new("sqs", "us-east-1", "jobs")],
        );
        aggregator.add(
            &WorkItem::new("eu-west-1", "sqs"),
            vec![ResourceRecord::new("sqs", "eu-west-1", "jobs")],
        );
        aggregator.add(
            &WorkItem::new("ap-southeast-2", "sqs"),
            vec![ResourceRecord::new("sqs", "ap-southeast-2", "jobs")],
        );

        aggregator.begin_alarm_collection().unwrap();
        aggregator
            .correlate(
                "us-east-1",
                vec![
                    alarm("us-east-1", "jobs-backlog", Some("jobs")),
                    alarm("us-east-1", "reports-backlog", Some("reports")),
                ],
            )
            .unwrap();
        aggregator
            .record_alarm_failure("eu-west-1", "access denied")
            .unwrap();
        aggregator.correlate("ap-southeast-2", vec![]).unwrap();
        aggregator.finish_alarm_collection().unwrap();

        let data = aggregator.freeze();
        let status = |region: &str| {
            let resource = data.resources.iter().find(|r| r.region == region).unwrap();
            data.alarms.status(resource)
        };
        assert_eq!(status("us-east-1"), MonitorStatus::Monitored(1));
        assert_eq!(status("eu-west-1"), MonitorStatus::Unknown);
        assert_eq!(status("ap-southeast-2"), MonitorStatus::Unmonitored);

        let index = data.alarms.index().unwrap();
        assert!(!index.is_unmatched("us-east-1", "jobs"));
        assert!(index.is_unmatched("us-east-1", "reports"));
        assert!(index.alarms_for("eu-west-1", "jobs").is_empty());
        assert_eq!(index.alarm_count(), 2);
    }

    #[test]
    fn test_target_only_in_other_region_is_unmatched() {
        let aggregator = Aggregator::new();
        aggregator.add(
            &WorkItem::new("eu-west-1", "lambda"),
            vec![ResourceRecord::new("lambda", "eu-west-1", "resize")],
        );

        aggregator.begin_alarm_collection().unwrap();
        aggregator
            .correlate("us-east-1", vec![alarm("us-east-1", "resize-errors", Some("resize"))])
            .unwrap();
        aggregator.correlate("eu-west-1", vec![]).unwrap();
        aggregator.finish_alarm_collection().unwrap();

        let data = aggregator.freeze();
        let index = data.alarms.index().unwrap();
        assert!(index.is_unmatched("us-east-1", "resize"));
        assert_eq!(index.unmatched_alarms().len(), 1);
        assert_eq!(data.alarms.status(&data.resources[0]), MonitorStatus::Unmonitored);
    }

    #[test]
    fn test_untargeted_alarms_kept() {
        let aggregator = Aggregator::new();
        aggregator.begin_alarm_collection().unwrap();
        aggregator
            .correlate("us-east-1", vec![alarm("us-east-1", "billing", None)])
            .unwrap();
        aggregator.finish_alarm_collection().unwrap();

        let data = aggregator.freeze();
        let index = data.alarms.index().unwrap();
        assert_eq!(index.untargeted().len(), 1);
        assert_eq!(index.alarm_count(), 1);
    }

    #[test]
    fn test_phase_transitions() {
        let aggregator = Aggregator::new();
        assert_eq!(aggregator.alarm_phase(), AlarmPhase::NotCollected);

        assert!(aggregator.correlate("us-east-1", vec![]).is_err());
        assert!(aggregator.finish_alarm_collection().is_err());

        aggregator.begin_alarm_collection().unwrap();
        assert_eq!(aggregator.alarm_phase(), AlarmPhase::Collecting);
        assert!(aggregator.begin_alarm_collection().is_err());

        aggregator.finish_alarm_collection().unwrap();
        assert_eq!(aggregator.alarm_phase(), AlarmPhase::Correlated);

        let err = aggregator.correlate("us-east-1", vec![]).unwrap_err();
        assert_eq!(
            err,
            AggregatorError::InvalidPhase {
                operation: "correlate alarms",
                phase: AlarmPhase::Correlated,
            }
        );
    }

    #[test]
    fn test_status_not_evaluated_without_alarms() {
        let coverage = AlarmCoverage::NotCollected;
        let record = ResourceRecord::new("ec2", "us-east-1", "i-1");
        assert_eq!(coverage.status(&record), MonitorStatus::NotEvaluated);
        assert_eq!(MonitorStatus::Monitored(2).to_string(), "monitored (2)");
    }

    #[test]
    fn test_concurrent_adds() {
        let aggregator = std::sync::Arc::new(Aggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let aggregator = std::sync::Arc::clone(&aggregator);
                std::thread::spawn(move || {
                    let region = format!("region-{}", n);
                    aggregator.add(
                        &WorkItem::new(&region, "ec2"),
                        vec![ResourceRecord::new("ec2", &region, &format!("i-{}", n))],
                    );
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let aggregator = std::sync::Arc::try_unwrap(aggregator).unwrap();
        let data = aggregator.freeze();
        assert_eq!(data.resources.len(), 8);
        assert_eq!(data.collection.collected_count(), 8);
    }
}
