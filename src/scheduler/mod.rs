//! Bounded-concurrency work scheduler.
//!
//! Every (region, service) pair becomes a [`WorkItem`]. Items are queued up
//! front and executed as blocking calls on the runtime's blocking pool, with
//! at most `concurrency` calls in flight. Completions are yielded in the
//! order they finish and drained by a single coordinator into the
//! [`Aggregator`].

use crate::analysis::{Aggregator, AuditData};
use crate::config::ConfigError;
use crate::models::WorkItem;
use crate::providers::{AlarmProvider, ProviderError, ServiceProvider, ServiceRegistry};
use anyhow::Result;
use futures::stream::{self, Stream, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default number of concurrent provider calls.
pub const DEFAULT_CONCURRENCY: usize = 100;

/// A finished call, successful or not.
#[derive(Debug)]
pub struct Completion<K, T> {
    pub item: K,
    pub result: Result<T, ProviderError>,
}

/// Builds the cross product of `regions` and `services`, minus `skip`.
///
/// Duplicate inputs collapse to a single item each.
pub fn build_work_items(regions: &[String], services: &[String], skip: &[String]) -> Vec<WorkItem> {
    let items: BTreeSet<WorkItem> = regions
        .iter()
        .flat_map(|region| {
            services
                .iter()
                .filter(|service| !skip.contains(service))
                .map(move |service| WorkItem::new(region, service))
        })
        .collect();

    items.into_iter().collect()
}

/// Runs `call` once for every item, at most `concurrency` at a time.
///
/// Each call runs on the blocking pool. A call that panics is reported as
/// a [`ProviderError::Worker`] for its item; siblings are unaffected.
pub fn dispatch<K, T, F>(
    items: Vec<K>,
    concurrency: usize,
    call: F,
) -> impl Stream<Item = Completion<K, T>>
where
    K: Clone + Send + 'static,
    T: Send + 'static,
    F: Fn(&K) -> Result<T, ProviderError> + Send + Sync + 'static,
{
    let call = Arc::new(call);

    stream::iter(items)
        .map(move |item| {
            let call = Arc::clone(&call);
            async move {
                let key = item.clone();
                let result = match tokio::task::spawn_blocking(move || (*call)(&item)).await {
                    Ok(result) => result,
                    Err(e) => Err(ProviderError::Worker(e.to_string())),
                };
                Completion { item: key, result }
            }
        })
        .buffer_unordered(concurrency.max(1))
}

#[derive(Clone)]
struct ResourceJob {
    item: WorkItem,
    provider: Arc<dyn ServiceProvider>,
}

/// Drives the resource and alarm collection phases.
#[derive(Debug, Clone)]
pub struct Scheduler {
    concurrency: usize,
    show_progress: bool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl Scheduler {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            show_progress: false,
        }
    }

    /// Show a progress bar on stderr while collecting.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn progress_bar(&self, len: usize, message: &'static str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(message);
        pb
    }

    /// Runs a full collection: resources first, then alarms when an alarm
    /// provider is given.
    pub async fn run(
        &self,
        registry: &ServiceRegistry,
        alarms: Option<Arc<dyn AlarmProvider>>,
        regions: &[String],
        services: &[String],
    ) -> Result<AuditData> {
        let start = Instant::now();
        let aggregator = Aggregator::new();

        let items = build_work_items(regions, services, &[]);
        self.collect_resources(registry, items, &aggregator).await?;

        if let Some(provider) = alarms {
            self.collect_alarms(provider, regions, &aggregator).await?;
        }

        info!(
            elapsed_seconds = start.elapsed().as_secs_f64(),
            "Collection finished"
        );
        Ok(aggregator.freeze())
    }

    /// Executes every resource work item and merges results into
    /// `aggregator`. Returns once all items have completed or failed.
    pub async fn collect_resources(
        &self,
        registry: &ServiceRegistry,
        items: Vec<WorkItem>,
        aggregator: &Aggregator,
    ) -> Result<()> {
        if items.is_empty() {
            return Err(ConfigError::EmptySelection("work items").into());
        }

        // Resolve every provider before anything is dispatched.
        let jobs = items
            .into_iter()
            .map(|item| match registry.get(&item.service) {
                Some(provider) => Ok(ResourceJob { item, provider }),
                None => Err(ConfigError::Invalid {
                    kind: "service",
                    provided: item.service.clone(),
                    supported: format!("{:?}", registry.names()),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            items = jobs.len(),
            concurrency = self.concurrency,
            "Collecting resources"
        );
        let pb = self.progress_bar(jobs.len(), "resources");

        let completions = dispatch(jobs, self.concurrency, |job: &ResourceJob| {
            job.provider.discover(&job.item.region)
        });
        futures::pin_mut!(completions);

        while let Some(Completion { item: job, result }) = completions.next().await {
            match result {
                Ok(records) => {
                    debug!(item = %job.item, count = records.len(), "Collected");
                    aggregator.add(&job.item, records);
                }
                Err(e) => {
                    warn!(
                        region = %job.item.region,
                        service = %job.item.service,
                        error = %e,
                        "Resource collection failed"
                    );
                    aggregator.record_failure(&job.item, &e.to_string());
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        Ok(())
    }

    /// Fetches alarms for every region and correlates them in `aggregator`.
    ///
    /// Must run after [`Scheduler::collect_resources`] has returned.
    pub async fn collect_alarms(
        &self,
        provider: Arc<dyn AlarmProvider>,
        regions: &[String],
        aggregator: &Aggregator,
    ) -> Result<()> {
        if regions.is_empty() {
            return Err(ConfigError::EmptySelection("regions").into());
        }

        let regions: Vec<String> = regions
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        aggregator.begin_alarm_collection()?;
        info!(regions = regions.len(), "Collecting alarms");
        let pb = self.progress_bar(regions.len(), "alarms");

        let completions = dispatch(regions, self.concurrency, move |region: &String| {
            provider.fetch_alarms(region)
        });
        futures::pin_mut!(completions);

        while let Some(Completion { item: region, result }) = completions.next().await {
            match result {
                Ok(alarms) => {
                    debug!(region = %region, count = alarms.len(), "Fetched alarms");
                    aggregator.correlate(&region, alarms)?;
                }
                Err(e) => {
                    warn!(region = %region, error = %e, "Alarm collection failed");
                    aggregator.record_alarm_failure(&region, &e.to_string())?;
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        aggregator.finish_alarm_collection()?;
        debug!(phase = %aggregator.alarm_phase(), "Alarm collection finished");
        Ok(())
    }
}
