use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{
    config::MonitorConfig,
    engine::compute_metric,
    metrics_consts::*,
    sink::MetricsSink,
    store::{JobStore, JobView},
    timing::{inc, timing_guard},
    types::{GroupKey, Metric, MetricValues, Observation, TableIdentity},
    MonitorError,
};

/// What a single run computed and emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub as_of: DateTime<Utc>,
    pub emitted: u64,
    pub sink_failures: u64,
    /// Zero-filled values per metric, exactly as they were handed to the sink.
    pub values: HashMap<Metric, BTreeMap<GroupKey, f64>>,
}

impl RunReport {
    fn new(as_of: DateTime<Utc>) -> Self {
        Self {
            as_of,
            emitted: 0,
            sink_failures: 0,
            values: HashMap::new(),
        }
    }

    pub fn value(&self, metric: Metric, priority: &str, queue: &str) -> Option<f64> {
        self.values
            .get(&metric)
            .and_then(|values| values.get(&GroupKey::new(priority, queue)))
            .copied()
    }
}

/// Computes the job queue health metrics and hands them to a sink.
///
/// A run is stateless: it takes one as-of timestamp, computes all nine metrics against it,
/// zero-fills every configured (bucket, queue) pair and emits one observation per pair.
/// Scheduling runs is left to the caller.
pub struct Monitor {
    store: Arc<dyn JobStore>,
    sink: Arc<dyn MetricsSink>,
    config: MonitorConfig,
}

impl Monitor {
    pub fn new(
        store: Arc<dyn JobStore>,
        sink: Arc<dyn MetricsSink>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            sink,
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run against the store's current time.
    pub async fn run(&self) -> Result<RunReport, MonitorError> {
        let as_of = self.store.now().await?;
        self.run_at(as_of).await
    }

    /// Run with an explicit as-of timestamp. Every age is measured against it.
    pub async fn run_at(&self, as_of: DateTime<Utc>) -> Result<RunReport, MonitorError> {
        let identity = self.store.identity().await?;
        let labels = identity.tags();

        info!("Running job monitor as of {}", as_of);
        let _run_time = timing_guard(RUN_TIME, &labels);
        inc(RUN_STARTS, &labels, 1);

        let result = self.emit_all(as_of, &identity, &labels).await;

        match &result {
            Ok(report) => {
                inc(RUN_ENDS, &labels, 1);
                info!(
                    "Job monitor run complete, emitted {} observations ({} rejected by sink)",
                    report.emitted, report.sink_failures
                );
            }
            Err(_) => inc(RUN_FAILURES, &labels, 1),
        }

        result
    }

    /// Every (bucket, queue) pair each metric must report, set to zero.
    pub fn default_results(&self) -> BTreeMap<GroupKey, f64> {
        let queues = self.config.reported_queues();
        self.config
            .buckets
            .names()
            .flat_map(|priority| {
                queues
                    .iter()
                    .map(move |queue| (GroupKey::new(priority, *queue), 0.0))
            })
            .collect()
    }

    async fn emit_all(
        &self,
        as_of: DateTime<Utc>,
        identity: &TableIdentity,
        labels: &[(String, String)],
    ) -> Result<RunReport, MonitorError> {
        let view = JobView::new(&self.config.buckets, &self.config.queues)
            .with_default_queue(&self.config.default_queue_name);
        let defaults = self.default_results();
        let mut report = RunReport::new(as_of);

        for metric in Metric::ALL {
            let computed = {
                let _time = timing_guard(METRIC_COMPUTE_TIME, labels).label("metric", metric.name());
                compute_metric(self.store.as_ref(), view, metric, as_of).await?
            };
            let values = self.zero_fill(metric, &defaults, computed)?;

            for (key, value) in &values {
                let observation = Observation {
                    metric,
                    priority: key.priority.clone(),
                    queue: key.queue.clone(),
                    value: *value,
                    as_of,
                    identity: identity.clone(),
                };

                match self.sink.record(&observation) {
                    Ok(()) => report.emitted += 1,
                    Err(e) => {
                        warn!("failed to emit {}: {}", observation.event_name(), e);
                        inc(SINK_FAILURES, labels, 1);
                        report.sink_failures += 1;
                    }
                }
            }

            report.values.insert(metric, values);
        }

        // A few rejected observations are tolerable, a sink that rejects everything is an outage
        if report.emitted == 0 && report.sink_failures > 0 {
            return Err(MonitorError::SinkOutage {
                failures: report.sink_failures,
            });
        }

        Ok(report)
    }

    // Overlay computed values on the zero defaults. A computed bucket we don't know about means
    // the store and the bucketer disagree. With a queue allow-list, so does an unknown queue;
    // without one, other queues are real data and are reported alongside the defaults.
    fn zero_fill(
        &self,
        metric: Metric,
        defaults: &BTreeMap<GroupKey, f64>,
        computed: MetricValues,
    ) -> Result<BTreeMap<GroupKey, f64>, MonitorError> {
        let mut values = defaults.clone();

        for (key, value) in computed {
            let known_queue = self.config.queues.is_empty() || defaults.contains_key(&key);
            if !self.config.buckets.contains_name(&key.priority) || !known_queue {
                return Err(MonitorError::UnexpectedGroup {
                    metric: metric.name().to_owned(),
                    priority: key.priority,
                    queue: key.queue,
                });
            }
            values.insert(key, value);
        }

        Ok(values)
    }
}
