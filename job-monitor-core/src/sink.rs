use std::sync::{Mutex, PoisonError};

use crate::{
    error::SinkError,
    types::{Metric, Observation},
};

/// Receives every observation a run produces. Observations are independent and may be
/// re-emitted safely, so implementations don't need to care about ordering.
pub trait MetricsSink: Send + Sync {
    fn record(&self, observation: &Observation) -> Result<(), SinkError>;
}

/// Publishes observations as gauges through the `metrics` facade, which the service exports
/// to Prometheus. Every tag except the value becomes a label.
#[derive(Debug, Default, Clone)]
pub struct PrometheusSink;

impl MetricsSink for PrometheusSink {
    fn record(&self, observation: &Observation) -> Result<(), SinkError> {
        let labels = observation.labels();
        metrics::gauge!(observation.metric.gauge_name(), &labels).set(observation.value);
        Ok(())
    }
}

/// Keeps observations in memory, mostly for testing. Can be told to reject metrics to
/// simulate a broken pipeline.
#[derive(Debug, Default)]
pub struct RecordingSink {
    observations: Mutex<Vec<Observation>>,
    rejected: Vec<Metric>,
    reject_all: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(metrics: Vec<Metric>) -> Self {
        Self {
            rejected: metrics,
            ..Default::default()
        }
    }

    pub fn rejecting_all() -> Self {
        Self {
            reject_all: true,
            ..Default::default()
        }
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recent value recorded for a (metric, bucket, queue).
    pub fn value_of(&self, metric: Metric, priority: &str, queue: &str) -> Option<f64> {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|o| o.metric == metric && o.priority == priority && o.queue == queue)
            .map(|o| o.value)
    }

    pub fn clear(&self) {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl MetricsSink for RecordingSink {
    fn record(&self, observation: &Observation) -> Result<(), SinkError> {
        if self.reject_all || self.rejected.contains(&observation.metric) {
            return Err(SinkError {
                event: observation.event_name(),
                reason: "rejected by recording sink".to_owned(),
            });
        }

        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observation.clone());
        Ok(())
    }
}
