use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    config::DEFAULT_QUEUE_NAME,
    error::MonitorError,
    priority::PriorityBuckets,
    types::{GroupKey, JobPredicate, TableIdentity, TimestampColumn},
};

/// The slice of the job table a run looks at: jobs in the allow-listed queues (all queues if
/// the list is empty), grouped by priority bucket and queue. Jobs without a queue belong to
/// `default_queue`.
#[derive(Debug, Clone, Copy)]
pub struct JobView<'a> {
    pub buckets: &'a PriorityBuckets,
    pub queues: &'a [String],
    pub default_queue: &'a str,
}

impl<'a> JobView<'a> {
    pub fn new(buckets: &'a PriorityBuckets, queues: &'a [String]) -> Self {
        Self {
            buckets,
            queues,
            default_queue: DEFAULT_QUEUE_NAME,
        }
    }

    pub fn with_default_queue(mut self, default_queue: &'a str) -> Self {
        self.default_queue = default_queue;
        self
    }

    pub fn includes_queue(&self, queue: &str) -> bool {
        self.queues.is_empty() || self.queues.iter().any(|q| q == queue)
    }
}

/// Read-only access to a job table, at the granularity the monitor needs.
///
/// Implementations may push grouping into the database or group rows in-process, but they
/// must agree on the results, and must fail with `ConfigError::UnbucketedPriority` rather
/// than drop a job that falls outside every bucket.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Table, database and adapter names used to tag observations.
    async fn identity(&self) -> Result<TableIdentity, MonitorError>;

    /// The store's clock, used as the as-of timestamp of a run.
    async fn now(&self) -> Result<DateTime<Utc>, MonitorError>;

    /// Number of matching jobs per group. Groups with no matching jobs are absent.
    async fn count_grouped(
        &self,
        view: JobView<'_>,
        predicate: JobPredicate,
        as_of: DateTime<Utc>,
    ) -> Result<HashMap<GroupKey, i64>, MonitorError>;

    /// Earliest `column` value among matching jobs per group. Groups with no matching jobs are
    /// absent.
    async fn oldest_grouped(
        &self,
        view: JobView<'_>,
        predicate: JobPredicate,
        column: TimestampColumn,
        as_of: DateTime<Utc>,
    ) -> Result<HashMap<GroupKey, DateTime<Utc>>, MonitorError>;
}
