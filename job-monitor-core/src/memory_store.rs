use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    store::{JobStore, JobView},
    types::{GroupKey, Job, JobPredicate, TableIdentity, TimestampColumn},
    MonitorError,
};

pub const MEMORY_ADAPTER: &str = "memory";

/// A job table held in memory. Rows are fetched and grouped in-process, using the same
/// classifier the Postgres store compiles into its CASE expression.
pub struct MemoryJobStore {
    jobs: RwLock<Vec<Job>>,
    identity: TableIdentity,
    // When set, the store's clock is frozen at this instant
    clock: Option<DateTime<Utc>>,
}

impl MemoryJobStore {
    pub fn new(table: &str) -> Self {
        Self {
            jobs: RwLock::new(Vec::new()),
            identity: TableIdentity {
                table: table.to_owned(),
                database: MEMORY_ADAPTER.to_owned(),
                database_adapter: MEMORY_ADAPTER.to_owned(),
            },
            clock: None,
        }
    }

    pub fn with_jobs(mut self, jobs: Vec<Job>) -> Self {
        self.jobs = RwLock::new(jobs);
        self
    }

    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn insert(&self, job: Job) {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(job);
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Group matching jobs by (bucket, queue) and fold each group with `f`. We never hold the
    // lock across an await point; none of this is async.
    fn fold_grouped<T, F>(
        &self,
        view: JobView<'_>,
        predicate: JobPredicate,
        as_of: DateTime<Utc>,
        mut f: F,
    ) -> Result<HashMap<GroupKey, T>, MonitorError>
    where
        F: FnMut(Option<T>, &Job) -> Option<T>,
    {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let mut grouped: HashMap<GroupKey, T> = HashMap::new();

        for job in jobs
            .iter()
            .filter(|job| view.includes_queue(&job.queue))
            .filter(|job| job.matches(predicate, as_of))
        {
            let bucket = view.buckets.bucket_for(job.priority)?;
            let key = GroupKey::new(bucket, job.queue.clone());
            let current = grouped.remove(&key);
            if let Some(next) = f(current, job) {
                grouped.insert(key, next);
            }
        }

        Ok(grouped)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn identity(&self) -> Result<TableIdentity, MonitorError> {
        Ok(self.identity.clone())
    }

    async fn now(&self) -> Result<DateTime<Utc>, MonitorError> {
        Ok(self.clock.unwrap_or_else(Utc::now))
    }

    async fn count_grouped(
        &self,
        view: JobView<'_>,
        predicate: JobPredicate,
        as_of: DateTime<Utc>,
    ) -> Result<HashMap<GroupKey, i64>, MonitorError> {
        self.fold_grouped(view, predicate, as_of, |count, _| {
            Some(count.unwrap_or(0) + 1)
        })
    }

    async fn oldest_grouped(
        &self,
        view: JobView<'_>,
        predicate: JobPredicate,
        column: TimestampColumn,
        as_of: DateTime<Utc>,
    ) -> Result<HashMap<GroupKey, DateTime<Utc>>, MonitorError> {
        self.fold_grouped(view, predicate, as_of, |oldest: Option<DateTime<Utc>>, job| {
            match (oldest, column.of(job)) {
                (Some(oldest), Some(ts)) => Some(oldest.min(ts)),
                (oldest, ts) => oldest.or(ts),
            }
        })
    }
}
