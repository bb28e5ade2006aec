use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UnknownMetric;

// A row of the job table. The monitor only ever reads these.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Job {
    pub priority: i32,
    pub queue: String,
    pub run_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Job {
    pub fn new(priority: i32, queue: impl Into<String>, run_at: DateTime<Utc>) -> Self {
        Self {
            priority,
            queue: queue.into(),
            run_at,
            locked_at: None,
            locked_by: None,
            failed_at: None,
            last_error: None,
        }
    }

    pub fn locked(mut self, locked_at: DateTime<Utc>, locked_by: impl Into<String>) -> Self {
        self.locked_at = Some(locked_at);
        self.locked_by = Some(locked_by.into());
        self
    }

    pub fn failed(mut self, failed_at: DateTime<Utc>) -> Self {
        self.failed_at = Some(failed_at);
        self
    }

    pub fn erroring(mut self, last_error: impl Into<String>) -> Self {
        self.last_error = Some(last_error.into());
        self
    }

    // Claimed by a worker and not permanently failed
    pub fn is_claimed(&self) -> bool {
        self.locked_at.is_some() && self.failed_at.is_none()
    }

    pub fn is_erroring(&self) -> bool {
        self.last_error.is_some() && self.failed_at.is_none()
    }

    pub fn is_failed(&self) -> bool {
        self.failed_at.is_some()
    }

    pub fn is_future(&self, as_of: DateTime<Utc>) -> bool {
        self.run_at > as_of
    }

    // Due, unlocked and not permanently failed
    pub fn is_workable(&self, as_of: DateTime<Utc>) -> bool {
        self.run_at <= as_of && self.locked_at.is_none() && self.failed_at.is_none()
    }

    pub fn matches(&self, predicate: JobPredicate, as_of: DateTime<Utc>) -> bool {
        match predicate {
            JobPredicate::All => true,
            JobPredicate::Future => self.is_future(as_of),
            JobPredicate::Claimed => self.is_claimed(),
            JobPredicate::Erroring => self.is_erroring(),
            JobPredicate::Failed => self.is_failed(),
            JobPredicate::Workable => self.is_workable(as_of),
        }
    }
}

/// Row filters the metrics are computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobPredicate {
    All,
    Future,
    Claimed,
    Erroring,
    Failed,
    Workable,
}

/// Timestamp columns the "oldest row" metrics look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampColumn {
    RunAt,
    LockedAt,
}

impl TimestampColumn {
    pub fn column_name(&self) -> &'static str {
        match self {
            TimestampColumn::RunAt => "run_at",
            TimestampColumn::LockedAt => "locked_at",
        }
    }

    pub fn of(&self, job: &Job) -> Option<DateTime<Utc>> {
        match self {
            TimestampColumn::RunAt => Some(job.run_at),
            TimestampColumn::LockedAt => job.locked_at,
        }
    }
}

/// The nine metrics reported on every run, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Count,
    FutureCount,
    LockedCount,
    ErroringCount,
    FailedCount,
    MaxLockAge,
    MaxAge,
    WorkingCount,
    WorkableCount,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::Count,
        Metric::FutureCount,
        Metric::LockedCount,
        Metric::ErroringCount,
        Metric::FailedCount,
        Metric::MaxLockAge,
        Metric::MaxAge,
        Metric::WorkingCount,
        Metric::WorkableCount,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Count => "count",
            Metric::FutureCount => "future_count",
            Metric::LockedCount => "locked_count",
            Metric::ErroringCount => "erroring_count",
            Metric::FailedCount => "failed_count",
            Metric::MaxLockAge => "max_lock_age",
            Metric::MaxAge => "max_age",
            Metric::WorkingCount => "working_count",
            Metric::WorkableCount => "workable_count",
        }
    }

    /// The instrumentation event name, e.g. `delayed.job.max_age`.
    pub fn event_name(&self) -> String {
        format!("delayed.job.{}", self.name())
    }

    // Prometheus doesn't allow dots, and the metrics macros want a static name
    pub fn gauge_name(&self) -> &'static str {
        match self {
            Metric::Count => "delayed_job_count",
            Metric::FutureCount => "delayed_job_future_count",
            Metric::LockedCount => "delayed_job_locked_count",
            Metric::ErroringCount => "delayed_job_erroring_count",
            Metric::FailedCount => "delayed_job_failed_count",
            Metric::MaxLockAge => "delayed_job_max_lock_age",
            Metric::MaxAge => "delayed_job_max_age",
            Metric::WorkingCount => "delayed_job_working_count",
            Metric::WorkableCount => "delayed_job_workable_count",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|metric| metric.name() == s)
            .ok_or_else(|| UnknownMetric(s.to_owned()))
    }
}

/// A (priority bucket, queue) pair, the grouping key of every metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub priority: String,
    pub queue: String,
}

impl GroupKey {
    pub fn new(priority: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            priority: priority.into(),
            queue: queue.into(),
        }
    }
}

/// The computed values of one metric. Groups with no data are absent.
pub type MetricValues = HashMap<GroupKey, f64>;

/// Where the jobs live, used to tag every observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableIdentity {
    pub table: String,
    pub database: String,
    pub database_adapter: String,
}

impl TableIdentity {
    pub fn tags(&self) -> Vec<(String, String)> {
        vec![
            ("table".to_owned(), self.table.clone()),
            ("database".to_owned(), self.database.clone()),
            ("database_adapter".to_owned(), self.database_adapter.clone()),
        ]
    }
}

/// A single point-in-time metric value, as handed to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub metric: Metric,
    pub priority: String,
    pub queue: String,
    pub value: f64,
    pub as_of: DateTime<Utc>,
    pub identity: TableIdentity,
}

impl Observation {
    pub fn event_name(&self) -> String {
        self.metric.event_name()
    }

    /// Dimension tags, without the value.
    pub fn labels(&self) -> Vec<(String, String)> {
        let mut labels = self.identity.tags();
        labels.push(("priority".to_owned(), self.priority.clone()));
        labels.push(("queue".to_owned(), self.queue.clone()));
        labels
    }

    /// The flat tag map the instrumentation event carries, value included.
    pub fn tags(&self) -> Vec<(String, String)> {
        let mut tags = self.labels();
        tags.push(("value".to_owned(), self.value.to_string()));
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_metric_names_round_trip() {
        for metric in Metric::ALL {
            assert_eq!(metric.name().parse::<Metric>().unwrap(), metric);
            assert_eq!(
                metric.gauge_name(),
                metric.event_name().replace('.', "_")
            );
        }
        assert_eq!(
            "oldest".parse::<Metric>(),
            Err(UnknownMetric("oldest".to_owned()))
        );
    }

    #[test]
    fn test_erroring_and_failed_overlap_on_last_error() {
        let now = Utc::now();
        let job = Job::new(0, "default", now).erroring("boom");
        assert!(job.is_erroring());
        assert!(!job.is_failed());

        let job = job.failed(now);
        assert!(!job.is_erroring());
        assert!(job.is_failed());
    }

    #[test]
    fn test_workable_requires_due_unlocked_and_unfailed() {
        let now = Utc::now();
        let due = Job::new(0, "default", now - Duration::seconds(1));

        assert!(due.is_workable(now));
        assert!(Job::new(0, "default", now).is_workable(now));
        assert!(!Job::new(0, "default", now + Duration::seconds(1)).is_workable(now));
        assert!(!due.clone().locked(now, "worker").is_workable(now));
        assert!(!due.failed(now).is_workable(now));
    }

    #[test]
    fn test_observation_tags() {
        let observation = Observation {
            metric: Metric::MaxAge,
            priority: "eventual".to_owned(),
            queue: "mailers".to_owned(),
            value: 1.5,
            as_of: Utc::now(),
            identity: TableIdentity {
                table: "delayed_jobs".to_owned(),
                database: "app".to_owned(),
                database_adapter: "postgresql".to_owned(),
            },
        };

        assert_eq!(observation.event_name(), "delayed.job.max_age");
        assert_eq!(
            observation.tags(),
            vec![
                ("table".to_owned(), "delayed_jobs".to_owned()),
                ("database".to_owned(), "app".to_owned()),
                ("database_adapter".to_owned(), "postgresql".to_owned()),
                ("priority".to_owned(), "eventual".to_owned()),
                ("queue".to_owned(), "mailers".to_owned()),
                ("value".to_owned(), "1.5".to_owned()),
            ]
        );
    }
}
