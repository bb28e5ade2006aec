use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{
    store::{JobStore, JobView},
    types::{GroupKey, JobPredicate, Metric, MetricValues, TimestampColumn},
    MonitorError,
};

/// Compute one metric for every (bucket, queue) group that has data. Groups without matching
/// jobs are left out, so "no jobs" and "a zero-second age" stay distinguishable until the
/// emitter zero-fills.
pub async fn compute_metric(
    store: &dyn JobStore,
    view: JobView<'_>,
    metric: Metric,
    as_of: DateTime<Utc>,
) -> Result<MetricValues, MonitorError> {
    match metric {
        Metric::Count => count(store, view, JobPredicate::All, as_of).await,
        Metric::FutureCount => count(store, view, JobPredicate::Future, as_of).await,
        Metric::LockedCount => count(store, view, JobPredicate::Claimed, as_of).await,
        Metric::ErroringCount => count(store, view, JobPredicate::Erroring, as_of).await,
        Metric::FailedCount => count(store, view, JobPredicate::Failed, as_of).await,
        Metric::MaxLockAge => {
            max_age(
                store,
                view,
                JobPredicate::Claimed,
                TimestampColumn::LockedAt,
                as_of,
            )
            .await
        }
        Metric::MaxAge => {
            max_age(
                store,
                view,
                JobPredicate::Workable,
                TimestampColumn::RunAt,
                as_of,
            )
            .await
        }
        Metric::WorkingCount => count(store, view, JobPredicate::Claimed, as_of).await,
        Metric::WorkableCount => count(store, view, JobPredicate::Workable, as_of).await,
    }
}

async fn count(
    store: &dyn JobStore,
    view: JobView<'_>,
    predicate: JobPredicate,
    as_of: DateTime<Utc>,
) -> Result<MetricValues, MonitorError> {
    let counts = store.count_grouped(view, predicate, as_of).await?;
    Ok(counts
        .into_iter()
        .map(|(key, count)| (key, count as f64))
        .collect())
}

// Oldest matching row per group, reported as its age in seconds at `as_of`
async fn max_age(
    store: &dyn JobStore,
    view: JobView<'_>,
    predicate: JobPredicate,
    column: TimestampColumn,
    as_of: DateTime<Utc>,
) -> Result<MetricValues, MonitorError> {
    let oldest: HashMap<GroupKey, DateTime<Utc>> = store
        .oldest_grouped(view, predicate, column, as_of)
        .await?;
    Ok(oldest
        .into_iter()
        .map(|(key, timestamp)| (key, age_seconds(as_of, timestamp)))
        .collect())
}

pub fn age_seconds(as_of: DateTime<Utc>, timestamp: DateTime<Utc>) -> f64 {
    let age = as_of - timestamp;
    match age.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        // Only overflows for ages of a few hundred thousand years
        None => age.num_seconds() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_age_seconds() {
        let as_of = Utc::now();

        assert_eq!(age_seconds(as_of, as_of), 0.0);
        assert_eq!(age_seconds(as_of, as_of - Duration::seconds(10)), 10.0);
        assert_eq!(age_seconds(as_of, as_of - Duration::milliseconds(1500)), 1.5);
        assert_eq!(age_seconds(as_of, as_of + Duration::seconds(2)), -2.0);
    }
}
