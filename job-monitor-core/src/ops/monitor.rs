use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};

use crate::{
    error::{ConfigError, MonitorError},
    store::JobView,
    types::{GroupKey, JobPredicate, TimestampColumn},
};

// All monitor operations are read-only aggregates, grouped by the priority bucket CASE
// expression and the queue. None of them take row locks.

pub async fn db_time_now<'c, E>(executor: E) -> Result<DateTime<Utc>, MonitorError>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    sqlx::query_scalar("SELECT NOW()")
        .fetch_one(executor)
        .await
        .map_err(MonitorError::query("SELECT NOW"))
}

pub async fn current_database<'c, E>(executor: E) -> Result<String, MonitorError>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    sqlx::query_scalar("SELECT current_database()")
        .fetch_one(executor)
        .await
        .map_err(MonitorError::query("SELECT current_database"))
}

pub async fn count_grouped<'c, E>(
    executor: E,
    table: &str,
    view: JobView<'_>,
    predicate: JobPredicate,
    as_of: DateTime<Utc>,
) -> Result<HashMap<GroupKey, i64>, MonitorError>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    let mut qb = grouped_select(table, view, predicate, as_of, "COUNT(*)");

    let rows: Vec<(Option<String>, String, Option<i32>, i64)> = qb
        .build_query_as()
        .fetch_all(executor)
        .await
        .map_err(MonitorError::query("SELECT COUNT"))?;

    rows.into_iter()
        .map(|(priority, queue, min_priority, count)| {
            Ok((group_key(priority, queue, min_priority)?, count))
        })
        .collect()
}

pub async fn oldest_grouped<'c, E>(
    executor: E,
    table: &str,
    view: JobView<'_>,
    predicate: JobPredicate,
    column: TimestampColumn,
    as_of: DateTime<Utc>,
) -> Result<HashMap<GroupKey, DateTime<Utc>>, MonitorError>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    // Job runners commonly use `timestamp` columns holding UTC. The cast is a no-op on
    // `timestamptz` and relies on the session time zone being UTC otherwise.
    let aggregate = format!("MIN({})::timestamptz", column.column_name());
    let mut qb = grouped_select(table, view, predicate, as_of, &aggregate);

    let rows: Vec<(Option<String>, String, Option<i32>, Option<DateTime<Utc>>)> = qb
        .build_query_as()
        .fetch_all(executor)
        .await
        .map_err(MonitorError::query("SELECT MIN"))?;

    let mut oldest = HashMap::with_capacity(rows.len());
    for (priority, queue, min_priority, timestamp) in rows {
        let key = group_key(priority, queue, min_priority)?;
        // The predicates guarantee a non-null column, but a NULL minimum just means "no data"
        if let Some(timestamp) = timestamp {
            oldest.insert(key, timestamp);
        }
    }

    Ok(oldest)
}

// SELECT <bucket>, <queue>, MIN(priority), <aggregate> FROM <table> WHERE <filters> GROUP BY 1, 2
//
// MIN(priority) rides along so that a NULL bucket (a priority no bucket covers) can be reported
// with an offending value. A NULL queue is read as the view's default queue.
fn grouped_select<'args>(
    table: &str,
    view: JobView<'_>,
    predicate: JobPredicate,
    as_of: DateTime<Utc>,
    aggregate: &str,
) -> QueryBuilder<'args, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
    qb.push(view.buckets.case_expression("priority"));
    qb.push(" AS priority_name, COALESCE(queue, ");
    qb.push_bind(view.default_queue.to_owned());
    qb.push(") AS queue_name, MIN(priority)::int4, ");
    qb.push(aggregate);
    qb.push(" FROM ");
    qb.push(quote_identifier(table));
    qb.push(" WHERE TRUE");

    if !view.queues.is_empty() {
        qb.push(" AND COALESCE(queue, ");
        qb.push_bind(view.default_queue.to_owned());
        qb.push(") = ANY(");
        qb.push_bind(view.queues.to_vec());
        qb.push(")");
    }

    push_predicate(&mut qb, predicate, as_of);

    qb.push(" GROUP BY 1, 2");
    qb
}

fn push_predicate(qb: &mut QueryBuilder<'_, Postgres>, predicate: JobPredicate, as_of: DateTime<Utc>) {
    match predicate {
        JobPredicate::All => {}
        JobPredicate::Future => {
            qb.push(" AND run_at > ");
            qb.push_bind(as_of);
        }
        JobPredicate::Claimed => {
            qb.push(" AND locked_at IS NOT NULL AND failed_at IS NULL");
        }
        JobPredicate::Erroring => {
            qb.push(" AND last_error IS NOT NULL AND failed_at IS NULL");
        }
        JobPredicate::Failed => {
            qb.push(" AND failed_at IS NOT NULL");
        }
        JobPredicate::Workable => {
            qb.push(" AND run_at <= ");
            qb.push_bind(as_of);
            qb.push(" AND locked_at IS NULL AND failed_at IS NULL");
        }
    }
}

fn group_key(
    priority: Option<String>,
    queue: String,
    min_priority: Option<i32>,
) -> Result<GroupKey, MonitorError> {
    match priority {
        Some(priority) => Ok(GroupKey::new(priority, queue)),
        None => Err(ConfigError::UnbucketedPriority(min_priority.unwrap_or_default()).into()),
    }
}

/// Quote a possibly schema-qualified table name, e.g. `jobs.delayed_jobs`.
pub fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::PriorityBuckets;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("delayed_jobs"), "\"delayed_jobs\"");
        assert_eq!(quote_identifier("jobs.delayed"), "\"jobs\".\"delayed\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_grouped_select_sql() {
        let buckets = PriorityBuckets::from_thresholds(&[("low", 0), ("high", 10)]).unwrap();
        let queues = vec!["mailers".to_owned()];
        let as_of = Utc::now();

        let qb = grouped_select(
            "delayed_jobs",
            JobView::new(&buckets, &queues),
            JobPredicate::Workable,
            as_of,
            "MIN(run_at)::timestamptz",
        );
        assert_eq!(
            qb.sql(),
            "SELECT CASE WHEN priority >= 0 AND priority < 10 THEN 'low' \
             WHEN priority >= 10 THEN 'high' END AS priority_name, COALESCE(queue, $1) AS queue_name, \
             MIN(priority)::int4, MIN(run_at)::timestamptz FROM \"delayed_jobs\" WHERE TRUE \
             AND COALESCE(queue, $2) = ANY($3) AND run_at <= $4 AND locked_at IS NULL AND failed_at IS NULL \
             GROUP BY 1, 2"
        );

        let qb = grouped_select(
            "delayed_jobs",
            JobView::new(&buckets, &[]),
            JobPredicate::Claimed,
            as_of,
            "COUNT(*)",
        );
        assert!(qb.sql().ends_with(
            "FROM \"delayed_jobs\" WHERE TRUE AND locked_at IS NOT NULL AND failed_at IS NULL GROUP BY 1, 2"
        ));
    }

    #[test]
    fn test_null_bucket_is_a_config_error() {
        let err = group_key(None, "default".to_owned(), Some(-5)).unwrap_err();
        assert!(matches!(
            err,
            MonitorError::Config(ConfigError::UnbucketedPriority(-5))
        ));
    }
}
