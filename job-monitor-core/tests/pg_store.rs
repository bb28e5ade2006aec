use std::sync::Arc;

use chrono::Utc;
use common::{as_of, dates_match, low_mid_high, three_jobs};
use job_monitor_core::{
    ConfigError, GroupKey, Job, JobPredicate, JobStore, JobView, MemoryJobStore, Metric, Monitor,
    MonitorConfig, MonitorError, PgJobStore, RecordingSink, TimestampColumn, POSTGRES_ADAPTER,
    utc_session,
};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};

mod common;

// These need a running postgres (DATABASE_URL), run them with `cargo test -- --ignored`

async fn insert_jobs(db: &PgPool, jobs: &[Job]) {
    for job in jobs {
        sqlx::query(
            "INSERT INTO delayed_jobs (priority, queue, run_at, locked_at, locked_by, failed_at, last_error) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(job.priority)
        .bind(&job.queue)
        .bind(job.run_at)
        .bind(job.locked_at)
        .bind(&job.locked_by)
        .bind(job.failed_at)
        .bind(&job.last_error)
        .execute(db)
        .await
        .expect("failed to insert job");
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires postgres"]
async fn pg_identity_and_clock(db: PgPool) {
    let store = PgJobStore::from_pool(db, "delayed_jobs");

    let identity = store.identity().await.unwrap();
    assert_eq!(identity.table, "delayed_jobs");
    assert_eq!(identity.database_adapter, POSTGRES_ADAPTER);
    assert!(!identity.database.is_empty());

    let before = Utc::now();
    let now = store.now().await.unwrap();
    assert!((now - before).num_seconds().abs() < 5);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires postgres"]
async fn pg_three_job_scenario(db: PgPool) {
    insert_jobs(&db, &three_jobs(as_of())).await;

    let sink = Arc::new(RecordingSink::new());
    let monitor = Monitor::new(
        Arc::new(PgJobStore::from_pool(db, "delayed_jobs")),
        sink.clone(),
        MonitorConfig::new(vec![], low_mid_high()),
    );

    let report = monitor.run_at(as_of()).await.unwrap();

    assert_eq!(report.emitted, 27);
    assert_eq!(sink.value_of(Metric::Count, "low", "default"), Some(2.0));
    assert_eq!(sink.value_of(Metric::Count, "mid", "default"), Some(1.0));
    assert_eq!(sink.value_of(Metric::WorkableCount, "low", "default"), Some(1.0));
    assert_eq!(sink.value_of(Metric::LockedCount, "mid", "default"), Some(1.0));
    assert_eq!(sink.value_of(Metric::MaxLockAge, "mid", "default"), Some(10.0));
    assert_eq!(sink.value_of(Metric::MaxLockAge, "low", "default"), Some(0.0));
    assert_eq!(sink.value_of(Metric::Count, "high", "default"), Some(0.0));
}

// The database and in-process classifiers have to agree on every grouping
#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires postgres"]
async fn pg_and_memory_stores_agree(db: PgPool) {
    let now = as_of();
    let mut jobs = three_jobs(now);
    jobs.push(Job::new(9, "mailers", now + chrono::Duration::minutes(5)));
    jobs.push(Job::new(10, "mailers", now - chrono::Duration::minutes(5)).erroring("flaky"));
    jobs.push(Job::new(100, "exports", now - chrono::Duration::minutes(1)));
    jobs.push(
        Job::new(1_000, "exports", now - chrono::Duration::minutes(1))
            .locked(now - chrono::Duration::seconds(3), "worker"),
    );
    insert_jobs(&db, &jobs).await;

    let pg = PgJobStore::from_pool(db, "delayed_jobs");
    let memory = MemoryJobStore::new("delayed_jobs").with_jobs(jobs);
    let buckets = low_mid_high();

    for queues in [vec![], vec!["exports".to_owned()]] {
        let view = JobView::new(&buckets, &queues);
        for predicate in [
            JobPredicate::All,
            JobPredicate::Future,
            JobPredicate::Claimed,
            JobPredicate::Erroring,
            JobPredicate::Failed,
            JobPredicate::Workable,
        ] {
            assert_eq!(
                pg.count_grouped(view, predicate, now).await.unwrap(),
                memory.count_grouped(view, predicate, now).await.unwrap(),
                "{predicate:?} over {queues:?}"
            );
        }

        let pg_oldest = pg
            .oldest_grouped(view, JobPredicate::Claimed, TimestampColumn::LockedAt, now)
            .await
            .unwrap();
        let memory_oldest = memory
            .oldest_grouped(view, JobPredicate::Claimed, TimestampColumn::LockedAt, now)
            .await
            .unwrap();
        assert_eq!(pg_oldest.len(), memory_oldest.len());
        for (key, timestamp) in &memory_oldest {
            assert!(dates_match(&pg_oldest[key], timestamp), "{key:?}");
        }
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires postgres"]
async fn pg_unbucketed_priority_is_a_config_error(db: PgPool) {
    insert_jobs(&db, &[Job::new(-7, "default", as_of())]).await;

    let store = PgJobStore::from_pool(db, "delayed_jobs");
    let buckets = low_mid_high();

    let err = store
        .count_grouped(JobView::new(&buckets, &[]), JobPredicate::All, as_of())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MonitorError::Config(ConfigError::UnbucketedPriority(-7))
    ));

    let ok = store
        .count_grouped(JobView::new(&buckets, &[]), JobPredicate::Failed, as_of())
        .await
        .unwrap();
    assert!(!ok.contains_key(&GroupKey::new("low", "default")));
}

// ActiveRecord tables use `timestamp` columns holding UTC and allow a NULL queue
#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires postgres"]
async fn pg_rails_table_with_zoneless_timestamps(
    _pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let db = PgPoolOptions::new()
        .connect_with(utc_session(connect_opts))
        .await
        .unwrap();
    let now = as_of();

    let rows = [
        (
            5,
            Some("default"),
            now - chrono::Duration::seconds(60),
            Some(now - chrono::Duration::seconds(10)),
        ),
        (15, None, now - chrono::Duration::seconds(30), None),
    ];
    for (priority, queue, run_at, locked_at) in rows {
        sqlx::query(
            "INSERT INTO rails_delayed_jobs (priority, handler, queue, run_at, locked_at, created_at, updated_at) VALUES ($1, '', $2, $3, $4, $3, $3)",
        )
        .bind(priority)
        .bind(queue)
        .bind(run_at.naive_utc())
        .bind(locked_at.map(|locked_at| locked_at.naive_utc()))
        .execute(&db)
        .await
        .expect("failed to insert job");
    }

    let sink = Arc::new(RecordingSink::new());
    let monitor = Monitor::new(
        Arc::new(PgJobStore::from_pool(db.clone(), "rails_delayed_jobs")),
        sink.clone(),
        MonitorConfig::new(vec![], low_mid_high()),
    );

    let report = monitor.run_at(now).await.unwrap();

    assert_eq!(report.emitted, 27);
    assert_eq!(sink.value_of(Metric::Count, "low", "default"), Some(1.0));
    assert_eq!(sink.value_of(Metric::Count, "mid", "default"), Some(1.0));
    assert_eq!(sink.value_of(Metric::MaxLockAge, "low", "default"), Some(10.0));
    assert_eq!(sink.value_of(Metric::MaxAge, "mid", "default"), Some(30.0));
    assert_eq!(sink.value_of(Metric::MaxAge, "low", "default"), Some(0.0));
    assert_eq!(sink.value_of(Metric::WorkableCount, "mid", "default"), Some(1.0));
    assert_eq!(sink.value_of(Metric::WorkingCount, "low", "default"), Some(1.0));

    // Queueless jobs count towards the default queue when it is allow-listed
    let store = PgJobStore::from_pool(db, "rails_delayed_jobs");
    let buckets = low_mid_high();
    let queues = vec!["default".to_owned()];
    let counts = store
        .count_grouped(JobView::new(&buckets, &queues), JobPredicate::All, now)
        .await
        .unwrap();
    assert_eq!(counts[&GroupKey::new("mid", "default")], 1);
    assert_eq!(counts[&GroupKey::new("low", "default")], 1);
}
