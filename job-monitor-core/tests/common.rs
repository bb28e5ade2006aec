use chrono::{DateTime, Duration, TimeZone, Utc};
use job_monitor_core::{Job, PriorityBuckets};

#[allow(dead_code)]
pub fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, 8, 12, 0, 0).unwrap()
}

#[allow(dead_code)]
pub fn low_mid_high() -> PriorityBuckets {
    PriorityBuckets::from_thresholds(&[("low", 0), ("mid", 10), ("high", 100)]).unwrap()
}

// The three job fixture: one workable, one locked ten seconds ago, one permanently failed
#[allow(dead_code)]
pub fn three_jobs(as_of: DateTime<Utc>) -> Vec<Job> {
    vec![
        Job::new(5, "default", as_of - Duration::seconds(60)),
        Job::new(50, "default", as_of - Duration::seconds(20))
            .locked(as_of - Duration::seconds(10), "host:worker-1 pid:42"),
        Job::new(5, "default", as_of - Duration::seconds(90))
            .erroring("RuntimeError: boom")
            .failed(as_of - Duration::seconds(30)),
    ]
}

#[allow(dead_code)]
pub fn dates_match(left: &DateTime<Utc>, right: &DateTime<Utc>) -> bool {
    // Roundtripping a datetime to PG can cause sub-ms differences, so we need to check within a margin of error
    let diff = *left - *right;
    diff.abs() < Duration::milliseconds(1)
}
