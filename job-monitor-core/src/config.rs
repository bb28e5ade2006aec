use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::{pool::PoolOptions, postgres::PgConnectOptions, PgPool};

use crate::priority::PriorityBuckets;

pub const DEFAULT_QUEUE_NAME: &str = "default";
pub const DEFAULT_JOB_TABLE: &str = "delayed_jobs";

// A pool config object, designed to be passable across API boundaries
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PoolConfig {
    pub db_url: String,
    pub max_connections: Option<u32>,         // Default to 2, a run issues one query at a time
    pub min_connections: Option<u32>,         // Default to 1
    pub acquire_timeout_seconds: Option<u64>, // Default to 30
    pub max_lifetime_seconds: Option<u64>,    // Default to 300
    pub idle_timeout_seconds: Option<u64>,    // Default to 60
}

impl PoolConfig {
    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        let builder = PoolOptions::new()
            .max_connections(self.max_connections.unwrap_or(2))
            .min_connections(self.min_connections.unwrap_or(1))
            .max_lifetime(Duration::from_secs(
                self.max_lifetime_seconds.unwrap_or(300),
            ))
            .idle_timeout(Duration::from_secs(self.idle_timeout_seconds.unwrap_or(60)))
            .acquire_timeout(Duration::from_secs(
                self.acquire_timeout_seconds.unwrap_or(30),
            ));

        let options = PgConnectOptions::from_str(&self.db_url)?;
        builder.connect_with(utc_session(options)).await
    }
}

/// Pins the session time zone to UTC. Job tables with `timestamp` (no time zone) columns
/// store UTC, and are only compared and aged correctly from a UTC session.
pub fn utc_session(options: PgConnectOptions) -> PgConnectOptions {
    options.options([("TimeZone", "UTC")])
}

/// What the monitor groups and filters by.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Queue allow-list. Empty means every queue is monitored.
    pub queues: Vec<String>,
    /// Stands in for the queue list when zero-filling an unfiltered monitor.
    pub default_queue_name: String,
    pub buckets: PriorityBuckets,
}

impl MonitorConfig {
    pub fn new(queues: Vec<String>, buckets: PriorityBuckets) -> Self {
        Self {
            queues,
            default_queue_name: DEFAULT_QUEUE_NAME.to_owned(),
            buckets,
        }
    }

    pub fn with_default_queue_name(mut self, name: impl Into<String>) -> Self {
        self.default_queue_name = name.into();
        self
    }

    /// The queues every metric must report on. With no allow-list configured we can't know
    /// which queues exist, so only the default queue is zero-filled.
    pub fn reported_queues(&self) -> Vec<&str> {
        if self.queues.is_empty() {
            vec![self.default_queue_name.as_str()]
        } else {
            self.queues.iter().map(String::as_str).collect()
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new(vec![], PriorityBuckets::default())
    }
}
