use thiserror::Error;

/// Enumeration of errors in the priority bucket configuration.
/// These are never recoverable at runtime: a job we can't bucket is a job we'd misreport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one priority bucket must be configured")]
    NoBuckets,
    #[error("priority bucket name cannot be empty")]
    EmptyBucketName,
    #[error("priority bucket {0} is configured more than once")]
    DuplicateBucket(String),
    #[error("priority bucket {name} has an empty range [{low}, {high})")]
    EmptyRange { name: String, low: i32, high: i32 },
    #[error("priority bucket {name} starts at {low}, but the previous bucket ends at {expected}")]
    NonContiguous {
        name: String,
        low: i32,
        expected: i32,
    },
    #[error("only the last priority bucket may be unbounded, but {0} is not last")]
    UnboundedNotLast(String),
    #[error("{0} is not a valid priority bucket definition, expected name:threshold")]
    InvalidBucketDefinition(String),
    #[error("priority {0} does not fall into any configured bucket")]
    UnbucketedPriority(i32),
}

/// A metric name that isn't one of the nine monitored metrics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0} is not a valid metric")]
pub struct UnknownMetric(pub String);

/// An observation was rejected by the metrics sink.
#[derive(Error, Debug)]
#[error("sink rejected {event}: {reason}")]
pub struct SinkError {
    pub event: String,
    pub reason: String,
}

/// Enumeration of errors that fail a monitor run.
/// Errors that originate from sqlx are wrapped to provide the failing command as context.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("pool creation failed with: {error}")]
    PoolCreationError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("{metric} produced group ({priority}, {queue}) outside the configured buckets and queues")]
    UnexpectedGroup {
        metric: String,
        priority: String,
        queue: String,
    },
    #[error("metrics sink rejected all {failures} observations of this run")]
    SinkOutage { failures: u64 },
}

impl MonitorError {
    pub(crate) fn query(command: &str) -> impl FnOnce(sqlx::Error) -> Self + '_ {
        move |error| MonitorError::QueryError {
            command: command.to_owned(),
            error,
        }
    }
}
