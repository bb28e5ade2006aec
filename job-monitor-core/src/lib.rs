mod ops;

// We do this pattern (privately use a module, then re-export parts of it) so we can refactor/rename or generally futz around with the internals without breaking the public API

// Types
mod types;
pub use types::GroupKey;
pub use types::Job;
pub use types::JobPredicate;
pub use types::Metric;
pub use types::MetricValues;
pub use types::Observation;
pub use types::TableIdentity;
pub use types::TimestampColumn;

// Errors
mod error;
// Errors in the priority bucket configuration, always fatal
pub use error::ConfigError;
// Errors that fail a run - store access, bucketing mismatches, sink outages
pub use error::MonitorError;
// A single observation the sink couldn't take
pub use error::SinkError;
// A metric name that failed to parse
pub use error::UnknownMetric;

// Priority buckets
mod priority;
pub use priority::PriorityBucket;
pub use priority::PriorityBuckets;

// Job stores
mod store;
pub use store::JobStore;
pub use store::JobView;
mod pg_store;
pub use pg_store::PgJobStore;
pub use pg_store::POSTGRES_ADAPTER;
mod memory_store;
pub use memory_store::MemoryJobStore;
pub use memory_store::MEMORY_ADAPTER;

// Metric computation and emission
mod engine;
pub use engine::compute_metric;
mod monitor;
pub use monitor::Monitor;
pub use monitor::RunReport;

// Sinks
mod sink;
pub use sink::MetricsSink;
pub use sink::PrometheusSink;
pub use sink::RecordingSink;

// Config
mod config;
pub use config::MonitorConfig;
pub use config::PoolConfig;
pub use config::utc_session;
pub use config::DEFAULT_JOB_TABLE;
pub use config::DEFAULT_QUEUE_NAME;

mod metrics_consts;
mod timing;
