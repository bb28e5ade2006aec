pub const RUN_STARTS: &str = "job_monitor_run_starts";
pub const RUN_ENDS: &str = "job_monitor_run_ends";
pub const RUN_FAILURES: &str = "job_monitor_run_failures";
pub const RUN_TIME: &str = "job_monitor_total_run_ms";

// Labeled with the metric being computed
pub const METRIC_COMPUTE_TIME: &str = "job_monitor_metric_compute_ms";
pub const SINK_FAILURES: &str = "job_monitor_sink_failures";
