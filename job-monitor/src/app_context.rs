use std::sync::Arc;
use std::time::Duration;

use job_monitor_core::{
    JobStore, MetricsSink, Monitor, MonitorConfig, MonitorError, PgJobStore, PrometheusSink,
    RunReport,
};
use tracing::{error, info};

use crate::{
    config::Config,
    health::{HealthHandle, HealthRegistry},
};

pub struct AppContext {
    pub monitor: Monitor,
    pub health: HealthRegistry,
    pub monitor_liveness: HealthHandle,
    pub sleep_delay: Duration,
    pub metrics: bool,
}

impl AppContext {
    pub async fn new(config: &Config) -> Result<Self, MonitorError> {
        let monitor_config = config.get_monitor_config()?;
        let store = PgJobStore::new(config.get_pool_config(), &config.job_table).await?;

        let health = HealthRegistry::new("liveness");
        let monitor_liveness = health
            .register("monitor".to_string(), config.sleep_delay() * 4)
            .await;

        Ok(Self::from_parts(
            Arc::new(store),
            Arc::new(PrometheusSink),
            monitor_config,
            health,
            monitor_liveness,
            config.sleep_delay(),
            config.export_prometheus,
        ))
    }

    pub fn from_parts(
        store: Arc<dyn JobStore>,
        sink: Arc<dyn MetricsSink>,
        monitor_config: MonitorConfig,
        health: HealthRegistry,
        monitor_liveness: HealthHandle,
        sleep_delay: Duration,
        metrics: bool,
    ) -> Self {
        Self {
            monitor: Monitor::new(store, sink, monitor_config),
            health,
            monitor_liveness,
            sleep_delay,
            metrics,
        }
    }

    /// Run the monitor once, reporting liveness whatever the outcome. A failed run is logged
    /// and left for the next tick; retrying is the loop's job, not the monitor's.
    pub async fn run_once(&self) -> Option<RunReport> {
        let result = self.monitor.run().await;
        self.monitor_liveness.report_healthy().await;

        match result {
            Ok(report) => Some(report),
            Err(e) => {
                error!("job monitor run failed with: {}", e);
                None
            }
        }
    }

    pub async fn monitor_loop(&self) {
        // Runs never overlap: the next tick waits for the current run to finish
        let mut interval = tokio::time::interval(self.sleep_delay);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("Starting job monitor, running every {:?}", self.sleep_delay);
        loop {
            interval.tick().await;
            self.run_once().await;
        }
    }
}
