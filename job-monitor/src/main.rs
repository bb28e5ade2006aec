use std::sync::Arc;

use envconfig::Envconfig;
use job_monitor::{
    app_context::AppContext,
    config::Config,
    http::{app, listen},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = Config::init_from_env().expect("failed to load configuration from env");

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.monitor_log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        "Starting job monitor for table {} with queues {:?}",
        config.job_table,
        config.queues()
    );

    // If the config or the database is broken there is nothing useful we can do, so just die
    let context = Arc::new(
        AppContext::new(&config)
            .await
            .expect("failed to create job monitor"),
    );

    let monitor_context = context.clone();
    let monitor_loop = tokio::spawn(async move { monitor_context.monitor_loop().await });

    let http_server = tokio::spawn(listen(app(context), config.bind()));

    tokio::select! {
        res = monitor_loop => {
            error!("monitor loop exited");
            if let Err(e) = res {
                error!("monitor failed with: {}", e)
            }
        }
        res = http_server => {
            error!("http server exited");
            match res {
                Ok(Err(e)) => error!("server failed with: {}", e),
                Err(e) => error!("server task failed with: {}", e),
                Ok(Ok(())) => {}
            }
        }
    }

    info!("exiting");
}
