use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use eyre::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::app_context::AppContext;

pub async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

async fn index() -> &'static str {
    "job monitor"
}

async fn liveness(State(context): State<Arc<AppContext>>) -> Response {
    context.health.get_status().into_response()
}

pub fn app(context: Arc<AppContext>) -> Router {
    let metrics_enabled = context.metrics;
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(liveness));

    // Installing the recorder touches global state, so tests leave it off
    let router = if metrics_enabled {
        let recorder_handle = setup_metrics_recorder();
        router.route(
            "/metrics",
            get(move || std::future::ready(recorder_handle.render())),
        )
    } else {
        router
    };

    router.with_state(context)
}

pub fn setup_metrics_recorder() -> PrometheusHandle {
    const BUCKETS: &[f64] = &[
        1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(BUCKETS)
        .expect("histogram buckets are not empty")
        .install_recorder()
        .expect("failed to install prometheus recorder")
}
