use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use holdings_infra::ConsumerStatsSnapshot;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/metrics", get(metrics))
}

pub async fn healthcheck() -> Json<dto::HealthResponse> {
    Json(dto::HealthResponse {
        status: "available",
    })
}

/// Consumer counters in the Prometheus text exposition format.
pub async fn metrics(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        render_metrics(&services.consumer_stats.snapshot()),
    )
}

fn render_metrics(stats: &ConsumerStatsSnapshot) -> String {
    let counters = [
        ("received", "Deliveries taken off the user-updated subscription.", stats.received),
        ("reconciled", "Deliveries applied to the user replica.", stats.reconciled),
        ("decode_failures", "Deliveries that were not valid user-updated payloads.", stats.decode_failures),
        ("reconcile_failures", "Deliveries the replica store rejected or failed.", stats.reconcile_failures),
        ("dead_lettered", "Failed deliveries handed to the dead-letter sink.", stats.dead_lettered),
        ("abandoned", "Reconciliations aborted when the shutdown drain timed out.", stats.abandoned),
    ];

    let mut body = String::new();
    for (name, help, value) in counters {
        body.push_str(&format!(
            "# HELP holdings_consumer_{name}_total {help}\n\
             # TYPE holdings_consumer_{name}_total counter\n\
             holdings_consumer_{name}_total {value}\n"
        ));
    }
    body
}

pub async fn not_found() -> axum::response::Response {
    errors::not_found()
}

pub async fn method_not_allowed(method: Method) -> axum::response::Response {
    errors::json_error(
        StatusCode::METHOD_NOT_ALLOWED,
        "method_not_allowed",
        format!("the {method} method is not supported for this resource"),
    )
}
