use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::app::errors;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, Copy)]
pub struct RequestPolicy {
    pub timeout: Duration,
}

/// Tags every request with an id, logs its outcome, and bounds how long the
/// handler may run. A request that overruns gets a 503 and its handler future
/// is dropped.
pub async fn request_middleware(
    State(policy): State<RequestPolicy>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let request_id = Uuid::now_v7();
    let span = info_span!(
        "http_request",
        %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    let started = Instant::now();

    let mut response = match tokio::time::timeout(policy.timeout, next.run(req))
        .instrument(span.clone())
        .await
    {
        Ok(response) => response,
        Err(_) => {
            span.in_scope(|| {
                warn!(
                    timeout_ms = policy.timeout.as_millis() as u64,
                    "request deadline exceeded"
                )
            });
            errors::deadline_exceeded()
        }
    };

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    span.in_scope(|| {
        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        )
    });

    response
}
