use crate::context::ScrapeContext;
use crate::server::state::AppState;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let ctx = match state.configuration.scrape.timeout {
        Some(timeout) => ScrapeContext::background().with_timeout(timeout),
        None => ScrapeContext::background(),
    };

    match state.exporter.scrape(&ctx).await {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
