mod error;
mod handlers;
mod middleware;

pub use error::ApiError;
pub use middleware::RequestContext;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};

use crate::config::Settings;

use self::middleware::{log_responses, set_request_context};

/// Shared state for the conversion endpoints. Settings are immutable after
/// startup, so a single Arc covers every handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
}

pub fn build_router(settings: Arc<Settings>) -> Router {
    let max_request_bytes = settings.limits.max_request_bytes.get() as usize;
    let state = AppState { settings };

    Router::new()
        .route("/csv2json", post(handlers::csv_to_json))
        .route("/json2csv", post(handlers::json_to_csv))
        .route("/md2html", post(handlers::markdown_to_html))
        .route("/html2pdf", post(handlers::html_to_pdf))
        .route("/dbf2json", post(handlers::dbf_to_json))
        .route("/url2pdf", post(handlers::url_to_pdf))
        .route("/url2jpg", post(handlers::url_to_jpeg))
        .route("/_health", get(handlers::health))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
        .with_state(state)
}
