//! HTTP surface: `GET /health` and `POST /generate-pdf`.

mod error;
mod handlers;
mod middleware;
mod models;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

pub use error::ApiError;
pub use middleware::{REQUEST_ID_HEADER, RequestContext};
pub use models::{ErrorBody, GeneratePdfRequest, GeneratePdfResponse, HealthResponse};

use crate::application::pdf::PdfService;
use middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub pdf: Arc<PdfService>,
    pub service_name: Arc<str>,
}

impl HttpState {
    pub fn new(pdf: Arc<PdfService>, service_name: impl Into<Arc<str>>) -> Self {
        Self {
            pdf,
            service_name: service_name.into(),
        }
    }
}

pub fn build_router(state: HttpState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/generate-pdf", post(handlers::generate_pdf))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
