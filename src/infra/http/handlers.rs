use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use metrics::counter;

use crate::{
    application::pdf::METRIC_REQUESTS_TOTAL,
    infra::http::{
        HttpState,
        error::ApiError,
        models::{GeneratePdfRequest, GeneratePdfResponse, HealthResponse},
    },
};

pub(super) async fn health(State(state): State<HttpState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: state.service_name.to_string(),
    })
}

pub(super) async fn generate_pdf(
    State(state): State<HttpState>,
    payload: Result<Json<GeneratePdfRequest>, JsonRejection>,
) -> Result<Json<GeneratePdfResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        counter!(METRIC_REQUESTS_TOTAL, "outcome" => "invalid").increment(1);
        ApiError::from_json_rejection(rejection)
    })?;

    let (request, result) = state.pdf.generate(payload.html, payload.filename).await?;
    Ok(Json(GeneratePdfResponse::new(request.filename(), result)))
}

pub(super) async fn not_found() -> ApiError {
    ApiError::not_found()
}
