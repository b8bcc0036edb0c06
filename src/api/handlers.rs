use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::core::metrics;
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::{HealthResponse, RootResponse};

pub(crate) async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: state.settings().api().project_name.clone(),
        version: state.settings().api().version.clone(),
        api_prefix: state.settings().api().api_v1_str.clone(),
    })
}

pub(crate) async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();

    let status = match repositories::health::database_ready(state.db()).await {
        Ok(true) => {
            components.insert("database".to_string(), "healthy".to_string());
            "healthy"
        }
        Ok(false) => {
            components.insert("database".to_string(), "unexpected probe result".to_string());
            "unhealthy"
        }
        Err(err) => {
            tracing::warn!(error = %err, "Database health probe failed");
            components.insert("database".to_string(), format!("unhealthy: {err}"));
            "unhealthy"
        }
    };

    components.insert(
        "storage".to_string(),
        if state.storage().is_some() { "configured" } else { "disabled" }.to_string(),
    );
    components.insert(
        "ocr".to_string(),
        if state.text_recognizer().is_some() { "enabled" } else { "disabled" }.to_string(),
    );

    let code = if status == "healthy" { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        code,
        Json(HealthResponse {
            service: "gabarito-api".to_string(),
            status: status.to_string(),
            components,
        }),
    )
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
