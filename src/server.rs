//! HTTP surface.
//!
//! `POST /extract-bill-data` always answers HTTP 200; success or failure is
//! carried by the envelope's `is_success`. `GET /health` is a liveness probe.

use crate::extract::BillExtractor;
use crate::output::{DocumentExtraction, ExtractionResult, TokenUsage};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Prefix of every failure message.
pub const FAILURE_PREFIX: &str = "Failed to process document.";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    extractor: Arc<BillExtractor>,
}

impl AppState {
    pub fn new(extractor: BillExtractor) -> Self {
        Self {
            extractor: Arc::new(extractor),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    /// URL (or, for local use, a path) of the bill.
    pub document: String,
}

/// Response envelope. Absent fields serialise as `null`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ExtractResponse {
    pub is_success: bool,
    pub token_usage: Option<TokenUsage>,
    pub data: Option<ExtractionResult>,
    pub message: Option<String>,
}

impl ExtractResponse {
    pub fn success(out: DocumentExtraction) -> Self {
        let message = if out.failed_pages.is_empty() {
            None
        } else {
            let failed: Vec<String> = out.failed_pages.iter().map(|e| e.to_string()).collect();
            Some(format!(
                "Partial results: {} of {} pages failed. {}",
                out.failed_pages.len(),
                out.chunks,
                failed.join("; ")
            ))
        };
        Self {
            is_success: true,
            token_usage: Some(out.token_usage),
            data: Some(out.data),
            message,
        }
    }

    pub fn failure(diagnostic: impl Display) -> Self {
        Self {
            is_success: false,
            token_usage: None,
            data: None,
            message: Some(format!("{FAILURE_PREFIX} {diagnostic}")),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub model_configured: bool,
    pub version: String,
}

/// POST /extract-bill-data
pub async fn extract_bill_data(
    State(state): State<AppState>,
    body: Result<Json<ExtractRequest>, JsonRejection>,
) -> Json<ExtractResponse> {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected request body: {}", rejection.body_text());
            return Json(ExtractResponse::failure(format!(
                "Invalid request body: {}",
                rejection.body_text()
            )));
        }
    };

    info!("Extraction requested for {}", request.document);
    let response = match state.extractor.extract(&request.document).await {
        Ok(out) => ExtractResponse::success(out),
        Err(e) => ExtractResponse::failure(e),
    };
    Json(response)
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let model = state.extractor.model();
    Json(HealthResponse {
        status: "healthy".to_string(),
        model: model.name().to_string(),
        model_configured: model.is_configured(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Routes without middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/extract-bill-data", post(extract_bill_data))
        .with_state(state)
}

/// Routes plus request tracing.
pub fn create_server(state: AppState) -> Router {
    create_router(state).layer(TraceLayer::new_for_http())
}
