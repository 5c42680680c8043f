//! Router tests driven through `tower::ServiceExt::oneshot`.

#![cfg(feature = "server")]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use edgequake_bill_extract::server::{create_router, AppState, ExtractResponse};
use edgequake_bill_extract::{
    BillExtractor, DocumentKind, DocumentModel, DocumentSource, ExtractionConfig, ModelError,
    ModelReply, OcrEngine, OcrError, TokenUsage, UploadedDocument,
};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

struct OneItemModel {
    configured: bool,
}

#[async_trait]
impl DocumentModel for OneItemModel {
    fn name(&self) -> &str {
        "one-item"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn upload(&self, _: &Path, kind: DocumentKind) -> Result<UploadedDocument, ModelError> {
        if !self.configured {
            return Err(ModelError::NotConfigured {
                provider: "one-item".into(),
                hint: "GEMINI_API_KEY is not set".into(),
            });
        }
        Ok(UploadedDocument {
            mime_type: kind.mime_type().into(),
            display_name: "doc".into(),
            source: DocumentSource::FileUri("mem://doc".into()),
        })
    }

    async fn generate(&self, _: &str, _: &UploadedDocument) -> Result<ModelReply, ModelError> {
        Ok(ModelReply {
            text: r#"{"pagewise_line_items":[{"page_no":"1","page_type":"Bill Detail","bill_items":[["Room Rent",1200.0,1200.0,1]]}],"total_item_count":1}"#.into(),
            usage: TokenUsage {
                total_tokens: 42,
                input_tokens: 40,
                output_tokens: 2,
            },
        })
    }
}

struct NoOcr;

impl OcrEngine for NoOcr {
    fn extract_text(&self, _: &Path, _: DocumentKind) -> Result<String, OcrError> {
        Ok(String::new())
    }
}

fn app(configured: bool) -> axum::Router {
    let config = ExtractionConfig::builder().audit_log_path(None).build().unwrap();
    let extractor = BillExtractor::new(
        Arc::new(OneItemModel { configured }),
        Arc::new(NoOcr),
        config,
    );
    create_router(AppState::new(extractor))
}

async fn post_extract(app: axum::Router, body: String) -> (StatusCode, ExtractResponse) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/extract-bill-data")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn extract_success_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bill.jpg");
    std::fs::write(&path, b"jpeg bytes").unwrap();

    let body = serde_json::json!({ "document": path.to_string_lossy() }).to_string();
    let (status, envelope) = post_extract(app(true), body).await;

    assert_eq!(status, StatusCode::OK);
    assert!(envelope.is_success);
    assert!(envelope.message.is_none());
    assert_eq!(envelope.token_usage.unwrap().total_tokens, 42);
    let data = envelope.data.unwrap();
    assert_eq!(data.total_item_count, 1);
    assert_eq!(data.pagewise_line_items[0].bill_items[0].item_name, "Room Rent");
}

#[tokio::test]
async fn pipeline_failure_is_still_http_200() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bill.png");
    std::fs::write(&path, b"png bytes").unwrap();

    let body = serde_json::json!({ "document": path.to_string_lossy() }).to_string();
    let (status, envelope) = post_extract(app(false), body).await;

    assert_eq!(status, StatusCode::OK);
    assert!(!envelope.is_success);
    assert!(envelope.data.is_none());
    assert!(envelope.token_usage.is_none());
    let message = envelope.message.unwrap();
    assert!(message.starts_with("Failed to process document. "), "got: {message}");
    assert!(message.contains("GEMINI_API_KEY"));
}

#[tokio::test]
async fn missing_document_is_a_failure_envelope() {
    let body = r#"{"document": "/no/such/bill.pdf"}"#.to_string();
    let (status, envelope) = post_extract(app(true), body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!envelope.is_success);
    assert!(envelope.message.unwrap().contains("not found"));
}

#[tokio::test]
async fn malformed_body_is_a_failure_envelope() {
    let (status, envelope) = post_extract(app(true), r#"{"doc": 1}"#.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!envelope.is_success);
    assert!(envelope
        .message
        .unwrap()
        .starts_with("Failed to process document. Invalid request body"));
}

#[tokio::test]
async fn health_reports_model() {
    let response = app(false)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["model"], "one-item");
    assert_eq!(json["model_configured"], false);
}
