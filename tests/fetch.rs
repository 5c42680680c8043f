//! Download tests against a local axum server on an ephemeral port.

#![cfg(feature = "server")]

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use axum::routing::get;
use axum::Router;
use edgequake_bill_extract::pipeline::input::{fetch_document, FetchedDocument};
use edgequake_bill_extract::{
    BillExtractError, BillExtractor, DocumentKind, DocumentModel, DocumentSource,
    ExtractionConfig, ModelError, ModelReply, OcrEngine, OcrError, TokenUsage, UploadedDocument,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const PDF_BODY: &str = "%PDF-1.4 downloaded bill";
const PNG_BODY: &str = "png bill bytes";

fn bills() -> Router {
    Router::new()
        .route(
            "/bills/pharmacy.png",
            get(|| async { ([(header::CONTENT_TYPE, "text/plain")], PNG_BODY) }),
        )
        .route(
            "/download",
            get(|| async { ([(header::CONTENT_TYPE, "application/pdf; charset=binary")], PDF_BODY) }),
        )
        .route(
            "/blob",
            get(|| async { ([(header::CONTENT_TYPE, "application/octet-stream")], "FAIL blob") }),
        )
        .route(
            "/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
}

/// Serve `router` on 127.0.0.1 and return its base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

// ── fetch_document ───────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_url_is_fetch_failed() {
    let base = serve(bills()).await;
    let url = format!("{base}/no/such/bill.pdf");

    let err = fetch_document(&url, 5).await.unwrap_err();
    match &err {
        BillExtractError::FetchFailed { url: failed, reason } => {
            assert_eq!(failed, &url);
            assert!(reason.contains("404"), "got: {reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().starts_with("Failed to download file"));
}

#[tokio::test]
async fn server_error_is_fetch_failed() {
    let base = serve(bills()).await;
    let err = fetch_document(&format!("{base}/broken"), 5).await.unwrap_err();
    assert!(matches!(err, BillExtractError::FetchFailed { .. }), "got {err}");
}

#[tokio::test]
async fn extensionless_url_uses_content_type() {
    let base = serve(bills()).await;
    let fetched = fetch_document(&format!("{base}/download"), 5).await.unwrap();

    assert!(matches!(fetched, FetchedDocument::Downloaded { .. }));
    assert_eq!(fetched.detected_kind(), Some(DocumentKind::Pdf));
    assert_eq!(
        fetched.path().extension().and_then(|e| e.to_str()),
        Some("pdf")
    );
    assert_eq!(std::fs::read_to_string(fetched.path()).unwrap(), PDF_BODY);

    let path = fetched.path().to_path_buf();
    fetched.cleanup();
    assert!(!path.exists());
}

#[tokio::test]
async fn url_extension_wins_over_content_type() {
    let base = serve(bills()).await;
    let fetched = fetch_document(&format!("{base}/bills/pharmacy.png"), 5)
        .await
        .unwrap();
    assert_eq!(fetched.kind(), DocumentKind::Png);
    assert_eq!(std::fs::read_to_string(fetched.path()).unwrap(), PNG_BODY);
}

#[tokio::test]
async fn unknown_type_defaults_to_jpeg() {
    let base = serve(bills()).await;
    let fetched = fetch_document(&format!("{base}/blob"), 5).await.unwrap();
    assert_eq!(fetched.detected_kind(), None);
    assert_eq!(fetched.kind(), DocumentKind::Jpeg);
}

// ── Cleanup through BillExtractor ────────────────────────────────────────────

/// Records the path of every uploaded document; fails on `FAIL` content.
#[derive(Default)]
struct RecordingModel {
    uploads: Mutex<Vec<(PathBuf, String)>>,
}

#[async_trait]
impl DocumentModel for RecordingModel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn upload(&self, path: &Path, kind: DocumentKind) -> Result<UploadedDocument, ModelError> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        self.uploads
            .lock()
            .unwrap()
            .push((path.to_path_buf(), content.clone()));
        Ok(UploadedDocument {
            mime_type: kind.mime_type().into(),
            display_name: "doc".into(),
            source: DocumentSource::InlineBase64(content),
        })
    }

    async fn generate(&self, _: &str, doc: &UploadedDocument) -> Result<ModelReply, ModelError> {
        let DocumentSource::InlineBase64(content) = &doc.source else {
            unreachable!("recording upload only produces inline documents");
        };
        let text = if content.contains("FAIL") {
            "no json here".to_string()
        } else {
            r#"{"pagewise_line_items":[{"page_no":"1","page_type":"Pharmacy","bill_items":[["Dolo 650",30.0,10.0,3]]}],"total_item_count":1}"#.to_string()
        };
        Ok(ModelReply {
            text,
            usage: TokenUsage {
                total_tokens: 12,
                input_tokens: 10,
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

fn extractor(model: &Arc<RecordingModel>) -> BillExtractor {
    let config = ExtractionConfig::builder()
        .audit_log_path(None)
        .build()
        .unwrap();
    BillExtractor::new(model.clone(), Arc::new(NoOcr), config)
}

#[tokio::test]
async fn downloaded_file_is_removed_after_extraction() {
    let base = serve(bills()).await;
    let model = Arc::new(RecordingModel::default());

    let out = extractor(&model)
        .extract(&format!("{base}/bills/pharmacy.png"))
        .await
        .unwrap();
    assert_eq!(out.data.total_item_count, 1);

    let uploads = model.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    let (path, content) = &uploads[0];
    assert_eq!(content, PNG_BODY, "the model saw the downloaded bytes");
    assert!(!path.exists(), "{} should be deleted", path.display());
}

#[tokio::test]
async fn downloaded_file_is_removed_after_failure() {
    let base = serve(bills()).await;
    let model = Arc::new(RecordingModel::default());

    let err = extractor(&model)
        .extract(&format!("{base}/blob"))
        .await
        .unwrap_err();
    assert!(matches!(err, BillExtractError::ExtractionFailed { .. }), "got {err}");

    let uploads = model.uploads.lock().unwrap();
    let (path, _) = &uploads[0];
    assert!(!path.exists(), "{} should be deleted", path.display());
}
