//! End-to-end tests against the live Gemini API.
//!
//! These use real bills in `./test_cases/` and make live model calls. They are
//! gated behind `E2E_ENABLED` so they never run in CI unless asked for.
//!
//! Run with:
//!   E2E_ENABLED=1 GEMINI_API_KEY=... cargo test --test e2e -- --nocapture
//!
//! PDF tests also need pdfium (`PDFIUM_LIB_PATH=/dir/with/libpdfium`) and
//! benefit from tesseract on `PATH`.

use edgequake_bill_extract::{
    BillExtractor, ChunkFailurePolicy, DocumentExtraction, ExtractionConfig, GeminiConfig,
    GeminiModel, TesseractOcr,
};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* no file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn live_extractor(policy: ChunkFailurePolicy) -> BillExtractor {
    let config = ExtractionConfig::builder()
        .chunk_failure_policy(policy)
        .audit_log_path(Some(output_dir().join("e2e_audit.jsonl")))
        .build()
        .expect("valid config");
    BillExtractor::new(
        Arc::new(GeminiModel::new(GeminiConfig::from_env())),
        Arc::new(TesseractOcr::default()),
        config,
    )
}

/// Structural checks every successful extraction must pass.
fn assert_extraction_sane(out: &DocumentExtraction, context: &str) {
    assert!(
        !out.data.pagewise_line_items.is_empty(),
        "[{context}] no pages extracted"
    );
    assert_eq!(
        out.data.total_item_count,
        out.data.counted_items(),
        "[{context}] total_item_count must match the extracted items"
    );
    for page in &out.data.pagewise_line_items {
        for item in &page.bill_items {
            assert!(!item.item_name.trim().is_empty(), "[{context}] empty item name");
        }
    }
    assert!(out.token_usage.total_tokens > 0, "[{context}] no token usage");
    assert_eq!(
        out.token_usage.total_tokens,
        out.token_usage.input_tokens + out.token_usage.output_tokens,
        "[{context}] usage counters disagree"
    );

    let json = serde_json::to_string_pretty(&out.data).unwrap_or_default();
    std::fs::write(output_dir().join(format!("{context}.json")), json).ok();
    println!(
        "[{context}] ✓  {} items on {} pages, {} tokens",
        out.data.total_item_count,
        out.data.pagewise_line_items.len(),
        out.token_usage.total_tokens
    );
}

// ── Live extraction tests ────────────────────────────────────────────────────

#[tokio::test]
async fn test_extract_single_image_bill() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("pharmacy_bill.jpg"));

    let out = live_extractor(ChunkFailurePolicy::WholeDocument)
        .extract(path.to_str().unwrap())
        .await
        .expect("extraction should succeed");

    assert_eq!(out.chunks, 1);
    assert_extraction_sane(&out, "pharmacy_bill");
}

#[tokio::test]
async fn test_extract_two_page_pdf_is_not_split() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("hospital_bill_2p.pdf"));

    let out = live_extractor(ChunkFailurePolicy::WholeDocument)
        .extract(path.to_str().unwrap())
        .await
        .expect("extraction should succeed");

    assert_eq!(out.chunks, 1, "2-page documents are processed whole");
    assert_extraction_sane(&out, "hospital_bill_2p");
}

#[tokio::test]
async fn test_extract_multi_page_pdf_is_split() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("hospital_bill_5p.pdf"));

    let out = live_extractor(ChunkFailurePolicy::PartialResults)
        .extract(path.to_str().unwrap())
        .await
        .expect("extraction should succeed");

    assert_eq!(out.chunks, 5, "5-page documents are split per page");
    assert!(out.failed_pages.is_empty(), "failed: {:?}", out.failed_pages);
    assert_extraction_sane(&out, "hospital_bill_5p");
}

#[tokio::test]
async fn test_extract_from_url() {
    let url = match std::env::var("E2E_BILL_URL") {
        Ok(url) if std::env::var("E2E_ENABLED").is_ok() => url,
        _ => {
            println!("SKIP: set E2E_ENABLED=1 and E2E_BILL_URL to run");
            return;
        }
    };

    let out = live_extractor(ChunkFailurePolicy::WholeDocument)
        .extract(&url)
        .await
        .expect("extraction should succeed");

    assert_extraction_sane(&out, "url_bill");
}

#[tokio::test]
async fn test_download_404_is_fetch_error() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }

    let err = live_extractor(ChunkFailurePolicy::WholeDocument)
        .extract("https://httpbin.org/status/404")
        .await
        .expect_err("404 must fail");
    assert!(
        err.to_string().starts_with("Failed to download file"),
        "got: {err}"
    );
}
