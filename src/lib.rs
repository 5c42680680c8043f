//! # edgequake-bill-extract
//!
//! Extract structured line items (name, amount, rate, quantity) from scanned
//! bills and invoices using local OCR plus a hosted multimodal model.
//!
//! ## Why this crate?
//!
//! OCR alone garbles bill tables: columns drift, amounts attach to the wrong
//! row, subtotal lines look like items. A multimodal model reads the page the
//! way a person does, but it is slow, occasionally wrong about JSON syntax and
//! degrades on long documents. This crate wraps the model in the plumbing it
//! needs: OCR text as a hint, per-page chunking, retries, response repair and
//! a strict output schema.
//!
//! ## Pipeline Overview
//!
//! ```text
//! URL / path
//!  │
//!  ├─ 1. Fetch     download to a temp file, infer PDF / JPEG / PNG
//!  ├─ 2. Split     PDFs over the threshold → single-page chunks (pdfium)
//!  ├─ 3. Extract   per chunk: upload ∥ OCR, prompt, generate, repair, normalise
//!  ├─ 4. Aggregate concatenate pages, recount items, sum token usage
//!  └─ 5. Envelope  {is_success, token_usage, data, message}
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_bill_extract::{BillExtractor, ExtractionConfig, GeminiConfig, GeminiModel, TesseractOcr};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key from GEMINI_API_KEY
//!     let extractor = BillExtractor::new(
//!         Arc::new(GeminiModel::new(GeminiConfig::from_env())),
//!         Arc::new(TesseractOcr::default()),
//!         ExtractionConfig::default(),
//!     );
//!     let out = extractor.extract("https://example.com/bill.pdf").await?;
//!     for page in &out.data.pagewise_line_items {
//!         println!("page {} ({}): {} items", page.page_no, page.page_type, page.bill_items.len());
//!     }
//!     eprintln!("tokens: {}", out.token_usage.total_tokens);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | HTTP API ([`server`]) and the `bill-extract` binary (axum + clap + tracing-subscriber) |
//!
//! Disable `server` when embedding the library:
//! ```toml
//! edgequake-bill-extract = { version = "0.1", default-features = false }
//! ```
//!
//! ## External Tools
//!
//! * **pdfium**: page counting, splitting and rasterisation. Bound from
//!   `PDFIUM_LIB_PATH` or the system library path.
//! * **tesseract**: OCR hints. Optional: when it is missing, extraction
//!   continues with placeholder OCR text.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod audit;
pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod providers;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use audit::AuditLog;
pub use config::{ChunkFailurePolicy, ExtractionConfig, ExtractionConfigBuilder, OcrConfig};
pub use error::{BillExtractError, ChunkError, ModelError, OcrError};
pub use extract::BillExtractor;
pub use output::{
    BillItem, ChunkExtraction, DocumentExtraction, ExtractionResult, PageResult, PageType,
    TokenUsage,
};
pub use pipeline::input::DocumentKind;
pub use pipeline::ocr::{OcrEngine, TesseractOcr};
pub use providers::{
    DocumentModel, DocumentSource, GeminiConfig, GeminiModel, ModelReply, ProviderModel,
    UploadedDocument,
};
