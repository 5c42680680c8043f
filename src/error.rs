//! Error types for the edgequake-bill-extract library.
//!
//! Failures fall into two tiers:
//!
//! * [`BillExtractError`]: **Fatal**: the document cannot be processed at
//!   all (download failed, every extraction attempt failed, provider not
//!   configured). Returned as `Err` from [`crate::BillExtractor`] and turned
//!   into a failure envelope by the HTTP layer.
//!
//! * [`ChunkError`]: **Non-fatal**: one single-page chunk of a split PDF
//!   failed after all attempts. What happens next is decided by
//!   [`crate::config::ChunkFailurePolicy`].
//!
//! [`ModelError`] is the error type of the [`crate::DocumentModel`] seam and
//! [`OcrError`] never leaves the OCR stage (it degrades to placeholder text).

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-bill-extract library.
#[derive(Debug, Error)]
pub enum BillExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The input string is neither an existing path nor an HTTP/HTTPS URL.
    #[error("Invalid document reference '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// Download failed: non-2xx status, connection error, or broken stream.
    #[error("Failed to download file: {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Failed to download file: {url}: timed out after {secs}s")]
    FetchTimeout { url: String, secs: u64 },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/dir-containing-libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// A single-page chunk could not be written.
    #[error("Failed to write chunk for page {page}: {detail}")]
    ChunkWriteFailed { page: usize, detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The document could not be handed to the model (upload / staging).
    #[error("Document upload failed: {0}")]
    UploadFailed(#[source] ModelError),

    /// Every extraction attempt failed; carries the last attempt's diagnostic.
    #[error("Extraction failed after {attempts} attempts: {last_error}")]
    ExtractionFailed { attempts: u32, last_error: String },

    /// A chunk failed and the configured policy is to fail the whole request.
    #[error("{0}")]
    ChunkFailed(ChunkError),

    /// Every chunk of a split document failed.
    #[error("All {total} pages failed extraction. First error: {first_error}")]
    AllChunksFailed { total: usize, first_error: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (temp file creation, task join failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of one single-page chunk.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[error("Page {page}: extraction failed: {detail}")]
pub struct ChunkError {
    /// 1-based page number in the original document.
    pub page: usize,
    pub detail: String,
}

/// Errors surfaced by a [`crate::DocumentModel`] implementation.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The provider has no credentials or is otherwise unusable.
    #[error("Model provider '{provider}' is not configured: {hint}")]
    NotConfigured { provider: String, hint: String },

    /// The provider answered with a non-success HTTP status.
    #[error("Model API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// Connection, TLS or body-decoding failure.
    #[error("Model transport error: {0}")]
    Transport(String),

    /// The provider answered 2xx but the payload lacked an expected field.
    #[error("Unexpected model response: {0}")]
    InvalidResponse(String),

    /// Reading the local document failed.
    #[error("Failed to read document '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        ModelError::Transport(e.to_string())
    }
}

/// OCR failure. Never propagated past [`crate::pipeline::ocr`].
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("failed to launch OCR engine '{engine}': {source}")]
    Launch {
        engine: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OCR engine exited with {status}: {stderr}")]
    EngineFailed { status: String, stderr: String },

    #[error("PDF rasterisation failed: {0}")]
    Render(String),

    #[error("failed to stage page image: {0}")]
    Io(#[from] std::io::Error),
}
