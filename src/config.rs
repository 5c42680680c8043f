//! Configuration types for bill extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built via
//! [`ExtractionConfigBuilder`]. The model client itself is not part of the
//! config: it is constructed once at startup and handed to
//! [`crate::BillExtractor::new`] alongside it.

use crate::error::BillExtractError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for document extraction.
///
/// # Example
/// ```rust
/// use edgequake_bill_extract::{ChunkFailurePolicy, ExtractionConfig};
///
/// let config = ExtractionConfig::builder()
///     .split_threshold(4)
///     .chunk_failure_policy(ChunkFailurePolicy::PartialResults)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 3);
/// ```
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// PDFs with more pages than this are split into single-page chunks. Default: 2.
    ///
    /// The remote model gets less reliable as page count grows, and a single
    /// page bounds how much one bad response can cost.
    pub split_threshold: usize,

    /// Maximum number of single-page chunks in flight at once. Default: 10.
    pub chunk_concurrency: usize,

    /// Generation attempts per document or chunk, including the first. Default: 3.
    pub max_attempts: u32,

    /// Initial delay between attempts in milliseconds, doubled after each
    /// failure. Default: 0 (retry immediately).
    pub retry_backoff_ms: u64,

    /// Upper bound on a single generation call. Default: 120.
    pub attempt_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// What to do when a chunk fails after all attempts. Default: [`ChunkFailurePolicy::WholeDocument`].
    pub chunk_failure_policy: ChunkFailurePolicy,

    /// Append-only audit file receiving every prompt/response pair.
    /// `None` disables auditing. Default: `debug_log.txt`.
    pub audit_log_path: Option<PathBuf>,

    /// OCR engine settings.
    pub ocr: OcrConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            split_threshold: 2,
            chunk_concurrency: 10,
            max_attempts: 3,
            retry_backoff_ms: 0,
            attempt_timeout_secs: 120,
            download_timeout_secs: 120,
            chunk_failure_policy: ChunkFailurePolicy::default(),
            audit_log_path: Some(PathBuf::from("debug_log.txt")),
            ocr: OcrConfig::default(),
        }
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Settings for the default tesseract-backed OCR engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Tesseract executable; resolved through `PATH` when not absolute.
    pub tesseract_path: String,
    /// Tesseract language code(s), e.g. `eng` or `eng+hin`.
    pub language: String,
    /// Longest edge of rasterised PDF pages, in pixels. Default: 2000.
    pub max_rendered_pixels: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: "tesseract".to_string(),
            language: "eng".to_string(),
            max_rendered_pixels: 2000,
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn split_threshold(mut self, pages: usize) -> Self {
        self.config.split_threshold = pages;
        self
    }

    pub fn chunk_concurrency(mut self, n: usize) -> Self {
        self.config.chunk_concurrency = n.max(1);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn attempt_timeout_secs(mut self, secs: u64) -> Self {
        self.config.attempt_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn chunk_failure_policy(mut self, policy: ChunkFailurePolicy) -> Self {
        self.config.chunk_failure_policy = policy;
        self
    }

    pub fn audit_log_path(mut self, path: Option<PathBuf>) -> Self {
        self.config.audit_log_path = path;
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<String>) -> Self {
        self.config.ocr.tesseract_path = path.into();
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr.language = lang.into();
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.ocr.max_rendered_pixels = px.max(100);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, BillExtractError> {
        let c = &self.config;
        if c.split_threshold == 0 {
            return Err(BillExtractError::InvalidConfig(
                "Split threshold must be ≥ 1".into(),
            ));
        }
        if c.max_attempts == 0 {
            return Err(BillExtractError::InvalidConfig(
                "Max attempts must be ≥ 1".into(),
            ));
        }
        if c.attempt_timeout_secs == 0 || c.download_timeout_secs == 0 {
            return Err(BillExtractError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Behaviour when one chunk of a split PDF fails after every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChunkFailurePolicy {
    /// Discard all chunk results and reprocess the whole document as a single
    /// unit. (default)
    #[default]
    WholeDocument,
    /// Fail the request with the first chunk error.
    FailRequest,
    /// Return the pages that succeeded and report the ones that did not.
    PartialResults,
}
