//! Extraction Client: one document (or one single-page chunk) in, one
//! normalised [`ChunkExtraction`] out.
//!
//! ## Flow
//!
//! 1. Upload the document and produce OCR context **concurrently**. OCR never
//!    fails (it degrades to placeholder text); an upload failure, including
//!    one that outlasts the per-attempt timeout, is terminal and is not
//!    retried.
//! 2. Build the prompt once.
//! 3. Up to `max_attempts` times: generate (bounded by the per-attempt
//!    timeout), audit the raw reply, repair-parse it, normalise it. Any
//!    failure in this step is audited and retried.
//!
//! ## Backoff
//!
//! `retry_backoff_ms * 2^(retry-1)` before each retry, saturating; `0` (the
//! default) retries immediately.
//!
//! Token usage covers every attempt that got a reply, including the ones
//! whose reply could not be parsed.

use crate::audit::{AuditEvent, AuditLog};
use crate::config::ExtractionConfig;
use crate::error::{BillExtractError, ModelError};
use crate::output::{ChunkExtraction, TokenUsage};
use crate::pipeline::input::DocumentKind;
use crate::pipeline::normalize::{normalize_extraction, pin_page_numbers, SchemaError};
use crate::pipeline::ocr::{self, OcrEngine};
use crate::pipeline::repair::{parse_model_json, JsonParseError};
use crate::prompts::build_extraction_prompt;
use crate::providers::{DocumentModel, UploadedDocument};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Why a single generation attempt failed.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("model call failed: {0}")]
    Model(#[from] ModelError),

    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error(transparent)]
    Parse(#[from] JsonParseError),

    #[error("unexpected response shape: {0}")]
    Schema(#[from] SchemaError),
}

/// What to extract: a local file plus the page number its first page has in
/// the original document.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionJob<'a> {
    pub path: &'a Path,
    pub kind: DocumentKind,
    pub first_page_no: usize,
    /// Page numbers come from `first_page_no`, not from the model.
    pub pin_pages: bool,
}

impl<'a> ExtractionJob<'a> {
    /// A whole document, numbered from page 1.
    pub fn whole(path: &'a Path, kind: DocumentKind) -> Self {
        Self {
            path,
            kind,
            first_page_no: 1,
            pin_pages: false,
        }
    }

    /// One single-page PDF chunk.
    pub fn chunk(path: &'a Path, page_no: usize) -> Self {
        Self {
            path,
            kind: DocumentKind::Pdf,
            first_page_no: page_no,
            pin_pages: true,
        }
    }

    fn label(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());
        format!("{}#p{}", name, self.first_page_no)
    }
}

/// The model, the OCR engine and the audit log, shared by every job.
#[derive(Clone)]
pub struct ExtractionClient {
    model: Arc<dyn DocumentModel>,
    ocr: Arc<dyn OcrEngine>,
    audit: AuditLog,
}

impl ExtractionClient {
    pub fn new(model: Arc<dyn DocumentModel>, ocr: Arc<dyn OcrEngine>, audit: AuditLog) -> Self {
        Self { model, ocr, audit }
    }

    pub fn model(&self) -> &Arc<dyn DocumentModel> {
        &self.model
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Run the full upload → OCR → prompt → generate/parse loop for one job.
    pub async fn extract(
        &self,
        config: &ExtractionConfig,
        job: ExtractionJob<'_>,
    ) -> Result<ChunkExtraction, BillExtractError> {
        let start = Instant::now();
        let label = job.label();

        let secs = config.attempt_timeout_secs;
        let (uploaded, ocr_text) = tokio::join!(
            timeout(Duration::from_secs(secs), self.model.upload(job.path, job.kind)),
            ocr::ocr_context(Arc::clone(&self.ocr), job.path, job.kind),
        );
        let document = uploaded
            .unwrap_or_else(|_| {
                Err(ModelError::Transport(format!("upload timed out after {secs}s")))
            })
            .map_err(|e| {
                warn!("{}: upload failed: {}", label, e);
                BillExtractError::UploadFailed(e)
            })?;
        debug!("{}: uploaded as {} ({})", label, document.display_name, document.mime_type);

        let prompt = build_extraction_prompt(&ocr_text);
        let mut last_err: Option<AttemptError> = None;
        let mut spent = TokenUsage::default();

        for attempt in 1..=config.max_attempts {
            if attempt > 1 && config.retry_backoff_ms > 0 {
                let backoff = backoff_ms(config.retry_backoff_ms, attempt);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    label,
                    attempt - 1,
                    config.max_attempts - 1,
                    backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            self.audit
                .record(AuditEvent::request(&label, attempt, &prompt, &ocr_text))
                .await;

            match self
                .attempt(config, &label, attempt, &prompt, &document, job, &mut spent)
                .await
            {
                Ok(extraction) => {
                    info!(
                        "{}: {} items on {} pages in {:?} (attempt {})",
                        label,
                        extraction.result.total_item_count,
                        extraction.result.pagewise_line_items.len(),
                        start.elapsed(),
                        attempt
                    );
                    return Ok(extraction);
                }
                Err(e) => {
                    warn!("{}: attempt {} failed: {}", label, attempt, e);
                    self.audit
                        .record(AuditEvent::Failure {
                            document: &label,
                            attempt,
                            error: e.to_string(),
                        })
                        .await;
                    last_err = Some(e);
                }
            }
        }

        Err(BillExtractError::ExtractionFailed {
            attempts: config.max_attempts,
            last_error: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts were made".to_string()),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        config: &ExtractionConfig,
        label: &str,
        attempt: u32,
        prompt: &str,
        document: &UploadedDocument,
        job: ExtractionJob<'_>,
        spent: &mut TokenUsage,
    ) -> Result<ChunkExtraction, AttemptError> {
        let secs = config.attempt_timeout_secs;
        let reply = timeout(Duration::from_secs(secs), self.model.generate(prompt, document))
            .await
            .map_err(|_| AttemptError::Timeout { secs })??;
        *spent += reply.usage;

        self.audit
            .record(AuditEvent::Response {
                document: label,
                attempt,
                raw: &reply.text,
            })
            .await;

        let value = parse_model_json(&reply.text)?;
        let mut normalized = normalize_extraction(&value, job.first_page_no)?;
        if job.pin_pages {
            pin_page_numbers(&mut normalized.result, job.first_page_no);
        }

        Ok(ChunkExtraction {
            result: normalized.result,
            usage: *spent,
            dropped_items: normalized.dropped_items,
        })
    }
}

/// Delay before `attempt` (2 or later): doubles per retry, saturating.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let exp = attempt.saturating_sub(2);
    base_ms.saturating_mul(2u64.checked_pow(exp).unwrap_or(u64::MAX))
}
