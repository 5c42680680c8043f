//! Document-level orchestration: the library's entry point.
//!
//! [`BillExtractor::extract`] resolves a URL or local path, decides whether to
//! split, runs the Extraction Client once per chunk (bounded concurrency) or
//! once for the whole document, and merges the results.
//!
//! Splitting is an optimisation, not a requirement: if the page count cannot
//! be read or the split fails, the document is processed whole.

use crate::audit::AuditLog;
use crate::config::ExtractionConfig;
use crate::error::{BillExtractError, ChunkError};
use crate::output::{ChunkExtraction, DocumentExtraction, TokenUsage};
use crate::pipeline::aggregate::{resolve_chunks, ChunkResolution};
use crate::pipeline::input::{self, DocumentKind};
use crate::pipeline::llm::{ExtractionClient, ExtractionJob};
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::render;
use crate::pipeline::split::{self, ChunkFile};
use crate::providers::DocumentModel;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extracts line items from bills. Cheap to clone; build one per process.
///
/// # Example
/// ```rust,no_run
/// use edgequake_bill_extract::{BillExtractor, ExtractionConfig, GeminiConfig, GeminiModel, TesseractOcr};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = BillExtractor::new(
///     Arc::new(GeminiModel::new(GeminiConfig::from_env())),
///     Arc::new(TesseractOcr::default()),
///     ExtractionConfig::default(),
/// );
/// let out = extractor.extract("https://example.com/bill.pdf").await?;
/// println!("{} items", out.data.total_item_count);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BillExtractor {
    client: ExtractionClient,
    config: ExtractionConfig,
}

/// Outcome of running a split document's chunks.
enum ChunkRun {
    Done(DocumentExtraction),
    FallBack { spent: TokenUsage },
}

impl BillExtractor {
    /// Build an extractor. The audit log is opened at
    /// `config.audit_log_path` if set.
    pub fn new(
        model: Arc<dyn DocumentModel>,
        ocr: Arc<dyn OcrEngine>,
        config: ExtractionConfig,
    ) -> Self {
        let audit = match &config.audit_log_path {
            Some(path) => AuditLog::to_file(path),
            None => AuditLog::disabled(),
        };
        Self {
            client: ExtractionClient::new(model, ocr, audit),
            config,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<dyn DocumentModel> {
        self.client.model()
    }

    /// Extract from a URL or local path.
    ///
    /// A downloaded file is removed before this returns, on success and on
    /// failure alike.
    pub async fn extract(&self, document: &str) -> Result<DocumentExtraction, BillExtractError> {
        let start = Instant::now();
        info!("Starting extraction: {}", document);

        let fetched = input::fetch_document(document, self.config.download_timeout_secs).await?;
        let kind = fetched.kind();
        let outcome = self.extract_local(fetched.path(), kind).await;
        fetched.cleanup();

        match &outcome {
            Ok(out) => info!(
                "Extraction complete: {} items on {} pages, {} tokens, {:?}",
                out.data.total_item_count,
                out.data.pagewise_line_items.len(),
                out.token_usage.total_tokens,
                start.elapsed()
            ),
            Err(e) => warn!("Extraction failed for {}: {}", document, e),
        }
        outcome
    }

    /// Extract from a file already on disk.
    pub async fn extract_local(
        &self,
        path: &Path,
        kind: DocumentKind,
    ) -> Result<DocumentExtraction, BillExtractError> {
        if kind.is_pdf() {
            match self.plan_chunks(path).await {
                Ok(Some(chunks)) => return self.extract_chunked(chunks, path, kind).await,
                Ok(None) => {}
                Err(e) => warn!(
                    "Could not split {}: {}. Processing the whole document",
                    path.display(),
                    e
                ),
            }
        }

        self.extract_whole(path, kind, TokenUsage::default()).await
    }

    /// Extract the pre-split `chunks` of `whole` and merge them.
    ///
    /// When the failure policy asks for it, `whole` is then processed once as
    /// a single unit and the tokens spent on the chunks are added to its
    /// usage.
    pub async fn extract_chunked(
        &self,
        chunks: Vec<ChunkFile>,
        whole: &Path,
        kind: DocumentKind,
    ) -> Result<DocumentExtraction, BillExtractError> {
        match self.extract_chunks(chunks).await? {
            ChunkRun::Done(out) => Ok(out),
            ChunkRun::FallBack { spent } => self.extract_whole(whole, kind, spent).await,
        }
    }

    async fn extract_whole(
        &self,
        path: &Path,
        kind: DocumentKind,
        spent: TokenUsage,
    ) -> Result<DocumentExtraction, BillExtractError> {
        let whole = self
            .client
            .extract(&self.config, ExtractionJob::whole(path, kind))
            .await?;
        Ok(DocumentExtraction {
            data: whole.result,
            token_usage: whole.usage + spent,
            chunks: 1,
            failed_pages: Vec::new(),
            dropped_items: whole.dropped_items,
        })
    }

    /// `Some(chunks)` when the PDF has more pages than the split threshold.
    async fn plan_chunks(&self, path: &Path) -> Result<Option<Vec<ChunkFile>>, BillExtractError> {
        let pages = render::page_count(path).await?;
        if !split::should_split(pages, self.config.split_threshold) {
            debug!("{} pages, processing whole", pages);
            return Ok(None);
        }
        info!("{} pages > threshold {}, splitting", pages, self.config.split_threshold);
        split::split_pages(path).await.map(Some)
    }

    /// Run every chunk and resolve the outcomes under the configured policy.
    ///
    /// The chunk files are deleted as soon as all chunks have finished.
    async fn extract_chunks(&self, chunks: Vec<ChunkFile>) -> Result<ChunkRun, BillExtractError> {
        let total = chunks.len();
        let outcomes = self.run_chunks(&chunks).await;
        drop(chunks);

        match resolve_chunks(outcomes, self.config.chunk_failure_policy) {
            ChunkResolution::Merged { extraction, failed } => {
                Ok(ChunkRun::Done(DocumentExtraction {
                    data: extraction.result,
                    token_usage: extraction.usage,
                    chunks: total,
                    failed_pages: failed,
                    dropped_items: extraction.dropped_items,
                }))
            }
            ChunkResolution::FallbackToWhole { errors, spent } => {
                warn!(
                    "{} of {} pages failed; falling back to whole-document extraction",
                    errors.len(),
                    total
                );
                Ok(ChunkRun::FallBack { spent })
            }
            ChunkResolution::Fail(e) => Err(BillExtractError::ChunkFailed(e)),
            ChunkResolution::AllFailed { total, first_error } => {
                Err(BillExtractError::AllChunksFailed {
                    total,
                    first_error: first_error.to_string(),
                })
            }
        }
    }

    /// Extract every chunk, at most `chunk_concurrency` at a time.
    ///
    /// Each chunk's failure is captured in its own slot; results come back in
    /// page order.
    pub async fn run_chunks(&self, chunks: &[ChunkFile]) -> Vec<Result<ChunkExtraction, ChunkError>> {
        let jobs: Vec<_> = chunks
            .iter()
            .map(|chunk| async move {
                self.client
                    .extract(&self.config, ExtractionJob::chunk(chunk.path(), chunk.page_no))
                    .await
                    .map_err(|e| ChunkError {
                        page: chunk.page_no,
                        detail: e.to_string(),
                    })
            })
            .collect();
        stream::iter(jobs)
            .buffered(self.config.chunk_concurrency)
            .collect()
            .await
    }
}
