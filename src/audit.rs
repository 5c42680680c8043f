//! Append-only audit log of model requests and responses.
//!
//! Every extraction attempt records what was sent and what came back so an
//! operator can reconstruct a bad extraction after the fact. Records are JSON
//! lines. Concurrent chunk tasks share one [`AuditLog`]; a mutex serialises
//! whole-record writes so lines never interleave.
//!
//! Auditing is strictly best-effort: I/O errors are logged at `warn` and
//! swallowed.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Characters of OCR text kept in a request record.
const OCR_PREVIEW_CHARS: usize = 200;

/// One audited event.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent<'a> {
    /// Prompt assembled and about to be sent.
    Request {
        document: &'a str,
        attempt: u32,
        prompt_chars: usize,
        ocr_context_chars: usize,
        ocr_preview: String,
    },
    /// Raw model output, before any cleanup.
    Response {
        document: &'a str,
        attempt: u32,
        raw: &'a str,
    },
    /// The attempt failed.
    Failure {
        document: &'a str,
        attempt: u32,
        error: String,
    },
}

impl<'a> AuditEvent<'a> {
    pub fn request(document: &'a str, attempt: u32, prompt: &str, ocr_context: &str) -> Self {
        AuditEvent::Request {
            document,
            attempt,
            prompt_chars: prompt.chars().count(),
            ocr_context_chars: ocr_context.chars().count(),
            ocr_preview: ocr_context.chars().take(OCR_PREVIEW_CHARS).collect(),
        }
    }
}

#[derive(Serialize)]
struct AuditLine<'a> {
    timestamp_ms: u128,
    #[serde(flatten)]
    event: &'a AuditEvent<'a>,
}

#[derive(Debug)]
struct Sink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

/// Shared handle to the audit file. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    sink: Option<Arc<Sink>>,
}

impl AuditLog {
    /// Audit into `path`, creating the file on first write.
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            sink: Some(Arc::new(Sink {
                path: path.into(),
                write_lock: Mutex::new(()),
            })),
        }
    }

    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.sink.as_deref().map(|s| s.path.as_path())
    }

    /// Append one event. Never fails.
    pub async fn record(&self, event: AuditEvent<'_>) {
        let Some(sink) = self.sink.as_deref() else {
            return;
        };

        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let mut line = match serde_json::to_string(&AuditLine {
            timestamp_ms,
            event: &event,
        }) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialise audit record: {}", e);
                return;
            }
        };
        line.push('\n');

        let _guard = sink.write_lock.lock().await;
        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&sink.path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!("Failed to write audit log {}: {}", sink.path.display(), e);
        }
    }
}
