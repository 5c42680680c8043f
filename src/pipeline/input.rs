//! Input resolution: turn a document reference into a local file.
//!
//! URLs are streamed into a [`NamedTempFile`] whose suffix carries the
//! inferred extension. The temp file is owned by [`FetchedDocument`]; calling
//! [`FetchedDocument::cleanup`] removes it and logs the outcome, and dropping
//! the value removes it on every other path (early return, panic).
//!
//! Local paths are accepted for CLI and test use and are never deleted.

use crate::error::BillExtractError;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Document formats the pipeline distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Jpeg,
    Png,
}

impl DocumentKind {
    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Jpeg => "image/jpeg",
            DocumentKind::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => ".pdf",
            DocumentKind::Jpeg => ".jpg",
            DocumentKind::Png => ".png",
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, DocumentKind::Pdf)
    }

    /// Map a file extension (with or without the leading dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "jpg" | "jpeg" => Some(DocumentKind::Jpeg),
            "png" => Some(DocumentKind::Png),
            _ => None,
        }
    }

    /// Map a `Content-Type` header value, ignoring parameters such as `charset`.
    pub fn from_content_type(value: &str) -> Option<Self> {
        let essence = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(DocumentKind::Pdf),
            "image/jpeg" | "image/jpg" => Some(DocumentKind::Jpeg),
            "image/png" => Some(DocumentKind::Png),
            _ => None,
        }
    }

    /// Recognise a format from its leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            Some(DocumentKind::Pdf)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(DocumentKind::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(DocumentKind::Jpeg)
        } else {
            None
        }
    }
}

/// A document available on the local file system.
#[derive(Debug)]
pub enum FetchedDocument {
    /// Input was already a local file; left in place after processing.
    Local {
        path: PathBuf,
        kind: Option<DocumentKind>,
    },
    /// Input was a URL; the bytes live in a temp file owned by this value.
    Downloaded {
        file: NamedTempFile,
        kind: Option<DocumentKind>,
    },
}

impl FetchedDocument {
    pub fn path(&self) -> &Path {
        match self {
            FetchedDocument::Local { path, .. } => path,
            FetchedDocument::Downloaded { file, .. } => file.path(),
        }
    }

    /// The inferred kind, if any was found.
    pub fn detected_kind(&self) -> Option<DocumentKind> {
        match self {
            FetchedDocument::Local { kind, .. } | FetchedDocument::Downloaded { kind, .. } => *kind,
        }
    }

    /// The kind used downstream; unresolved documents are treated as JPEG.
    pub fn kind(&self) -> DocumentKind {
        self.detected_kind().unwrap_or(DocumentKind::Jpeg)
    }

    /// Delete the downloaded temp file. No-op for local inputs.
    pub fn cleanup(self) {
        if let FetchedDocument::Downloaded { file, .. } = self {
            let path = file.path().to_path_buf();
            match file.close() {
                Ok(()) => debug!("Removed downloaded file {}", path.display()),
                Err(e) => warn!("Failed to remove downloaded file {}: {}", path.display(), e),
            }
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a document reference to a local file.
pub async fn fetch_document(
    input: &str,
    timeout_secs: u64,
) -> Result<FetchedDocument, BillExtractError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Resolve a local file path, inferring the kind from extension then magic bytes.
fn resolve_local(path_str: &str) -> Result<FetchedDocument, BillExtractError> {
    let path = PathBuf::from(path_str);
    if !path.is_file() {
        return Err(BillExtractError::FileNotFound { path });
    }

    let kind = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(DocumentKind::from_extension)
        .or_else(|| {
            use std::io::Read;
            let mut magic = [0u8; 8];
            let n = std::fs::File::open(&path)
                .and_then(|mut f| f.read(&mut magic))
                .unwrap_or(0);
            DocumentKind::sniff(&magic[..n])
        });

    debug!("Resolved local document: {} ({:?})", path.display(), kind);
    Ok(FetchedDocument::Local { path, kind })
}

/// Stream a URL into a fresh temp file.
async fn download_url(url: &str, timeout_secs: u64) -> Result<FetchedDocument, BillExtractError> {
    info!("Downloading document from: {}", url);

    let fetch_failed = |reason: String| BillExtractError::FetchFailed {
        url: url.to_string(),
        reason,
    };
    let map_transport = |e: reqwest::Error| {
        if e.is_timeout() {
            BillExtractError::FetchTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            fetch_failed(e.to_string())
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| fetch_failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(map_transport)?;

    if !response.status().is_success() {
        return Err(fetch_failed(format!("HTTP {}", response.status())));
    }

    let kind = url_extension(url)
        .as_deref()
        .and_then(DocumentKind::from_extension)
        .or_else(|| {
            response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .and_then(DocumentKind::from_content_type)
        });

    let suffix = kind.map(|k| k.extension()).unwrap_or("");
    let temp = tempfile::Builder::new()
        .prefix("bill-")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| BillExtractError::Internal(format!("tempfile: {e}")))?;

    let std_file = temp
        .reopen()
        .map_err(|e| BillExtractError::Internal(format!("tempfile reopen: {e}")))?;
    let mut out = tokio::fs::File::from_std(std_file);

    let mut written: u64 = 0;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(map_transport)?;
        out.write_all(&chunk)
            .await
            .map_err(|e| BillExtractError::Internal(format!("Failed to write temp file: {e}")))?;
        written += chunk.len() as u64;
    }
    out.flush()
        .await
        .map_err(|e| BillExtractError::Internal(format!("Failed to write temp file: {e}")))?;

    info!(
        "Downloaded {} bytes to {} ({:?})",
        written,
        temp.path().display(),
        kind
    );

    Ok(FetchedDocument::Downloaded { file: temp, kind })
}

/// Extension of the last URL path segment, e.g. `.pdf`.
fn url_extension(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?.to_string();
    let dot = last.rfind('.')?;
    let ext = &last[dot..];
    if ext.len() > 1 {
        Some(ext.to_string())
    } else {
        None
    }
}
