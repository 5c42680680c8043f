//! Chunk splitting: break a long PDF into single-page PDFs.
//!
//! Each chunk is a syntactically complete one-page document written to its
//! own [`NamedTempFile`]. A [`ChunkFile`] owns its file, so the chunks of a
//! request disappear as soon as the caller drops the `Vec<ChunkFile>` after
//! fan-in, whether the chunk tasks succeeded or not.

use crate::error::BillExtractError;
use crate::pipeline::render::{bind_pdfium, open_pdf};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// One single-page sub-document of a split PDF.
#[derive(Debug)]
pub struct ChunkFile {
    /// 1-based page number in the original document.
    pub page_no: usize,
    file: NamedTempFile,
}

impl ChunkFile {
    pub fn new(page_no: usize, file: NamedTempFile) -> Self {
        Self { page_no, file }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Whether a document with `page_count` pages is split at `threshold`.
///
/// Documents with *more* than `threshold` pages are split; a document sitting
/// exactly on the threshold is processed as one unit.
pub fn should_split(page_count: usize, threshold: usize) -> bool {
    page_count > threshold
}

/// Write one single-page PDF per page of `pdf_path`, in page order.
pub fn split_pages_blocking(pdf_path: &Path) -> Result<Vec<ChunkFile>, BillExtractError> {
    let pdfium = bind_pdfium()?;
    let source = open_pdf(&pdfium, pdf_path)?;
    let total = source.pages().len() as usize;

    let mut chunks = Vec::with_capacity(total);
    for idx in 0..total {
        let page_no = idx + 1;
        let chunk_failed = |detail: String| BillExtractError::ChunkWriteFailed { page: page_no, detail };

        let mut single = pdfium
            .create_new_pdf()
            .map_err(|e| chunk_failed(format!("{:?}", e)))?;
        single
            .pages_mut()
            .copy_page_from_document(&source, idx as u16, 0)
            .map_err(|e| chunk_failed(format!("{:?}", e)))?;

        let file = tempfile::Builder::new()
            .prefix(&format!("bill-page-{page_no}-"))
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| chunk_failed(e.to_string()))?;
        single
            .save_to_file(file.path())
            .map_err(|e| chunk_failed(format!("{:?}", e)))?;

        debug!("Wrote chunk for page {} → {}", page_no, file.path().display());
        chunks.push(ChunkFile::new(page_no, file));
    }

    info!("Split {} into {} single-page chunks", pdf_path.display(), chunks.len());
    Ok(chunks)
}

/// Async wrapper around [`split_pages_blocking`].
pub async fn split_pages(pdf_path: &Path) -> Result<Vec<ChunkFile>, BillExtractError> {
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || split_pages_blocking(&path))
        .await
        .map_err(|e| BillExtractError::Internal(format!("Split task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_pages_stay_whole() {
        assert!(!should_split(1, 2));
        assert!(!should_split(2, 2));
    }

    #[test]
    fn three_pages_are_split() {
        assert!(should_split(3, 2));
        assert!(should_split(40, 2));
    }

    #[test]
    fn chunk_file_is_removed_on_drop() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        let chunk = ChunkFile::new(3, file);
        assert_eq!(chunk.page_no, 3);
        assert_eq!(chunk.path(), path.as_path());
        drop(chunk);
        assert!(!path.exists());
    }
}
