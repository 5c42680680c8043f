//! OCR preprocessing: best-effort plain text used as a hint for the model.
//!
//! The OCR text is advisory only. The model is told to prefer what it sees in
//! the document itself, so a missing or garbled OCR pass degrades quality at
//! worst and must never fail a request: [`ocr_context`] always returns a
//! string, substituting a short failure description when the engine errors
//! or panics.
//!
//! Recognition is CPU-bound (rasterisation plus tesseract) and runs on the
//! blocking pool so it does not stall the runtime while the upload proceeds.

use crate::config::OcrConfig;
use crate::error::OcrError;
use crate::pipeline::input::DocumentKind;
use crate::pipeline::render::render_pages_blocking;
use image::DynamicImage;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, warn};

/// Placeholder used when a PDF produced no OCR text at all.
pub const EMPTY_PDF_PLACEHOLDER: &str = "OCR not available for this PDF (Image extraction failed).";

/// A local text-recognition engine.
///
/// Implementations are called from `spawn_blocking` and may block freely.
pub trait OcrEngine: Send + Sync {
    /// Recognise the text of an image, or of every page of a PDF.
    ///
    /// PDF output should separate pages with [`page_marker`].
    fn extract_text(&self, path: &Path, kind: DocumentKind) -> Result<String, OcrError>;
}

/// Marker inserted before each page's text in multi-page OCR output.
pub fn page_marker(page_no: usize, text: &str) -> String {
    format!("\n[Page {} OCR]: {}\n", page_no, text)
}

/// OCR engine backed by the `tesseract` command-line tool.
///
/// PDFs are rasterised with pdfium first; each page image is written to a
/// temporary PNG and passed to tesseract.
#[derive(Debug, Clone, Default)]
pub struct TesseractOcr {
    config: OcrConfig,
}

impl TesseractOcr {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    /// Run `tesseract <image> stdout -l <lang>` and return its stdout.
    pub fn recognize_file(&self, image_path: &Path) -> Result<String, OcrError> {
        let output = Command::new(&self.config.tesseract_path)
            .arg(image_path.as_os_str())
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.language)
            .output()
            .map_err(|source| OcrError::Launch {
                engine: self.config.tesseract_path.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(OcrError::EngineFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn recognize_image(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let staged = tempfile::Builder::new()
            .prefix("bill-ocr-")
            .suffix(".png")
            .tempfile()?;
        image
            .save_with_format(staged.path(), image::ImageFormat::Png)
            .map_err(|e| OcrError::Render(e.to_string()))?;
        self.recognize_file(staged.path())
    }
}

impl OcrEngine for TesseractOcr {
    fn extract_text(&self, path: &Path, kind: DocumentKind) -> Result<String, OcrError> {
        if !kind.is_pdf() {
            return self.recognize_file(path);
        }

        let pages = render_pages_blocking(path, self.config.max_rendered_pixels)
            .map_err(|e| OcrError::Render(e.to_string()))?;

        let mut text = String::new();
        for (idx, page) in pages.iter().enumerate() {
            match self.recognize_image(page) {
                Ok(page_text) => text.push_str(&page_marker(idx + 1, &page_text)),
                Err(e) => {
                    warn!("OCR failed on page {}: {}", idx + 1, e);
                    text.push_str(&page_marker(idx + 1, &format!("(OCR failed: {e})")));
                }
            }
        }
        Ok(text)
    }
}

/// Produce the OCR hint for a document. Never fails.
pub async fn ocr_context(engine: Arc<dyn OcrEngine>, path: &Path, kind: DocumentKind) -> String {
    let owned = path.to_path_buf();
    let joined = tokio::task::spawn_blocking(move || engine.extract_text(&owned, kind)).await;

    let text = match joined {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!("OCR failed for {}: {}", path.display(), e);
            return failure_placeholder(kind, &e.to_string());
        }
        Err(e) => {
            warn!("OCR task for {} panicked: {}", path.display(), e);
            return failure_placeholder(kind, &format!("OCR task panicked: {e}"));
        }
    };

    if kind.is_pdf() && text.trim().is_empty() {
        return EMPTY_PDF_PLACEHOLDER.to_string();
    }

    debug!("OCR produced {} chars for {}", text.len(), path.display());
    text
}

fn failure_placeholder(kind: DocumentKind, detail: &str) -> String {
    if kind.is_pdf() {
        format!("OCR failed for PDF: {detail}")
    } else {
        format!("OCR failed: {detail}")
    }
}
