//! PDF access via pdfium: binding, page counting and rasterisation.
//!
//! Everything here is blocking. The `pdfium-render` crate wraps the pdfium
//! C++ library, which uses thread-local state internally and is not safe to
//! call from async contexts; callers run these functions inside
//! `tokio::task::spawn_blocking`.
//!
//! Rasterisation caps the longest edge in pixels rather than fixing a DPI:
//! scanned bills come in every physical size and tesseract reads best around
//! 1,500–2,500 px.

use crate::error::BillExtractError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Environment variable naming a directory that contains the pdfium library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Bind to pdfium, preferring `PDFIUM_LIB_PATH` over the system library.
pub fn bind_pdfium() -> Result<Pdfium, BillExtractError> {
    if let Ok(dir) = std::env::var(PDFIUM_LIB_PATH_ENV) {
        if !dir.is_empty() {
            let lib = Pdfium::pdfium_platform_library_name_at_path(&dir);
            let bindings = Pdfium::bind_to_library(&lib).map_err(|e| {
                BillExtractError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e))
            })?;
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| BillExtractError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Open a PDF, mapping pdfium errors to [`BillExtractError::CorruptPdf`].
pub fn open_pdf<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, BillExtractError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| BillExtractError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{:?}", e),
        })
}

/// Count the pages of a PDF.
pub fn page_count_blocking(path: &Path) -> Result<usize, BillExtractError> {
    let pdfium = bind_pdfium()?;
    let document = open_pdf(&pdfium, path)?;
    let count = document.pages().len() as usize;
    debug!("{} has {} pages", path.display(), count);
    Ok(count)
}

/// Async wrapper around [`page_count_blocking`].
pub async fn page_count(path: &Path) -> Result<usize, BillExtractError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || page_count_blocking(&path))
        .await
        .map_err(|e| BillExtractError::Internal(format!("Page count task panicked: {}", e)))?
}

/// Rasterise every page of a PDF, in page order.
pub fn render_pages_blocking(
    path: &Path,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, BillExtractError> {
    let pdfium = bind_pdfium()?;
    let document = open_pdf(&pdfium, path)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("Rasterising {} pages of {}", total_pages, path.display());

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(total_pages);
    for idx in 0..total_pages {
        let page = pages
            .get(idx as u16)
            .map_err(|e| BillExtractError::CorruptPdf {
                path: path.to_path_buf(),
                detail: format!("page {}: {:?}", idx + 1, e),
            })?;

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| BillExtractError::CorruptPdf {
                path: path.to_path_buf(),
                detail: format!("render page {}: {:?}", idx + 1, e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(images)
}
