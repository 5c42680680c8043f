//! Pipeline stages for bill extraction.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ split ──▶ llm ──────────────────────────▶ aggregate
//! (URL)    (pdfium)   ├─ ocr     (tesseract, hint)
//!                     ├─ repair  (raw text → JSON)
//!                     └─ normalize (JSON → BillItem)
//! ```
//!
//! 1. [`input`]     — download or locate the document, infer its type
//! 2. [`render`]    — pdfium binding, page counting and rasterisation;
//!    everything here runs in `spawn_blocking`
//! 3. [`split`]     — single-page chunk files for PDFs over the threshold
//! 4. [`ocr`]       — best-effort text used only as a prompt hint
//! 5. [`llm`]       — the Extraction Client: upload, generate, retry
//! 6. [`repair`]    — tolerant JSON parsing of model output
//! 7. [`normalize`] — positional/named items → the output schema
//! 8. [`aggregate`] — merge chunk results and apply the failure policy

pub mod aggregate;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod ocr;
pub mod render;
pub mod repair;
pub mod split;
