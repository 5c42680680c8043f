//! The remote-model seam.
//!
//! [`DocumentModel`] is everything the pipeline needs from a multimodal
//! provider: hand over a document, then generate text from a prompt plus that
//! document. Keeping it a trait lets the server pick a backend at startup and
//! lets tests substitute a scripted fake.
//!
//! Two implementations ship with the crate:
//!
//! * [`GeminiModel`]: Google Generative Language REST API. Documents go
//!   through the Files API upload and are referenced by URI.
//! * [`ProviderModel`]: any `edgequake_llm` provider. "Upload" stages the
//!   document as inline base64 attached to the user message.

pub mod edgequake;
pub mod gemini;

pub use edgequake::ProviderModel;
pub use gemini::{GeminiConfig, GeminiModel};

use crate::error::ModelError;
use crate::output::TokenUsage;
use crate::pipeline::input::DocumentKind;
use async_trait::async_trait;
use std::path::Path;

/// How an uploaded document is referenced in a generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// Stored by the provider; referenced by URI.
    FileUri(String),
    /// Sent inline with the request.
    InlineBase64(String),
}

/// A document handed to the model, ready to be referenced by `generate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    pub mime_type: String,
    pub display_name: String,
    pub source: DocumentSource,
}

/// Raw model output plus its token accounting.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelReply {
    pub text: String,
    pub usage: TokenUsage,
}

/// A multimodal model that reads a document and answers a prompt.
#[async_trait]
pub trait DocumentModel: Send + Sync {
    /// Short provider/model label for logs and health checks.
    fn name(&self) -> &str;

    /// Whether credentials are present. An unconfigured model fails every
    /// request at the upload step.
    fn is_configured(&self) -> bool {
        true
    }

    /// Make a local document available to the model.
    async fn upload(&self, path: &Path, kind: DocumentKind) -> Result<UploadedDocument, ModelError>;

    /// Run one generation over `document`.
    async fn generate(
        &self,
        prompt: &str,
        document: &UploadedDocument,
    ) -> Result<ModelReply, ModelError>;
}

/// Display name for an uploaded file: its file name, or `document`.
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| "document".to_string())
}

/// Read a document, mapping I/O errors to [`ModelError::Io`].
pub(crate) async fn read_document(path: &Path) -> Result<Vec<u8>, ModelError> {
    tokio::fs::read(path).await.map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })
}
