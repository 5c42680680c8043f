//! [`DocumentModel`] adapter over `edgequake_llm` providers.
//!
//! Chat-style provider APIs have no file store, so "upload" reads the document
//! and keeps it as base64; `generate` attaches it to a single user message as
//! an image part. This works for JPEG/PNG bills with every vision provider and
//! for PDFs with providers that accept `application/pdf` inline (Gemini,
//! Anthropic).

use crate::error::ModelError;
use crate::output::TokenUsage;
use crate::pipeline::input::DocumentKind;
use crate::providers::{
    display_name, read_document, DocumentModel, DocumentSource, ModelReply, UploadedDocument,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A chat provider used as a document model.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
    sampling: Sampling,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Sampling {
    temperature: f32,
    max_tokens: usize,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 8192,
        }
    }
}

impl Sampling {
    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

impl ProviderModel {
    /// Wrap a pre-built provider.
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
            sampling: Sampling::default(),
        }
    }

    /// Instantiate a named provider (`"openai"`, `"anthropic"`, ...) with `model`.
    ///
    /// The provider reads its own API key from the environment.
    pub fn from_name(provider_name: &str, model: &str) -> Result<Self, ModelError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            ModelError::NotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, format!("{provider_name}/{model}")))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.sampling.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.sampling.max_tokens = max_tokens;
        self
    }
}

/// Read `path` and keep it as an inline base64 document.
async fn stage_inline(path: &Path, kind: DocumentKind) -> Result<UploadedDocument, ModelError> {
    let bytes = read_document(path).await?;
    let b64 = STANDARD.encode(&bytes);
    debug!("Staged {} → {} bytes base64", path.display(), b64.len());
    Ok(UploadedDocument {
        mime_type: kind.mime_type().to_string(),
        display_name: display_name(path),
        source: DocumentSource::InlineBase64(b64),
    })
}

/// The base64 payload of a staged document; chat providers cannot follow a
/// file URI.
fn inline_payload<'a>(label: &str, document: &'a UploadedDocument) -> Result<&'a str, ModelError> {
    match &document.source {
        DocumentSource::InlineBase64(data) => Ok(data),
        DocumentSource::FileUri(_) => Err(ModelError::InvalidResponse(format!(
            "{} cannot reference remote document '{}'",
            label, document.display_name
        ))),
    }
}

fn usage_from_counts(prompt_tokens: usize, completion_tokens: usize) -> TokenUsage {
    let input_tokens = prompt_tokens as u64;
    let output_tokens = completion_tokens as u64;
    TokenUsage {
        total_tokens: input_tokens + output_tokens,
        input_tokens,
        output_tokens,
    }
}

#[async_trait]
impl DocumentModel for ProviderModel {
    fn name(&self) -> &str {
        &self.label
    }

    async fn upload(&self, path: &Path, kind: DocumentKind) -> Result<UploadedDocument, ModelError> {
        stage_inline(path, kind).await
    }

    async fn generate(
        &self,
        prompt: &str,
        document: &UploadedDocument,
    ) -> Result<ModelReply, ModelError> {
        let data = inline_payload(&self.label, document)?;

        let image = ImageData::new(data.to_string(), document.mime_type.clone()).with_detail("high");
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image])];

        let response = self
            .provider
            .chat(&messages, Some(&self.sampling.options()))
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        Ok(ModelReply {
            usage: usage_from_counts(response.prompt_tokens, response.completion_tokens),
            text: response.content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[tokio::test]
    async fn upload_stages_file_as_base64() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(b"\x89PNG bill").unwrap();

        let doc = stage_inline(file.path(), DocumentKind::Png).await.unwrap();
        assert_eq!(doc.mime_type, "image/png");
        assert!(doc.display_name.ends_with(".png"));
        let DocumentSource::InlineBase64(b64) = &doc.source else {
            panic!("expected inline data, got {:?}", doc.source);
        };
        assert_eq!(STANDARD.decode(b64).unwrap(), b"\x89PNG bill");
    }

    #[tokio::test]
    async fn upload_of_missing_file_is_io_error() {
        let err = stage_inline(Path::new("/no/such/bill.jpg"), DocumentKind::Jpeg)
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Io { .. }), "got {err}");
    }

    #[test]
    fn file_uri_documents_are_rejected() {
        let doc = UploadedDocument {
            mime_type: "application/pdf".into(),
            display_name: "bill.pdf".into(),
            source: DocumentSource::FileUri("https://files/abc".into()),
        };
        let err = inline_payload("openai/gpt-4o", &doc).unwrap_err();
        match err {
            ModelError::InvalidResponse(msg) => {
                assert!(msg.contains("openai/gpt-4o"));
                assert!(msg.contains("bill.pdf"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let inline = UploadedDocument {
            source: DocumentSource::InlineBase64("QUJD".into()),
            ..doc
        };
        assert_eq!(inline_payload("openai/gpt-4o", &inline).unwrap(), "QUJD");
    }

    #[test]
    fn sampling_becomes_completion_options() {
        let opts = Sampling::default().options();
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(8192));

        let opts = Sampling {
            temperature: 0.4,
            max_tokens: 2048,
        }
        .options();
        assert_eq!(opts.temperature, Some(0.4));
        assert_eq!(opts.max_tokens, Some(2048));
    }

    #[test]
    fn usage_sums_prompt_and_completion() {
        assert_eq!(
            usage_from_counts(1200, 80),
            TokenUsage {
                total_tokens: 1280,
                input_tokens: 1200,
                output_tokens: 80,
            }
        );
    }
}
