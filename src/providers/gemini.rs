//! Google Gemini over the Generative Language REST API.
//!
//! Two calls per document:
//!
//! 1. **Upload**: the resumable Files API protocol: a `start` request that
//!    announces size and MIME type and returns an upload URL, then a single
//!    `upload, finalize` request carrying the bytes. The response holds the
//!    file URI.
//! 2. **Generate**: `models/{model}:generateContent` with the prompt and a
//!    `fileData` part pointing at that URI. `responseMimeType` is pinned to
//!    `application/json`.
//!
//! The client is built once at startup and shared; the API key travels in the
//! `x-goog-api-key` header rather than the query string so it never lands in
//! request logs. Only connection setup is bounded here; whole calls are
//! bounded by the caller's per-attempt timeout.

use crate::error::ModelError;
use crate::output::TokenUsage;
use crate::pipeline::input::DocumentKind;
use crate::providers::{
    display_name, read_document, DocumentModel, DocumentSource, ModelReply, UploadedDocument,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Environment variable holding the API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Default model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-lite";

/// Default API root.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini client settings.
#[derive(Clone)]
pub struct GeminiConfig {
    /// `None` leaves the client unconfigured: it starts, but every upload fails.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Low temperature keeps the model faithful to what is printed. Default: 0.1.
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    /// Dense pharmacy bills can run to a few hundred items. Default: 8192.
    pub max_output_tokens: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            temperature: 0.1,
            top_p: 0.95,
            top_k: 64,
            max_output_tokens: 8192,
        }
    }
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("top_k", &self.top_k)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl GeminiConfig {
    /// Defaults with the API key taken from `GEMINI_API_KEY`.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var(GEMINI_API_KEY_ENV)
                .ok()
                .filter(|k| !k.trim().is_empty()),
            ..Self::default()
        }
    }
}

/// [`DocumentModel`] backed by the Gemini REST API.
#[derive(Debug, Clone)]
pub struct GeminiModel {
    client: reqwest::Client,
    config: GeminiConfig,
    label: String,
}

impl GeminiModel {
    pub fn new(config: GeminiConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to a default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self::with_client(client, config)
    }

    pub fn with_client(client: reqwest::Client, config: GeminiConfig) -> Self {
        let label = format!("gemini/{}", config.model);
        Self {
            client,
            config,
            label,
        }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn api_key(&self) -> Result<&str, ModelError> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| ModelError::NotConfigured {
                provider: "gemini".to_string(),
                hint: format!("{GEMINI_API_KEY_ENV} is not set"),
            })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }
}

#[async_trait]
impl DocumentModel for GeminiModel {
    fn name(&self) -> &str {
        &self.label
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn upload(&self, path: &Path, kind: DocumentKind) -> Result<UploadedDocument, ModelError> {
        let key = self.api_key()?;
        let bytes = read_document(path).await?;
        let mime_type = kind.mime_type();
        let name = display_name(path);

        let start = self
            .client
            .post(format!("{}/upload/v1beta/files", self.base()))
            .header("x-goog-api-key", key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "file": { "display_name": name } }))
            .send()
            .await?;
        let start = ensure_success(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ModelError::InvalidResponse("missing x-goog-upload-url header".into()))?;

        let size = bytes.len();
        let finished = self
            .client
            .post(upload_url)
            .header("x-goog-api-key", key)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?;
        let finished = ensure_success(finished).await?;
        let uploaded: UploadResponse = finished.json().await?;

        info!(
            "Uploaded {} ({} bytes, {}) → {}",
            name, size, mime_type, uploaded.file.uri
        );

        Ok(UploadedDocument {
            mime_type: uploaded
                .file
                .mime_type
                .unwrap_or_else(|| mime_type.to_string()),
            display_name: name,
            source: DocumentSource::FileUri(uploaded.file.uri),
        })
    }

    async fn generate(
        &self,
        prompt: &str,
        document: &UploadedDocument,
    ) -> Result<ModelReply, ModelError> {
        let key = self.api_key()?;
        let body = build_generate_body(prompt, document, &self.config);

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base(),
                self.config.model
            ))
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let parsed: GenerateResponse = response.json().await?;

        let reply = reply_from_response(parsed)?;
        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, reply.usage.input_tokens, reply.usage.output_tokens
        );
        Ok(reply)
    }
}

/// Turn a non-2xx response into [`ModelError::Api`] with its body text.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ModelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ModelError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Build the `generateContent` request body.
pub fn build_generate_body(prompt: &str, document: &UploadedDocument, config: &GeminiConfig) -> Value {
    let document_part = match &document.source {
        DocumentSource::FileUri(uri) => json!({
            "fileData": { "mimeType": document.mime_type, "fileUri": uri }
        }),
        DocumentSource::InlineBase64(data) => json!({
            "inlineData": { "mimeType": document.mime_type, "data": data }
        }),
    };

    json!({
        "contents": [{
            "role": "user",
            "parts": [ { "text": prompt }, document_part ]
        }],
        "generationConfig": {
            "temperature": config.temperature,
            "topP": config.top_p,
            "topK": config.top_k,
            "maxOutputTokens": config.max_output_tokens,
            "responseMimeType": "application/json"
        }
    })
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    uri: String,
    mime_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Extract the first candidate's text and the usage counters.
pub fn reply_from_response(response: GenerateResponse) -> Result<ModelReply, ModelError> {
    let usage = response
        .usage_metadata
        .map(|u| TokenUsage {
            total_tokens: u.total_token_count,
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
        })
        .unwrap_or_default();

    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(ModelError::InvalidResponse(format!("empty response: {reason}")));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(ModelError::InvalidResponse(format!(
            "candidate has no text (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(ModelReply { text, usage })
}
