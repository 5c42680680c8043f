//! HTTP server binary for edgequake-bill-extract.
//!
//! A thin shim over the library crate that maps flags and environment
//! variables to `ExtractionConfig` and a model backend, then serves the API.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_bill_extract::server::{create_server, AppState};
use edgequake_bill_extract::{
    BillExtractor, ChunkFailurePolicy, DocumentModel, ExtractionConfig, GeminiConfig,
    GeminiModel, ProviderModel, TesseractOcr,
};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on 0.0.0.0:8000 with Gemini
  export GEMINI_API_KEY=...
  bill-extract

  # Extract a bill
  curl -s localhost:8000/extract-bill-data \
       -H 'content-type: application/json' \
       -d '{"document": "https://example.com/bill.pdf"}'

  # Use another vision provider through edgequake-llm
  bill-extract --provider openai --model gpt-4.1-mini

  # Return partial results when some pages fail
  bill-extract --chunk-policy partial-results

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY           Google Gemini API key (required for the default backend)
  GEMINI_MODEL             Gemini model ID (default: gemini-2.5-flash-lite)
  BILL_EXTRACT_HOST        Bind address (default: 0.0.0.0)
  BILL_EXTRACT_PORT        Bind port (default: 8000)
  BILL_EXTRACT_AUDIT_LOG   Audit log path (default: debug_log.txt)
  TESSERACT_PATH           tesseract executable (default: tesseract)
  PDFIUM_LIB_PATH          Directory containing libpdfium
  RUST_LOG                 Log filter, e.g. edgequake_bill_extract=debug
"#;

/// Extract line items from scanned bills over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "bill-extract",
    version,
    about = "Extract line items from scanned bills and invoices over HTTP",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "BILL_EXTRACT_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind.
    #[arg(short, long, env = "BILL_EXTRACT_PORT", default_value_t = 8000)]
    port: u16,

    /// Model backend: gemini, or any edgequake-llm provider (openai, anthropic, ...).
    #[arg(long, env = "BILL_EXTRACT_PROVIDER", default_value = "gemini")]
    provider: String,

    /// Model ID. Defaults to gemini-2.5-flash-lite for the gemini backend.
    #[arg(long, env = "GEMINI_MODEL")]
    model: Option<String>,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    /// Split PDFs with more pages than this into single-page chunks.
    #[arg(long, env = "BILL_EXTRACT_SPLIT_THRESHOLD", default_value_t = 2)]
    split_threshold: usize,

    /// Maximum chunks extracted concurrently.
    #[arg(short, long, env = "BILL_EXTRACT_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// What to do when a chunk fails after all attempts.
    #[arg(long, env = "BILL_EXTRACT_CHUNK_POLICY", value_enum, default_value = "whole-document")]
    chunk_policy: ChunkPolicyArg,

    /// Generation attempts per document or chunk.
    #[arg(long, env = "BILL_EXTRACT_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Base backoff between attempts in milliseconds (doubles each retry).
    #[arg(long, env = "BILL_EXTRACT_RETRY_BACKOFF_MS", default_value_t = 0)]
    retry_backoff_ms: u64,

    /// Per-attempt model timeout in seconds.
    #[arg(long, env = "BILL_EXTRACT_ATTEMPT_TIMEOUT", default_value_t = 120)]
    attempt_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "BILL_EXTRACT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Audit log file.
    #[arg(long, env = "BILL_EXTRACT_AUDIT_LOG", default_value = "debug_log.txt")]
    audit_log: PathBuf,

    /// Disable the audit log.
    #[arg(long, env = "BILL_EXTRACT_NO_AUDIT")]
    no_audit: bool,

    /// tesseract executable.
    #[arg(long, env = "TESSERACT_PATH", default_value = "tesseract")]
    tesseract_path: String,

    /// tesseract language.
    #[arg(long, env = "TESSERACT_LANG", default_value = "eng")]
    ocr_language: String,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "BILL_EXTRACT_VERBOSE")]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ChunkPolicyArg {
    WholeDocument,
    FailRequest,
    PartialResults,
}

impl From<ChunkPolicyArg> for ChunkFailurePolicy {
    fn from(v: ChunkPolicyArg) -> Self {
        match v {
            ChunkPolicyArg::WholeDocument => ChunkFailurePolicy::WholeDocument,
            ChunkPolicyArg::FailRequest => ChunkFailurePolicy::FailRequest,
            ChunkPolicyArg::PartialResults => ChunkFailurePolicy::PartialResults,
        }
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn build_model(cli: &Cli) -> Result<Arc<dyn DocumentModel>> {
    if cli.provider.eq_ignore_ascii_case("gemini") {
        let mut config = GeminiConfig {
            api_key: cli
                .gemini_api_key
                .clone()
                .filter(|k| !k.trim().is_empty()),
            ..GeminiConfig::default()
        };
        if let Some(model) = &cli.model {
            config.model = model.clone();
        }
        if config.api_key.is_none() {
            warn!("GEMINI_API_KEY is not set; every extraction request will fail until it is");
        }
        return Ok(Arc::new(GeminiModel::new(config)));
    }

    let model = cli
        .model
        .as_deref()
        .with_context(|| format!("--model is required for provider '{}'", cli.provider))?;
    let provider = ProviderModel::from_name(&cli.provider, model)
        .with_context(|| format!("Failed to configure provider '{}'", cli.provider))?;
    Ok(Arc::new(provider))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = ExtractionConfig::builder()
        .split_threshold(cli.split_threshold)
        .chunk_concurrency(cli.concurrency)
        .chunk_failure_policy(cli.chunk_policy.clone().into())
        .max_attempts(cli.max_attempts)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .attempt_timeout_secs(cli.attempt_timeout)
        .download_timeout_secs(cli.download_timeout)
        .audit_log_path((!cli.no_audit).then(|| cli.audit_log.clone()))
        .tesseract_path(cli.tesseract_path.clone())
        .ocr_language(cli.ocr_language.clone())
        .build()
        .context("Invalid configuration")?;

    let model = build_model(&cli)?;
    let ocr = Arc::new(TesseractOcr::new(config.ocr.clone()));
    info!(
        "Model: {} | split threshold: {} | chunk policy: {:?} | audit log: {}",
        model.name(),
        config.split_threshold,
        config.chunk_failure_policy,
        config
            .audit_log_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "disabled".to_string())
    );

    let state = AppState::new(BillExtractor::new(model, ocr, config));
    let app = create_server(state);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", cli.host, cli.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    info!("Server stopped cleanly");
    Ok(())
}
