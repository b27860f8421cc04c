use std::io::{self, Write};
use std::sync::Arc;

use dnit_gateway::api::{build_router, AppState};
use dnit_gateway::config::{
    get_invalid_key_cooldown_secs, get_lookup_queue_capacity, Settings,
};
use dnit_gateway::dnit::LookupService;
use dnit_gateway::keys::{ApiKeyStore, InvalidKeyCache};
use dnit_gateway::telegram::TelegramSession;
use dotenvy::dotenv;
use regex::Regex;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting sensitive data
struct RedactionPatterns {
    api_hash: Regex,
    key_param: Regex,
    key_header: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            api_hash: Regex::new(r"API_HASH=[0-9a-fA-F]{32}")?,
            key_param: Regex::new(r"([?&]key=)[^\s&'\x22]+")?,
            key_header: Regex::new(r"((?i)x-api-key[:=]\s*)[^\s'\x22]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .api_hash
            .replace_all(&output, "API_HASH=[MASKED]")
            .to_string();
        output = self.key_param.replace_all(&output, "$1[MASKED]").to_string();
        output = self
            .key_header
            .replace_all(&output, "$1[MASKED]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // We return the original buffer length to satisfy the contract,
        // even if the redacted string length differs.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    // Setup logging with redaction
    init_logging(patterns);

    info!("Starting DNI lookup gateway...");

    // Load settings
    let settings = init_settings();

    // Connect the Telegram session. The session file must already be
    // authorized; there is no interactive login here.
    let session = init_session(&settings).await;

    let lookup = Arc::new(LookupService::new(session, get_lookup_queue_capacity()));

    let keys = Arc::new(ApiKeyStore::load(settings.api_keys_file.clone()).await);
    let invalid_keys = Arc::new(InvalidKeyCache::new(get_invalid_key_cooldown_secs()));

    let state = AppState {
        settings: settings.clone(),
        keys,
        lookup,
        invalid_keys,
    };
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down cleanly.");
    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_session(settings: &Settings) -> Arc<TelegramSession> {
    match TelegramSession::connect(settings).await {
        Ok(s) => {
            info!("Telegram session connected.");
            Arc::new(s)
        }
        Err(e) => {
            error!(
                "Failed to start Telegram session (is '{}' authorized?): {}",
                settings.session_file, e
            );
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
    }
    info!("Shutdown signal received.");
}
