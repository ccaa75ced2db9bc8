use dotenvy::dotenv;
use kino_search_bot::bot::runner::{self, install_signal_handler};
use kino_search_bot::bot::{ChatPlatform, Router, TelegramPlatform};
use kino_search_bot::catalog::KinopoiskClient;
use kino_search_bot::config::Settings;
use kino_search_bot::images::{spawn_cache_sweeper, ImageService};
use kino_search_bot::session::{MemorySessionStore, RedisSessionStore, SessionStore};
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting sensitive data
struct RedactionPatterns {
    token1: Regex,
    token2: Regex,
    token3: Regex,
    api_key_env: Regex,
    api_key_header: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token1: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token2: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token3: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
            api_key_env: Regex::new(r"API_KEY=[^\s&]+")?,
            api_key_header: Regex::new(r#"(?i)(x-api-key["']?\s*[:=]\s*["']?)[A-Za-z0-9_-]+"#)?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .token1
            .replace_all(&output, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .token2
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .token3
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .api_key_env
            .replace_all(&output, "API_KEY=[MASKED]")
            .to_string();
        output = self
            .api_key_header
            .replace_all(&output, "${1}[MASKED]")
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
        // Report the original length; the redacted text may differ in size
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
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("Starting Kino Search Bot...");

    let settings = init_settings();
    let sessions = init_session_store(&settings).await;

    let catalog = Arc::new(
        KinopoiskClient::new(&settings.catalog, settings.api_key.clone()).map_err(|e| {
            error!(error = %e, "Failed to build the catalog HTTP client");
            e
        })?,
    );
    info!(base_url = %settings.catalog.base_url, "Catalog client initialized.");

    let images = Arc::new(ImageService::new(&settings.image).map_err(|e| {
        error!(error = %e, "Failed to build the poster HTTP client");
        e
    })?);
    if let Err(e) = images.preload_fallback().await {
        warn!(
            path = %settings.image.fallback_path.display(),
            error = %e,
            "Fallback poster not loaded, will upload from path"
        );
    }

    let shutdown = install_signal_handler();
    let sweeper = spawn_cache_sweeper(
        Arc::clone(&images),
        settings.image_cache_ttl(),
        shutdown.clone(),
    );

    let bot = Bot::new(settings.telegram_token.clone());
    let chat: Arc<dyn ChatPlatform> = Arc::new(TelegramPlatform::new(bot.clone()));
    let router = Arc::new(Router::new(catalog, sessions, images, chat));

    runner::run(bot, router, shutdown.clone()).await;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        error!(error = %e, "Poster cache sweeper panicked");
    }

    info!("Bot stopped.");
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

fn init_settings() -> Settings {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_session_store(settings: &Settings) -> Arc<dyn SessionStore> {
    if settings.redis.address.is_empty() {
        warn!("No session store address configured, sessions are kept in memory.");
        return Arc::new(MemorySessionStore::new(settings.session_ttl()));
    }

    let info = match settings.redis_connection_info() {
        Ok(info) => info,
        Err(e) => {
            error!("Invalid session store settings: {}", e);
            std::process::exit(1);
        }
    };

    match RedisSessionStore::connect(info, settings.session_ttl()).await {
        Ok(store) => {
            info!(address = %settings.redis.address, db = settings.redis.db, "Session store initialized.");
            Arc::new(store)
        }
        Err(e) => {
            error!("Failed to connect to the session store: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_telegram_token_and_api_key() -> Result<(), regex::Error> {
        let patterns = RedactionPatterns::new()?;
        let line = "GET https://api.telegram.org/bot1234567890:AAAbbbCCCdddEEEfffGGGhhhIIIjjjKKKlll/getUpdates X-API-KEY: ABC123-XYZ API_KEY=secret";
        let redacted = patterns.redact(line);

        assert!(!redacted.contains("AAAbbbCCC"));
        assert!(!redacted.contains("ABC123"));
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("[TELEGRAM_TOKEN]"));
        assert!(redacted.contains("X-API-KEY: [MASKED]"));
        Ok(())
    }
}
