use dotenvy::dotenv;
use media_courier::bot::handlers::{handle_command, handle_text, Command};
use media_courier::bot::TelegramGateway;
use media_courier::config::Settings;
use media_courier::convert::Converter;
use media_courier::fetch::Dispatcher as AcquisitionDispatcher;
use media_courier::links::LinkResolver;
use media_courier::pipeline::PipelineDeps;
use media_courier::roles::{InMemoryDirectory, MemberDirectory};
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting the bot token from log output
struct RedactionPatterns {
    token1: Regex,
    token2: Regex,
    token3: Regex,
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

    info!("Starting media-courier bot...");

    // Load settings
    let settings = init_settings();

    // Acquisition side: resolver + dispatcher with one backend per kind
    let resolver = LinkResolver::new(&settings.video_headers.user_agent)?;
    let acquirer = Arc::new(AcquisitionDispatcher::new(&settings)?);
    let deps = Arc::new(PipelineDeps {
        resolver,
        acquirer,
    });

    // Delivery side
    let bot = Bot::new(settings.telegram_token.clone());
    let gateway = Arc::new(TelegramGateway::new(bot.clone()));
    let converter = Arc::new(Converter::new(settings.convert_dir.clone()));

    // Member directory collaborator (persistence is external to the core)
    let directory: Arc<dyn MemberDirectory> = Arc::new(InMemoryDirectory::default());

    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![deps, gateway, converter, directory])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

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

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(dispatch_command),
        )
        .branch(
            Update::filter_message()
                .filter(|msg: Message| msg.text().is_some())
                .endpoint(dispatch_text),
        )
}

async fn dispatch_command(
    msg: Message,
    cmd: Command,
    gateway: Arc<TelegramGateway>,
    directory: Arc<dyn MemberDirectory>,
    converter: Arc<Converter>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handle_command(msg, cmd, gateway, directory, converter).await {
        error!("Command handler error: {}", e);
    }
    respond(())
}

async fn dispatch_text(
    msg: Message,
    gateway: Arc<TelegramGateway>,
    directory: Arc<dyn MemberDirectory>,
    deps: Arc<PipelineDeps>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handle_text(msg, gateway, directory, deps).await {
        error!("Text handler error: {}", e);
    }
    respond(())
}
