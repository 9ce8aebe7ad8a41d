//! Command-line driver for the capability client.
//!
//! Runs one operation against a simulated host so the negotiation, consent
//! and error envelopes can be exercised from a terminal.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use ai_capabilities::{
    AllowDownloads, CapabilityClient, CapabilityError, CapabilityFamily, ClientConfig,
    ConsentHooks, DeclineDownloads, DownloadRequest, HostAvailability, InvokeOptions,
    SimulatedHost, SimulatedSurface, TranslateRequest,
};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

/// Command-line arguments for the capability client
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// How model download consent is answered
    #[arg(long, value_enum, default_value_t = ConsentMode::Ask)]
    consent: ConsentMode,

    /// Availability reported by the simulated host
    #[arg(long, value_enum, default_value_t = Availability::AfterDownload)]
    availability: Availability,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConsentMode {
    Ask,
    Always,
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Availability {
    Readily,
    AfterDownload,
    No,
}

impl From<Availability> for HostAvailability {
    fn from(value: Availability) -> Self {
        match value {
            Availability::Readily => HostAvailability::Readily,
            Availability::AfterDownload => HostAvailability::AfterDownload,
            Availability::No => HostAvailability::No,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a prompt to the assistant
    Prompt { text: String },
    /// Summarize text
    Summarize { text: String },
    /// Detect the language of text
    Detect { text: String },
    /// Translate text
    Translate {
        text: String,
        /// Target language (falls back to the configured default)
        #[arg(long)]
        to: Option<String>,
        /// Source language
        #[arg(long)]
        from: Option<String>,
    },
}

/// Asks on the terminal before each model download.
struct TerminalConsent;

#[async_trait]
impl ConsentHooks for TerminalConsent {
    async fn request_download_permission(&self, request: &DownloadRequest) -> anyhow::Result<bool> {
        let question = format!(
            "The {} from {} needs a one-time model download. Download now? [y/N] ",
            request.family.label(),
            request.provider
        );
        let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
            let mut stderr = io::stderr();
            stderr.write_all(question.as_bytes())?;
            stderr.flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await??;
        Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }

    fn on_download_start(&self, request: &DownloadRequest) {
        tracing::info!(family = request.family.as_str(), "model download started");
    }

    fn on_download_complete(&self, request: &DownloadRequest) {
        tracing::info!(family = request.family.as_str(), "model download complete");
    }

    fn on_download_error(&self, request: &DownloadRequest, error: &CapabilityError) {
        tracing::error!(family = request.family.as_str(), %error, "model download failed");
    }
}

fn simulated_host(availability: HostAvailability) -> SimulatedHost {
    let host = SimulatedHost::new();
    let surfaces = [
        ("ai.languageModel", CapabilityFamily::Assistant),
        ("ai.summarizer", CapabilityFamily::Summarizer),
        ("ai.languageDetector", CapabilityFamily::LanguageDetector),
        ("ai.translator", CapabilityFamily::Translator),
    ];
    for (path, family) in surfaces {
        host.install(
            path,
            SimulatedSurface::new(family, "simulated-host").with_availability(availability),
        );
    }
    host
}

fn print_envelope<T: Serialize>(envelope: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("debug,ai_capabilities=debug")
    } else {
        EnvFilter::new("info,ai_capabilities=info")
    };
    fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let config = ClientConfig::from_env_and_file(args.config.as_deref())?;
    let hooks: Arc<dyn ConsentHooks> = match args.consent {
        ConsentMode::Ask => Arc::new(TerminalConsent),
        ConsentMode::Always => Arc::new(AllowDownloads),
        ConsentMode::Never => Arc::new(DeclineDownloads),
    };
    let client = CapabilityClient::builder(Arc::new(simulated_host(args.availability.into())))
        .with_config(config)
        .with_consent_hooks(hooks)
        .build();

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });
    let options = InvokeOptions::default().with_cancellation(cancel);

    let success = match args.command {
        Commands::Prompt { text } => {
            let envelope = client.prompt(&text, options).await;
            print_envelope(&envelope)?;
            envelope.is_success()
        }
        Commands::Summarize { text } => {
            let envelope = client.summarize(&text, options).await;
            print_envelope(&envelope)?;
            envelope.is_success()
        }
        Commands::Detect { text } => {
            let envelope = client.detect_language(&text, options).await;
            print_envelope(&envelope)?;
            envelope.is_success()
        }
        Commands::Translate { text, to, from } => {
            let mut request = TranslateRequest::new(text);
            request.target_language = to;
            request.source_language = from;
            let envelope = client.translate(request, options).await;
            print_envelope(&envelope)?;
            envelope.is_success()
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
