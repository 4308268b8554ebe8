use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;
use tts_service::audio::RodioOutput;
use tts_service::backends::loader_for;
use tts_service::config_loader::{default_config_path, ModelPaths};
use tts_service::feedback::FeedbackReporter;
use tts_service::fifo::{create_fifo, FifoPaths};
use tts_service::{Settings, TtsService};

const SUPERVISE_INTERVAL: Duration = Duration::from_secs(1);

/// Speak lines written to a named pipe
#[derive(Parser)]
#[command(name = "tts-service")]
#[command(version)]
#[command(about = "Local text-to-speech daemon fed through a named pipe", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Kokoro ONNX model
    #[arg(long, env = "MODEL_PATH")]
    model: Option<String>,

    /// Kokoro voice embeddings
    #[arg(long, env = "VOICES_PATH")]
    voices: Option<String>,

    /// Directory holding the input and output FIFOs
    #[arg(long, env = "TTS_FIFO_DIR")]
    fifo_dir: Option<String>,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Loads configuration, creates the FIFOs and starts the worker threads.
fn setup(cli: Cli) -> anyhow::Result<TtsService> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let settings = Settings::load(&config_path).context("Could not load configuration")?;
    tracing::info!(path = %config_path.display(), "Configuration loaded");

    let fifos = FifoPaths::resolve(cli.fifo_dir.as_deref());
    create_fifo(&fifos.input)?;
    create_fifo(&fifos.output)?;

    let models = ModelPaths::resolve(cli.model.as_deref(), cli.voices.as_deref());
    let loader =
        loader_for(&settings.kokoro, &models).context("Could not set up synthesis backend")?;

    let mut service = TtsService::new(&settings, fifos.clone(), loader)?;
    let output = RodioOutput::new(settings.service.output_device.clone());
    let feedback = Arc::new(FeedbackReporter::new(fifos.output.clone()));
    service
        .start(Box::new(output), feedback)
        .context("Could not start worker threads")?;

    tracing::info!(
        input = %fifos.input.display(),
        output = %fifos.output.display(),
        "TTS Player started. Write text to the input FIFO to speak it"
    );
    Ok(service)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut service = match setup(cli) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    supervise(&service).await;

    tracing::info!("Stopping TTS Player");
    if let Err(e) = tokio::task::spawn_blocking(move || service.stop()).await {
        tracing::error!(error = %e, "Shutdown task failed");
    }
    tracing::info!("Finished");
    ExitCode::SUCCESS
}

/// Returns on SIGINT, SIGTERM, an idle-exit request or the service stopping
/// by itself.
async fn supervise(service: &TtsService) {
    let state = service.state();
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => Some(terminate),
        Err(e) => {
            tracing::warn!(error = %e, "Could not install SIGTERM handler");
            None
        }
    };
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    let mut tick = tokio::time::interval(SUPERVISE_INTERVAL);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupt received");
                return;
            }
            Some(()) = async {
                match terminate.as_mut() {
                    Some(terminate) => terminate.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                tracing::info!("Terminate signal received");
                return;
            }
            _ = tick.tick() => {
                if state.exit_requested() {
                    tracing::info!("Exiting after idle timeout");
                    return;
                }
                if !state.is_running() {
                    tracing::warn!("Service stopped unexpectedly");
                    return;
                }
            }
        }
    }
}
