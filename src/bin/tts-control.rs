//! tts-control - command-line client for the tts-service daemon
//!
//! Writes text or the interrupt command into the daemon's input FIFO and
//! follows the feedback FIFO.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tts_service::config_loader::default_config_path;
use tts_service::fifo::{is_no_listener, open_reader, open_writer, FifoPaths};
use tts_service::Settings;

/// Control utility for the tts-service daemon
#[derive(Parser)]
#[command(name = "tts-control")]
#[command(version)]
#[command(about = "Control utility for the tts-service daemon", long_about = None)]
struct Cli {
    /// Configuration file (TOML), used for the interrupt command
    #[arg(short, long, env = "CONFIG_PATH", global = true)]
    config: Option<PathBuf>,

    /// Directory holding the input and output FIFOs
    #[arg(long, env = "TTS_FIFO_DIR", global = true)]
    fifo_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Speak text
    Speak {
        /// Text to speak (joined with spaces)
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// Stop current speech and drop anything queued
    Stop,

    /// Print sentences that were interrupted before they finished
    Listen,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let fifos = FifoPaths::resolve(cli.fifo_dir.as_deref());

    match cli.command {
        Commands::Speak { text } => {
            // The daemon reads line by line, so one request must be one line.
            let line = text.join(" ").replace(['\r', '\n'], " ");
            send_line(&fifos.input, &line)
        }
        Commands::Stop => {
            let path = cli.config.unwrap_or_else(default_config_path);
            let settings = Settings::load(&path)
                .with_context(|| format!("Could not load {}", path.display()))?;
            send_line(&fifos.input, &settings.service.interrupt_command)
        }
        Commands::Listen => listen(&fifos.output),
    }
}

fn send_line(path: &Path, line: &str) -> anyhow::Result<()> {
    if line.trim().is_empty() {
        bail!("Nothing to send");
    }
    let mut fifo = match open_writer(path) {
        Ok(fifo) => fifo,
        Err(e) if is_no_listener(&e) => {
            bail!("tts-service is not running (no reader on {})", path.display())
        }
        Err(e) => return Err(e).with_context(|| format!("Could not open {}", path.display())),
    };
    fifo.write_all(format!("{line}\n").as_bytes())
        .with_context(|| format!("Could not write to {}", path.display()))?;
    Ok(())
}

/// Each report opens and closes the FIFO, so reopen after every EOF.
fn listen(path: &Path) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    loop {
        let fifo = open_reader(path)?;
        for line in BufReader::new(fifo).lines() {
            let line = line.with_context(|| format!("Could not read {}", path.display()))?;
            let mut out = stdout.lock();
            writeln!(out, "{line}")?;
            out.flush()?;
        }
    }
}
