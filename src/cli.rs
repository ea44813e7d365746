//! CLI module for Easel
//!
//! Provides the server and the offline recording tools:
//! - `serve`: run the session server
//! - `index`: build a seek index sidecar for a recording
//! - `inspect`: transcribe a binary recording to readable JSON lines

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use easel_replay::{transcribe, BinaryReader, IndexBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Easel collaborative canvas server
#[derive(Parser, Debug)]
#[command(name = "easel")]
#[command(about = "Collaborative canvas synchronization server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the session server (default)
    Serve {
        /// Listen address, overriding configuration
        #[arg(long)]
        addr: Option<String>,
    },
    /// Build a seek index sidecar for a binary recording
    Index {
        /// Path to the recording
        recording: PathBuf,
        /// Output path; defaults to the recording with an .idx extension
        #[arg(long)]
        output: Option<PathBuf>,
        /// Commands between index entries
        #[arg(long, default_value_t = easel_replay::DEFAULT_STRIDE)]
        stride: u64,
        /// Omit state snapshots; seeks will replay from the start
        #[arg(long)]
        no_snapshots: bool,
    },
    /// Transcribe a binary recording to JSON lines
    Inspect {
        /// Path to the recording
        recording: PathBuf,
        /// Output file; stdout when absent
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Serve { addr }) => crate::server::run(addr).await,
        Some(Commands::Index {
            recording,
            output,
            stride,
            no_snapshots,
        }) => index(recording, output, stride, no_snapshots).await,
        Some(Commands::Inspect { recording, output }) => inspect(&recording, output.as_deref()),
        None => crate::server::run(None).await,
    }
}

async fn index(
    recording: PathBuf,
    output: Option<PathBuf>,
    stride: u64,
    no_snapshots: bool,
) -> Result<()> {
    let output = output.unwrap_or_else(|| recording.with_extension("idx"));

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling index build");
            cancel_on_signal.cancel();
        }
    });

    let mut builder = IndexBuilder::new().with_stride(stride);
    if no_snapshots {
        builder = builder.without_snapshots();
    }

    let out = output.clone();
    let index = tokio::task::spawn_blocking(move || builder.build_to(&recording, &out, &cancel))
        .await
        .context("index build task failed")??;

    info!(
        entries = index.entries.len(),
        output = %output.display(),
        "index written"
    );
    Ok(())
}

fn inspect(recording: &std::path::Path, output: Option<&std::path::Path>) -> Result<()> {
    let mut reader =
        BinaryReader::open(recording).context("failed to open recording")?;
    let count = match output {
        Some(path) => {
            let file = std::fs::File::create(path).context("failed to create output file")?;
            transcribe(&mut reader, std::io::BufWriter::new(file))?
        }
        None => transcribe(&mut reader, std::io::stdout().lock())?,
    };
    info!(commands = count, "recording transcribed");
    Ok(())
}
