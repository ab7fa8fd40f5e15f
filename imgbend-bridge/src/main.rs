//! imgbend - image databending through a real-time audio loop
//!
//! Plays the pixels of an image out through audio outputs, records what an
//! external processing loop sends back on the inputs, and saves the result
//! as a new image.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use imgbend_bridge::config::{Backend, Overrides, Settings};
use imgbend_bridge::run_session;
use imgbend_common::config::UnderrunPolicy;
use imgbend_common::ChannelLayout;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for imgbend
#[derive(Parser, Debug)]
#[command(name = "imgbend")]
#[command(about = "Image to audio databending bridge")]
#[command(version)]
struct Args {
    /// Image to stream out
    inputimage: PathBuf,

    /// Where to save the reconstructed image
    outputimage: PathBuf,

    /// One audio channel per image band instead of a single interleaved channel
    #[arg(short, long)]
    split: bool,

    /// Audio client name
    #[arg(short, long, env = "IMGBEND_CLIENT_NAME")]
    name: Option<String>,

    /// Connect to devices matching --cinpat / --coutpat
    #[arg(short, long)]
    autoconnect: bool,

    /// Pattern for the processing loop's inputs (fed by our outputs)
    #[arg(long)]
    cinpat: Option<String>,

    /// Pattern for the processing loop's outputs (read by our inputs)
    #[arg(long)]
    coutpat: Option<String>,

    /// Frames per audio block
    #[arg(long, env = "IMGBEND_BLOCK_SIZE")]
    block_size: Option<usize>,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output behavior when no block is ready (repeat-last or silence)
    #[arg(long)]
    underrun: Option<UnderrunPolicy>,

    /// Audio host (defaults to jack when built with JACK support, else device)
    #[arg(long, value_enum)]
    backend: Option<Backend>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = Overrides {
        client_name: args.name,
        autoconnect: args.autoconnect,
        input_pattern: args.cinpat,
        output_pattern: args.coutpat,
        block_size: args.block_size,
        underrun_policy: args.underrun,
    };

    // Config first so its log level can seed the filter; RUST_LOG still wins
    let settings = Settings::load(
        args.inputimage,
        args.outputimage,
        args.config.as_deref(),
        overrides,
    );
    let default_level = settings
        .as_ref()
        .map(|s| s.config.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("imgbend={0},imgbend_bridge={0},imgbend_common={0}", default_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = settings
        .context("Failed to load configuration")?
        .with_layout(ChannelLayout::from_split_flag(args.split))
        .with_backend(args.backend.unwrap_or_else(Backend::preferred));

    info!(
        "Starting imgbend: {} -> {}",
        settings.input.display(),
        settings.output.display()
    );

    let report = run_session(settings)
        .await
        .context("Session failed")?;

    info!(
        "Wrote {}x{} image to {}",
        report.width,
        report.height,
        report.output.display()
    );
    Ok(())
}
