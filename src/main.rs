use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod annotate;
mod batch;
mod catalog;
mod cluster;
mod config;
mod detection;
mod error;
mod filter;
mod pipeline;
mod resolve;
mod server;
mod source;

#[derive(Parser, Debug)]
#[command(name = "deckscan")]
#[command(about = "Reconstructs card lists from OCR detections and matches them against a card catalog")]
#[command(version)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the resolution pipeline over HTTP
    Serve(ServeArgs),
    /// Resolve every detection file in a directory and write per-image reports
    Batch(BatchArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Host address to bind to
    #[arg(long, env = "DECKSCAN_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "DECKSCAN_PORT", default_value = "9393")]
    pub port: u16,

    /// Catalog JSON file; the service starts with an empty catalog if omitted
    #[arg(long, env = "DECKSCAN_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Maximum upload size in bytes (default: 50MB)
    #[arg(long, env = "DECKSCAN_MAX_FILE_SIZE", default_value = "52428800")]
    pub max_file_size: usize,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Catalog JSON file
    #[arg(long, env = "DECKSCAN_CATALOG")]
    pub catalog: PathBuf,

    /// Directory holding one `<image_id>.json` detection file per image
    #[arg(long)]
    pub detections: PathBuf,

    /// Directory reports and annotated images are written to
    #[arg(long)]
    pub output: PathBuf,

    /// Directory holding the source images, used for annotated overlays
    #[arg(long)]
    pub images: Option<PathBuf>,

    /// Number of images processed concurrently
    #[arg(long, env = "DECKSCAN_JOBS", default_value = "4")]
    pub jobs: usize,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

/// Tunables shared by every subcommand that runs the pipeline
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Detections below this OCR confidence are dropped
    #[arg(long, env = "DECKSCAN_MIN_CONFIDENCE", default_value = "0.05")]
    pub min_confidence: f32,

    /// Shortest text (in characters) that can be a card name
    #[arg(long, env = "DECKSCAN_MIN_TEXT_LENGTH", default_value = "3")]
    pub min_text_length: usize,

    /// Longest text (in characters) that can be a card name
    #[arg(long, env = "DECKSCAN_MAX_TEXT_LENGTH", default_value = "50")]
    pub max_text_length: usize,

    /// UI labels that are never card names (case-insensitive)
    #[arg(
        long,
        env = "DECKSCAN_NOISE_STOPLIST",
        value_delimiter = ',',
        default_values = ["tap", "untap", "mana", "cost", "main", "deck", "sideboard"]
    )]
    pub noise_stoplist: Vec<String>,

    /// Characters that, together with digits, make up mana-cost notation
    #[arg(long, env = "DECKSCAN_MANA_SYMBOLS", default_value = "{}/WUBRGC")]
    pub mana_symbols: String,

    /// Vertical slack (px) when deciding whether two boxes share a line
    #[arg(long, env = "DECKSCAN_VERTICAL_TOLERANCE", default_value = "10")]
    pub vertical_tolerance: f64,

    /// Largest horizontal gap (px) between fragments of one card name
    #[arg(long, env = "DECKSCAN_HORIZONTAL_TOLERANCE", default_value = "30")]
    pub horizontal_tolerance: f64,

    /// Minimum similarity ratio for a fuzzy catalog match
    #[arg(long, env = "DECKSCAN_FUZZY_THRESHOLD", default_value = "0.65")]
    pub fuzzy_threshold: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting deckscan v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve(args) => {
            let config = config::ServerConfig::try_from(args)?;
            tracing::info!("Binding to {}:{}", config.host, config.port);
            server::run(config).await
        }
        Command::Batch(args) => {
            let config = config::BatchConfig::try_from(args)?;
            let summary = batch::run(config).await?;
            tracing::info!(
                "Batch finished: {} succeeded, {} failed",
                summary.succeeded,
                summary.failed
            );
            Ok(())
        }
    }
}
