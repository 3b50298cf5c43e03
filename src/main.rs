//! report-triage - Emergency triage for citizen-submitted reports
//!
//! One invocation = one run: connect to the portal, query submissions whose
//! flag field is unset, classify each note, write the flag back, print a
//! summary, exit.
//!
//! # Usage
//!
//! ```bash
//! # Classify with the keyword strategy from ./triage.toml
//! report-triage
//!
//! # Force the staged strategy and preview without writing
//! report-triage --strategy staged --dry-run
//!
//! # Process at most 50 records
//! report-triage --limit 50
//! ```
//!
//! # Environment Variables
//!
//! - `TRIAGE_CONFIG`: path to an alternate TOML config file
//! - `ARCGIS_USERNAME` / `ARCGIS_PASSWORD`: portal credentials
//! - `ARCGIS_TOKEN`: pre-issued portal token (skips token generation)
//! - `OPENAI_API_KEY`: remote classification service key
//! - `RUST_LOG`: logging level (default: info)
//!
//! Variables are also read from a `.env` file in the working directory.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use report_triage::classifier;
use report_triage::config::{Strategy, TriageConfig};
use report_triage::pipeline::{LayerSink, LayerSource, NullSink, ProcessingLoop, SubmissionSink};
use report_triage::store::FeatureLayerClient;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "report-triage")]
#[command(about = "Emergency triage for citizen-submitted feature layer reports")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML config file (overrides the TRIAGE_CONFIG search)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured classification strategy
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Process at most this many submissions
    #[arg(long)]
    limit: Option<u64>,

    /// Classify but log instead of writing flags back
    #[arg(long)]
    dry_run: bool,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so RUST_LOG set there takes effect too
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut config = match &args.config {
        Some(path) => TriageConfig::load_from_file(std::path::Path::new(path))
            .with_context(|| format!("failed to load config from {path}"))?,
        None => TriageConfig::load(),
    };
    if let Some(strategy) = args.strategy {
        config.classifier.strategy = strategy;
    }
    if let Err(problems) = config.validate() {
        anyhow::bail!("invalid configuration:\n  - {}", problems.join("\n  - "));
    }

    info!(
        strategy = %config.classifier.strategy,
        layer = %config.layer.url,
        "Starting triage run"
    );

    let classifier = classifier::build(&config.classifier)
        .context("failed to build the configured classifier")?;

    let client = FeatureLayerClient::connect(&config)
        .await
        .context("failed to connect to the feature service")?;
    client
        .prepare_layer()
        .await
        .context("feature layer is not ready for triage")?;

    let mut source = LayerSource::fetch(&client, args.limit)
        .await
        .context("failed to query unclassified submissions")?;

    if source.remaining() == 0 {
        println!("0 processed, 0 flagged");
        info!("No new submissions to process");
        return Ok(());
    }

    let mut sink: Box<dyn SubmissionSink> = if args.dry_run {
        Box::new(NullSink::new())
    } else {
        Box::new(LayerSink::new(client))
    };

    let stats = ProcessingLoop::new(classifier)
        .run(&mut source, sink.as_mut())
        .await
        .context("triage run aborted")?;

    println!("{}", stats.summary_line());
    Ok(())
}
