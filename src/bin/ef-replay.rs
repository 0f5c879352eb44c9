//! `ef-replay` runs a recorded AER dump through the feature extractor.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use event_feature_extractor::{
    records_to_bytes, AerWord, ChannelObserver, CycleOutcome, ExtractorConfig, ExtractorEvent,
    FeatureExtractor, LookupTable, OutputKind, RECORD_BYTES,
};
use tracing::{debug, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Replay command line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase output verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Override log level (e.g. info, debug, trace).
    #[arg(long, env = "EF_LOG_LEVEL")]
    log_level: Option<String>,
    /// Lookup table file (flat little-endian i32 entries).
    #[arg(long, env = "EF_LUT", value_name = "FILE")]
    lut: PathBuf,
    /// Recorded AER dump (packed little-endian address/timestamp records).
    #[arg(long, value_name = "FILE")]
    input: PathBuf,
    /// Side of the retina grid.
    #[arg(long, default_value_t = 128)]
    retina_size: usize,
    /// Side of the feature grid.
    #[arg(long, default_value_t = 32)]
    feature_size: usize,
    /// Nominal cycle rate; replay itself runs back-to-back.
    #[arg(long, env = "EF_RATE_HZ", default_value_t = 50)]
    rate_hz: u32,
    /// Total cycles to run. Cycles past the end of the dump ingest nothing.
    #[arg(long)]
    cycles: Option<u64>,
    /// Start the extractor idle.
    #[arg(long)]
    idle: bool,
    /// Accumulate the RIGHT feature map too.
    #[arg(long)]
    stereo_features: bool,
    /// Write filtered events here as packed records.
    #[arg(long, value_name = "FILE")]
    out_events: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = cli
        .log_level
        .as_deref()
        .map(|lvl| lvl.to_ascii_uppercase())
        .map(|lvl| match lvl.as_str() {
            "TRACE" => Level::TRACE,
            "DEBUG" => Level::DEBUG,
            "WARN" => Level::WARN,
            _ => Level::INFO,
        })
        .unwrap_or_else(|| match cli.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        });
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(env_filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ExtractorConfig::new(cli.rate_hz)
        .with_grid(cli.retina_size, cli.feature_size)
        .with_stereo_features(cli.stereo_features)
        .with_idle(cli.idle);

    let lut_file = File::open(&cli.lut)
        .with_context(|| format!("opening lookup table {}", cli.lut.display()))?;
    let lut = LookupTable::from_reader(BufReader::new(lut_file), cli.retina_size, cli.feature_size)
        .with_context(|| format!("loading lookup table {}", cli.lut.display()))?;

    let dump = fs::read(&cli.input)
        .with_context(|| format!("reading AER dump {}", cli.input.display()))?;
    let chunk_bytes = config.buffer_bytes();
    let chunks: Vec<&[u8]> = dump.chunks(chunk_bytes).collect();
    info!(
        bytes = dump.len(),
        records = dump.len() / RECORD_BYTES,
        buffers = chunks.len(),
        "loaded dump"
    );

    let mut extractor = FeatureExtractor::new(config, lut)?;
    let (tx, rx) = channel();
    if cli.out_events.is_some() {
        extractor.subscribe(Arc::new(ChannelObserver::with_kinds(
            tx,
            &[OutputKind::FilteredEvents],
        )));
    }

    let cycles = cli.cycles.unwrap_or(chunks.len() as u64);
    let mut filtered: Vec<AerWord> = Vec::new();
    for i in 0..cycles {
        let raw = chunks.get(i as usize).copied().unwrap_or(&[]);
        if let CycleOutcome::Completed(stats) = extractor.run_cycle(raw) {
            debug!("{stats}");
        }
        for event in rx.try_iter() {
            if let ExtractorEvent::FilteredEvents { events, .. } = event {
                filtered.extend_from_slice(&events);
            }
        }
    }

    if let Some(path) = &cli.out_events {
        fs::write(path, records_to_bytes(&filtered))
            .with_context(|| format!("writing filtered events {}", path.display()))?;
        info!(events = filtered.len(), path = %path.display(), "filtered events written");
    }

    println!("{}", extractor.stats());
    Ok(())
}
