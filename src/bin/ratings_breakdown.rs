//! Count ratings per item and print the items ordered by that count.
//!
//! Usage: ratings-breakdown [INPUT] [-o OUTPUT] [--on-malformed skip|abort]
//!        (reads stdin / writes stdout when paths are omitted)

use clap::Parser;
use ratings_breakdown::{MalformedPolicy, PipelineBuilder, PipelineConfig, RankKeyMode};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ratings-breakdown", version, about)]
struct Args {
    /// Tab-separated rating lines: user_id, item_id, rating, timestamp
    input: Option<PathBuf>,

    /// Where to write `item_id<TAB>count` lines
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON pipeline config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    map_partitions: Option<usize>,

    #[arg(long)]
    reduce_partitions: Option<usize>,

    /// What to do with lines that do not parse
    #[arg(long, value_enum)]
    on_malformed: Option<MalformedPolicy>,

    /// Sort on zero-padded string keys of this width instead of numbers
    #[arg(long)]
    key_width: Option<usize>,

    /// Ship every (item, 1) pair through the shuffle instead of pre-summing
    #[arg(long)]
    no_combiner: bool,

    /// Write run metrics as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Args {
    fn pipeline_config(&self) -> ratings_breakdown::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(n) = self.map_partitions {
            config.map_partitions = n;
        }
        if let Some(n) = self.reduce_partitions {
            config.reduce_partitions = n;
        }
        if let Some(policy) = self.on_malformed {
            config.malformed_policy = policy;
        }
        if let Some(width) = self.key_width {
            config.rank_key = RankKeyMode::Padded { width };
        }
        if self.no_combiner {
            config.combiner = false;
        }
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let pipeline = PipelineBuilder::new()
        .with_config(args.pipeline_config()?)
        .build()?;
    log::debug!("Running with {:?}", pipeline.config());

    let input: Box<dyn io::BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(io::stdin().lock()),
    };

    // An existing output file is only replaced once the run has succeeded.
    let mut ordered = Vec::new();
    let report = pipeline.run(input, &mut ordered)?;
    match &args.output {
        Some(path) => fs::write(path, &ordered)?,
        None => io::stdout().lock().write_all(&ordered)?,
    }
    log::info!("{}", report.summary().trim_end());

    if let Some(path) = &args.report {
        serde_json::to_writer_pretty(BufWriter::new(File::create(path)?), &report)?;
    }

    Ok(())
}
