//! Ratings breakdown demo
//!
//! Reads tab-separated rating lines from stdin, runs both stages and prints the
//! ten most-rated items followed by the run metrics.
//!
//! Usage: cargo run --example ratings_demo --release < ratings.tsv
//!        (or type lines like `1<TAB>100<TAB>4.5<TAB>20190601` and press Ctrl-D)

use ratings_breakdown::{MalformedPolicy, PipelineBuilder};
use std::io;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    println!("Ratings Breakdown Pipeline");
    println!("==========================");
    println!("Enter rating lines (Ctrl-D to finish):");
    println!();

    let pipeline = PipelineBuilder::new()
        .map_partitions(4)
        .reduce_partitions(4)
        .malformed_policy(MalformedPolicy::Skip)
        .build()?;

    let mut sorted = Vec::new();
    let report = pipeline.run(io::stdin().lock(), &mut sorted)?;
    let text = String::from_utf8(sorted)?;

    // Output ascends by count, so the most-rated items are at the end
    println!("\n=== Top 10 Items ===");
    for (rank, line) in text.lines().rev().take(10).enumerate() {
        if let Some((item, count)) = line.split_once('\t') {
            println!("{:2}. {} ({} ratings)", rank + 1, item, count);
        }
    }

    println!("\n{}", report.summary());
    Ok(())
}
