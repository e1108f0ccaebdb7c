//! Counts how many ratings each item received and emits the items ordered by
//! that count.
//!
//! The job runs as two map/reduce stages separated by a global barrier:
//!
//! 1. Parse rating lines into `(item, 1)`, group by item, sum each group.
//! 2. Turn every count into a rank key, group and sort by that key, and
//!    expand each key back into `(item, count)` pairs.
//!
//! The sort in stage two is done entirely by the grouping step; the rank key
//! only has to order like the count it encodes.
//!
//! # Features
//!
//! - Parallel parser and aggregator partitions on crossbeam scoped threads
//! - Pluggable grouping/sort step ([`Shuffle`]), in-memory by default
//! - Numeric or fixed-width string rank keys, with overflow detection
//! - Skip-and-count or abort handling of malformed lines
//! - Per-stage metrics: record counts, malformed lines, task timings
//! - Hadoop streaming mapper/reducers built on efflux
//!
//! # Example
//!
//! ```
//! use ratings_breakdown::PipelineBuilder;
//!
//! let pipeline = PipelineBuilder::new().map_partitions(2).build()?;
//! let (pairs, _report) = pipeline.run_lines(vec![
//!     "1\t100\t4.5\t20190601",
//!     "2\t200\t3.0\t20190522",
//!     "3\t100\t5.0\t20190302",
//!     "4\t200\t2.0\t20190101",
//!     "5\t200\t1.0\t20190101",
//! ])?;
//!
//! assert_eq!(pairs[0].item_id, "100");
//! assert_eq!(pairs[0].count, 2);
//! assert_eq!(pairs[1].item_id, "200");
//! assert_eq!(pairs[1].count, 3);
//! # Ok::<(), ratings_breakdown::PipelineError>(())
//! ```

pub mod aggregate;
pub mod config;
pub mod emit;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod rank_key;
pub mod record;
pub mod shuffle;
pub mod stage;
pub mod streaming;

// Re-exports for convenience
pub use aggregate::{CountAggregator, CountPair};
pub use config::{MalformedPolicy, PipelineConfig, RankKeyMode};
pub use emit::{write_pairs, OrderedEmitter};
pub use error::{PipelineError, Result};
pub use metrics::{MetricsSnapshot, StageMetrics};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineReport};
pub use rank_key::{NumericRankKey, PaddedRankKey, RankKeyEncoder};
pub use record::{RatingEvent, RecordParser};
pub use shuffle::{HashPartitioner, InMemoryShuffle, Shuffle};
pub use stage::{Stage, StageRunner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
