use crate::aggregate::{combine_units, CountAggregator, CountPair};
use crate::config::{MalformedPolicy, PipelineConfig, RankKeyMode};
use crate::emit::{write_pairs, OrderedEmitter};
use crate::error::{PipelineError, Result};
use crate::metrics::{MetricsSnapshot, StageMetrics};
use crate::rank_key::{NumericRankKey, PaddedRankKey, RankKeyEncoder};
use crate::record::{Line, RecordParser};
use crate::shuffle::{InMemoryShuffle, Partition, Shuffle};
use crate::stage::StageRunner;
use crossbeam::channel::{self, Sender};
use serde::Serialize;
use std::hash::Hash;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Builder for constructing pipelines
pub struct PipelineBuilder<S: Shuffle = InMemoryShuffle> {
    config: PipelineConfig,
    shuffle: S,
}

impl PipelineBuilder {
    /// Create a new pipeline builder with the default configuration
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            shuffle: InMemoryShuffle,
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Shuffle> PipelineBuilder<S> {
    /// Replace the whole configuration, e.g. one loaded from a file
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of parser workers in stage one
    pub fn map_partitions(mut self, n: usize) -> Self {
        self.config.map_partitions = n;
        self
    }

    /// Number of aggregator partitions in stage one
    pub fn reduce_partitions(mut self, n: usize) -> Self {
        self.config.reduce_partitions = n;
        self
    }

    /// Lines buffered between the reader and the parser workers
    pub fn channel_capacity(mut self, n: usize) -> Self {
        self.config.channel_capacity = n;
        self
    }

    /// What to do with lines that do not parse
    pub fn malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.config.malformed_policy = policy;
        self
    }

    /// Enable or disable the map-side combiner
    pub fn combiner(mut self, enable: bool) -> Self {
        self.config.combiner = enable;
        self
    }

    /// How stage two keys counts for the global sort
    pub fn rank_key(mut self, mode: RankKeyMode) -> Self {
        self.config.rank_key = mode;
        self
    }

    /// Use a different grouping/sort implementation
    pub fn with_shuffle<T: Shuffle>(self, shuffle: T) -> PipelineBuilder<T> {
        PipelineBuilder {
            config: self.config,
            shuffle,
        }
    }

    /// Build the pipeline
    pub fn build(self) -> Result<Pipeline<S>> {
        self.config.validate()?;
        Ok(Pipeline {
            config: self.config,
            shuffle: self.shuffle,
        })
    }
}

/// Counts ratings per item, then orders items by that count.
///
/// Stage one parses lines in parallel, shuffles `(item, n)` pairs by item and
/// sums each group in parallel. Stage two turns every count into a rank key,
/// shuffles everything into a single sorted partition and expands it back
/// into `(item, count)` pairs. Stage two starts only after every stage-one
/// worker has been joined.
pub struct Pipeline<S: Shuffle = InMemoryShuffle> {
    config: PipelineConfig,
    shuffle: S,
}

/// Metrics and totals of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub parse: MetricsSnapshot,
    pub aggregate: MetricsSnapshot,
    pub emit: MetricsSnapshot,
    pub distinct_items: usize,
    pub output_pairs: usize,
    pub malformed_lines: u64,
}

impl PipelineReport {
    /// Get a summary of all metrics
    pub fn summary(&self) -> String {
        let mut summary = String::from("Pipeline Metrics Summary:\n");
        for (name, snapshot) in [
            ("parse", &self.parse),
            ("aggregate", &self.aggregate),
            ("emit", &self.emit),
        ] {
            summary.push_str(&format!("  {}: {}\n", name, snapshot.format()));
        }
        summary.push_str(&format!(
            "  Items: {}, Output pairs: {}, Malformed lines: {}\n",
            self.distinct_items, self.output_pairs, self.malformed_lines
        ));
        summary
    }
}

struct RunMetrics {
    parse: StageMetrics,
    aggregate: StageMetrics,
    emit: StageMetrics,
}

fn join_worker<T>(joined: std::thread::Result<Result<T>>, role: &str) -> Result<T> {
    joined.map_err(|_| PipelineError::ThreadError(format!("{} worker panicked", role)))?
}

/// Push numbered lines to the parser workers until input ends or a worker fails
fn feed_lines<I>(lines: I, tx: &Sender<Line>, stop: &AtomicBool) -> Result<()>
where
    I: Iterator<Item = io::Result<Vec<u8>>>,
{
    for (idx, bytes) in lines.enumerate() {
        if stop.load(Ordering::Relaxed) {
            log::debug!("Parser failure signaled, stopped reading at line {}", idx + 1);
            break;
        }
        let line = Line::new(idx as u64 + 1, bytes?);
        if tx.send(line).is_err() {
            break;
        }
    }
    Ok(())
}

impl<S: Shuffle> Pipeline<S> {
    /// The validated configuration this pipeline runs with
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read rating lines from `input` and write `item<TAB>count` lines to
    /// `output` in ascending count order.
    ///
    /// Lines are split on `\n` and decoded one at a time, so a line that is
    /// not UTF-8 is handled by the malformed policy. Nothing is written
    /// unless both stages succeed.
    pub fn run<R: BufRead, W: Write>(&self, input: R, output: W) -> Result<PipelineReport> {
        let (pairs, report) = self.execute(input.split(b'\n'))?;
        write_pairs(output, &pairs)?;
        Ok(report)
    }

    /// Run over in-memory lines and return the ordered pairs
    pub fn run_lines<I, L>(&self, lines: I) -> Result<(Vec<CountPair>, PipelineReport)>
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        self.execute(lines.into_iter().map(|line| Ok(line.into().into_bytes())))
    }

    fn execute<I>(&self, lines: I) -> Result<(Vec<CountPair>, PipelineReport)>
    where
        I: Iterator<Item = io::Result<Vec<u8>>>,
    {
        let metrics = RunMetrics {
            parse: StageMetrics::new(),
            aggregate: StageMetrics::new(),
            emit: StageMetrics::new(),
        };

        let start = Instant::now();
        let counts = self.count_stage(lines, &metrics)?;
        let distinct_items = counts.len();
        log::info!(
            "Stage 1 complete: {} distinct items in {:?}",
            distinct_items,
            start.elapsed()
        );

        let start = Instant::now();
        let pairs = match self.config.rank_key {
            RankKeyMode::Numeric => self.rank_stage(NumericRankKey, counts, &metrics.emit)?,
            mode @ RankKeyMode::Padded { .. } => {
                self.rank_stage(PaddedRankKey::try_from(mode)?, counts, &metrics.emit)?
            }
        };
        log::info!(
            "Stage 2 complete: {} pairs ordered in {:?}",
            pairs.len(),
            start.elapsed()
        );

        let report = PipelineReport {
            parse: metrics.parse.snapshot(),
            aggregate: metrics.aggregate.snapshot(),
            emit: metrics.emit.snapshot(),
            distinct_items,
            output_pairs: pairs.len(),
            malformed_lines: metrics.parse.total_malformed(),
        };
        Ok((pairs, report))
    }

    /// Stage one: parse, shuffle by item, sum
    fn count_stage<I>(&self, lines: I, metrics: &RunMetrics) -> Result<Vec<CountPair>>
    where
        I: Iterator<Item = io::Result<Vec<u8>>>,
    {
        log::info!(
            "Stage 1: {} parser workers, {} aggregator partitions",
            self.config.map_partitions,
            self.config.reduce_partitions
        );
        let map_outputs = self.map_phase(lines, &metrics.parse)?;
        let partitions = self.checked_shuffle(map_outputs, self.config.reduce_partitions)?;
        for (idx, partition) in partitions.iter().enumerate() {
            log::debug!("Aggregator partition {} holds {} items", idx, partition.len());
        }
        self.reduce_phase(partitions, &metrics.aggregate)
    }

    fn map_phase<I>(&self, lines: I, metrics: &StageMetrics) -> Result<Vec<Vec<(String, u64)>>>
    where
        I: Iterator<Item = io::Result<Vec<u8>>>,
    {
        let (tx, rx) = channel::bounded::<Line>(self.config.channel_capacity);
        let stop = AtomicBool::new(false);
        let policy = self.config.malformed_policy;
        let combiner = self.config.combiner;

        crossbeam::scope(|s| -> Result<Vec<Vec<(String, u64)>>> {
            let handles: Vec<_> = (0..self.config.map_partitions)
                .map(|_| {
                    let rx = rx.clone();
                    let metrics = metrics.clone();
                    let stop = &stop;
                    s.spawn(move |_| {
                        let runner = StageRunner::new(metrics.clone());
                        let mut parser = RecordParser::new(policy, metrics);
                        let result = runner.run(&mut parser, rx.iter()).and_then(|pairs| {
                            if combiner {
                                combine_units(pairs)
                            } else {
                                Ok(pairs)
                            }
                        });
                        if result.is_err() {
                            stop.store(true, Ordering::Relaxed);
                        }
                        result
                    })
                })
                .collect();
            drop(rx);

            let read_result = feed_lines(lines, &tx, &stop);
            drop(tx);

            let mut outputs = Vec::with_capacity(handles.len());
            for handle in handles {
                outputs.push(join_worker(handle.join(), "parser")?);
            }
            read_result?;
            Ok(outputs)
        })
        .map_err(|_| PipelineError::ThreadError("map phase panicked".into()))?
    }

    fn reduce_phase(
        &self,
        partitions: Vec<Partition<String, u64>>,
        metrics: &StageMetrics,
    ) -> Result<Vec<CountPair>> {
        crossbeam::scope(|s| -> Result<Vec<CountPair>> {
            let handles: Vec<_> = partitions
                .into_iter()
                .map(|partition| {
                    let metrics = metrics.clone();
                    s.spawn(move |_| StageRunner::new(metrics).run(&mut CountAggregator, partition))
                })
                .collect();

            let mut counts = Vec::new();
            for handle in handles {
                counts.extend(join_worker(handle.join(), "aggregator")?);
            }
            Ok(counts)
        })
        .map_err(|_| PipelineError::ThreadError("reduce phase panicked".into()))?
    }

    /// Stage two: key every count, sort globally, expand buckets
    fn rank_stage<E: RankKeyEncoder>(
        &self,
        encoder: E,
        counts: Vec<CountPair>,
        metrics: &StageMetrics,
    ) -> Result<Vec<CountPair>> {
        let keyed = counts
            .into_iter()
            .map(|pair| -> Result<(E::Key, String)> {
                Ok((encoder.encode(pair.count)?, pair.item_id))
            })
            .collect::<Result<Vec<_>>>()?;

        let buckets = self
            .checked_shuffle(vec![keyed], 1)?
            .pop()
            .unwrap_or_default();
        log::debug!("Stage 2 sorted {} distinct counts", buckets.len());

        StageRunner::new(metrics.clone()).run(&mut OrderedEmitter::new(encoder), buckets)
    }

    fn checked_shuffle<K, V>(
        &self,
        map_outputs: Vec<Vec<(K, V)>>,
        partitions: usize,
    ) -> Result<Vec<Partition<K, V>>>
    where
        K: Ord + Hash + Send,
        V: Send,
    {
        let shuffled = self.shuffle.shuffle(map_outputs, partitions)?;
        if shuffled.len() != partitions {
            return Err(PipelineError::ShuffleError(format!(
                "expected {} partitions, got {}",
                partitions,
                shuffled.len()
            )));
        }
        Ok(shuffled)
    }
}
