//! Hadoop streaming entry points.
//!
//! The same job can run on a Hadoop cluster. There, the framework's
//! shuffle-and-sort replaces [`crate::shuffle`]:
//!
//! - step 1: `ratings_mapper` | sort | `ratings_count_reducer`
//! - step 2: identity mapper | sort | `ratings_sort_reducer` (one reduce task)
//!
//! Hadoop compares keys as bytes, so stage two uses [`PaddedRankKey`]. Run
//! step 2 with a single reduce task; with more, each output file is only
//! sorted within itself.
//!
//! Settings come from the task environment (`-cmdenv`):
//! `RATINGS_ON_MALFORMED` (`skip` or `abort`) and `RATINGS_KEY_WIDTH`.

use crate::aggregate::{CountAggregator, CountPair};
use crate::config::{MalformedPolicy, DEFAULT_KEY_WIDTH};
use crate::emit::OrderedEmitter;
use crate::error::{PipelineError, Result};
use crate::metrics::StageMetrics;
use crate::rank_key::{PaddedRankKey, RankKeyEncoder};
use crate::record::{Line, RecordParser};
use crate::stage::Stage;
use clap::ValueEnum;
use efflux::prelude::{Context, Mapper, Reducer};
use std::env;

pub const ON_MALFORMED_ENV: &str = "RATINGS_ON_MALFORMED";
pub const KEY_WIDTH_ENV: &str = "RATINGS_KEY_WIDTH";

/// Task settings read from the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingSettings {
    pub malformed_policy: MalformedPolicy,
    pub key_width: usize,
}

impl StreamingSettings {
    /// Read the settings of the current streaming task
    pub fn from_env() -> Result<Self> {
        Self::from_vars(
            env::var(ON_MALFORMED_ENV).ok().as_deref(),
            env::var(KEY_WIDTH_ENV).ok().as_deref(),
        )
    }

    /// Build settings from raw variable values; `None` means unset
    pub fn from_vars(policy: Option<&str>, key_width: Option<&str>) -> Result<Self> {
        let malformed_policy = match policy {
            Some(value) => MalformedPolicy::from_str(value.trim(), true).map_err(|_| {
                PipelineError::ConfigError(format!(
                    "{} must be 'skip' or 'abort', got '{}'",
                    ON_MALFORMED_ENV, value
                ))
            })?,
            None => MalformedPolicy::default(),
        };
        let key_width = match key_width {
            Some(value) => value.trim().parse().map_err(|_| {
                PipelineError::ConfigError(format!(
                    "{} must be a number, got '{}'",
                    KEY_WIDTH_ENV, value
                ))
            })?,
            None => DEFAULT_KEY_WIDTH,
        };
        // Reject bad widths before any record is read.
        PaddedRankKey::new(key_width)?;
        Ok(Self {
            malformed_policy,
            key_width,
        })
    }

    fn encoder(&self) -> PaddedRankKey {
        PaddedRankKey::new(self.key_width).unwrap_or_else(|e| fail(e))
    }
}

/// Log a fatal error and fail the streaming task
pub fn fail(err: PipelineError) -> ! {
    log::error!("{}", err);
    std::process::exit(1)
}

/// Parse the `1` (or partial count) values of one item
pub fn parse_unit_counts(values: &[&[u8]]) -> Result<Vec<u64>> {
    values
        .iter()
        .map(|value| {
            std::str::from_utf8(value)
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .ok_or_else(|| {
                    PipelineError::StageError(format!(
                        "count value '{}' is not a number",
                        String::from_utf8_lossy(value)
                    ))
                })
        })
        .collect()
}

/// Sum one item's values and key the result for the sort step
pub fn rank_group(
    encoder: &PaddedRankKey,
    item_id: &[u8],
    values: &[&[u8]],
) -> Result<Vec<(String, String)>> {
    let item_id = String::from_utf8_lossy(item_id).into_owned();
    let units = parse_unit_counts(values)?;
    CountAggregator
        .process((item_id, units))?
        .into_iter()
        .map(|pair| -> Result<(String, String)> {
            Ok((encoder.encode(pair.count)?, pair.item_id))
        })
        .collect()
}

/// Expand one sorted rank key and its items into count pairs.
///
/// efflux closes every reduce task with one more call, which carries an
/// empty key and no values when the task saw no input at all.
pub fn expand_bucket(
    emitter: &mut OrderedEmitter<PaddedRankKey>,
    rank_key: &[u8],
    items: &[&[u8]],
) -> Result<Vec<CountPair>> {
    if items.is_empty() {
        return Ok(vec![]);
    }
    let rank_key = std::str::from_utf8(rank_key)
        .map_err(|_| PipelineError::InvalidRankKey("key is not UTF-8".into()))?
        .trim()
        .to_string();
    let items = items
        .iter()
        .map(|item| String::from_utf8_lossy(item).into_owned())
        .collect();
    emitter.process((rank_key, items))
}

/// Step 1 mapper: `item_id<TAB>1` per valid rating line
pub struct RatingsMapper {
    parser: RecordParser,
    metrics: StageMetrics,
    line: u64,
}

impl RatingsMapper {
    pub fn new(settings: &StreamingSettings) -> Self {
        let metrics = StageMetrics::new();
        Self {
            parser: RecordParser::new(settings.malformed_policy, metrics.clone()),
            metrics,
            line: 0,
        }
    }

    /// Parse the next line of this task's input split
    pub fn parse_next(&mut self, value: &[u8]) -> Result<Vec<(String, u64)>> {
        // numbered within this task's input split
        self.line += 1;
        self.parser.process(Line::new(self.line, value))
    }
}

impl Mapper for RatingsMapper {
    fn map(&mut self, _offset: usize, value: &[u8], ctx: &mut Context) {
        match self.parse_next(value) {
            Ok(pairs) => {
                for (item_id, n) in pairs {
                    ctx.write(item_id.as_bytes(), n.to_string().as_bytes());
                }
            }
            Err(e) => fail(e),
        }
    }
}

impl Drop for RatingsMapper {
    fn drop(&mut self) {
        log::info!(
            "Mapper read {} lines, skipped {} malformed",
            self.line,
            self.metrics.total_malformed()
        );
    }
}

/// Step 1 reducer: `rank_key<TAB>item_id` per item
pub struct CountReducer {
    encoder: PaddedRankKey,
}

impl CountReducer {
    pub fn new(settings: &StreamingSettings) -> Self {
        Self {
            encoder: settings.encoder(),
        }
    }
}

impl Reducer for CountReducer {
    fn reduce(&mut self, key: &[u8], values: &[&[u8]], ctx: &mut Context) {
        match rank_group(&self.encoder, key, values) {
            Ok(keyed) => {
                for (rank_key, item_id) in keyed {
                    ctx.write(rank_key.as_bytes(), item_id.as_bytes());
                }
            }
            Err(e) => fail(e),
        }
    }
}

/// Step 2 reducer: `item_id<TAB>count` for every item under a sorted key
pub struct SortReducer {
    emitter: OrderedEmitter<PaddedRankKey>,
}

impl SortReducer {
    pub fn new(settings: &StreamingSettings) -> Self {
        Self {
            emitter: OrderedEmitter::new(settings.encoder()),
        }
    }
}

impl Reducer for SortReducer {
    fn reduce(&mut self, key: &[u8], values: &[&[u8]], ctx: &mut Context) {
        match expand_bucket(&mut self.emitter, key, values) {
            Ok(pairs) => {
                for pair in pairs {
                    ctx.write(pair.item_id.as_bytes(), pair.count.to_string().as_bytes());
                }
            }
            Err(e) => fail(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values<'a>(raw: &[&'a str]) -> Vec<&'a [u8]> {
        raw.iter().map(|v| v.as_bytes()).collect()
    }

    #[test]
    fn test_settings_defaults() {
        let settings = StreamingSettings::from_vars(None, None).unwrap();
        assert_eq!(settings.malformed_policy, MalformedPolicy::Skip);
        assert_eq!(settings.key_width, DEFAULT_KEY_WIDTH);
    }

    #[test]
    fn test_settings_from_vars() {
        let settings = StreamingSettings::from_vars(Some("ABORT"), Some(" 8 ")).unwrap();
        assert_eq!(settings.malformed_policy, MalformedPolicy::Abort);
        assert_eq!(settings.key_width, 8);

        assert!(StreamingSettings::from_vars(Some("ignore"), None).is_err());
        assert!(StreamingSettings::from_vars(None, Some("wide")).is_err());
        assert!(StreamingSettings::from_vars(None, Some("0")).is_err());
    }

    #[test]
    fn test_parse_unit_counts() {
        assert_eq!(
            parse_unit_counts(&values(&["1", "1", "3"])).unwrap(),
            vec![1, 1, 3]
        );
        assert!(parse_unit_counts(&values(&["1", "one"])).is_err());
    }

    #[test]
    fn test_rank_group_pads_count() {
        let encoder = PaddedRankKey::new(5).unwrap();
        let keyed = rank_group(&encoder, b"200", &values(&["1", "1", "1"])).unwrap();
        assert_eq!(keyed, vec![("00003".to_string(), "200".to_string())]);
    }

    #[test]
    fn test_rank_group_overflow() {
        let encoder = PaddedRankKey::new(1).unwrap();
        let result = rank_group(&encoder, b"200", &values(&["1"; 10]));
        assert!(matches!(result, Err(PipelineError::RankKeyOverflow { .. })));
    }

    #[test]
    fn test_expand_bucket() {
        let mut emitter = OrderedEmitter::new(PaddedRankKey::new(5).unwrap());
        let pairs = expand_bucket(&mut emitter, b"00004", &values(&["9", "12"])).unwrap();
        assert_eq!(pairs, vec![CountPair::new("12", 4), CountPair::new("9", 4)]);
    }

    #[test]
    fn test_expand_bucket_empty_group() {
        let mut emitter = OrderedEmitter::new(PaddedRankKey::new(5).unwrap());
        assert!(expand_bucket(&mut emitter, b"", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_reducers_accept_empty_input() {
        let settings = StreamingSettings::from_vars(None, None).unwrap();
        let mut ctx = Context::new();

        // would exit the test process if either reducer failed
        CountReducer::new(&settings).reduce(b"", &[], &mut ctx);
        SortReducer::new(&settings).reduce(b"", &[], &mut ctx);
    }

    #[test]
    fn test_mapper_numbers_lines_and_skips_bad_ones() {
        let settings = StreamingSettings::from_vars(None, None).unwrap();
        let mut mapper = RatingsMapper::new(&settings);

        assert_eq!(
            mapper.parse_next(b"1\t100\t4.5\t20190601").unwrap(),
            vec![("100".to_string(), 1)]
        );
        assert!(mapper.parse_next(b"2\t\xff\xfe\t3.0\t20190522").unwrap().is_empty());
        assert!(mapper.parse_next(b"bad").unwrap().is_empty());
        assert_eq!(mapper.line, 3);
        assert_eq!(mapper.metrics.total_malformed(), 2);
    }

    #[test]
    fn test_mapper_aborts_on_invalid_utf8() {
        let settings = StreamingSettings::from_vars(Some("abort"), None).unwrap();
        let mut mapper = RatingsMapper::new(&settings);

        mapper.parse_next(b"1\t100\t4.5\t20190601").unwrap();
        match mapper.parse_next(b"2\t\xff\t3.0\t20190522") {
            Err(PipelineError::MalformedRecord { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected MalformedRecord, got {:?}", other),
        }
    }
}
