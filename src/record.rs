//! Parsing of raw rating lines.

use crate::config::MalformedPolicy;
use crate::error::{PipelineError, Result};
use crate::metrics::StageMetrics;
use crate::stage::Stage;

/// Field separator of the input format
pub const FIELD_DELIMITER: char = '\t';

/// Fields per rating line: user id, item id, rating, timestamp
pub const FIELD_COUNT: usize = 4;

/// Skipped lines logged at `warn` per parser before dropping to `debug`
const WARN_LIMIT: u64 = 10;

/// One parsed rating line, borrowed from the input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingEvent<'a> {
    pub user_id: &'a str,
    pub item_id: &'a str,
    pub rating: f64,
    pub timestamp: &'a str,
}

impl<'a> RatingEvent<'a> {
    /// Parse a tab-separated line. The error is a description of what is wrong.
    pub fn parse(line: &'a str) -> std::result::Result<Self, String> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
        if fields.len() != FIELD_COUNT {
            return Err(format!(
                "expected {} tab-separated fields, found {}",
                FIELD_COUNT,
                fields.len()
            ));
        }

        let rating: f64 = fields[2]
            .trim()
            .parse()
            .map_err(|_| format!("rating '{}' is not a number", fields[2]))?;
        if !rating.is_finite() {
            return Err(format!("rating '{}' is not finite", fields[2]));
        }

        Ok(Self {
            user_id: fields[0],
            item_id: fields[1],
            rating,
            timestamp: fields[3],
        })
    }
}

/// A numbered raw input line (numbers start at 1), without its `\n`.
///
/// Bytes stay undecoded until a parser sees them, so a line that is not
/// UTF-8 falls under the malformed policy like any other bad line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub number: u64,
    pub bytes: Vec<u8>,
}

impl Line {
    /// Wrap the raw bytes of line `number`
    pub fn new(number: u64, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            number,
            bytes: bytes.into(),
        }
    }
}

/// Map-side stage: emits `(item_id, 1)` for every valid rating line
pub struct RecordParser {
    policy: MalformedPolicy,
    metrics: StageMetrics,
    skipped: u64,
}

impl RecordParser {
    /// Create a parser applying `policy` and counting skips into `metrics`
    pub fn new(policy: MalformedPolicy, metrics: StageMetrics) -> Self {
        Self {
            policy,
            metrics,
            skipped: 0,
        }
    }

    fn reject(&mut self, number: u64, reason: String) -> Result<Vec<(String, u64)>> {
        match self.policy {
            MalformedPolicy::Abort => Err(PipelineError::MalformedRecord {
                line: number,
                reason,
            }),
            MalformedPolicy::Skip => {
                self.metrics.record_malformed();
                self.skipped += 1;
                if self.skipped <= WARN_LIMIT {
                    log::warn!("Skipping malformed line {}: {}", number, reason);
                } else {
                    log::debug!("Skipping malformed line {}: {}", number, reason);
                }
                Ok(vec![])
            }
        }
    }
}

impl Stage for RecordParser {
    type Input = Line;
    type Output = (String, u64);

    fn process(&mut self, input: Line) -> Result<Vec<(String, u64)>> {
        let text = match std::str::from_utf8(&input.bytes) {
            Ok(text) => text,
            Err(e) => {
                let reason = format!("not valid UTF-8 ({})", e);
                return self.reject(input.number, reason);
            }
        };
        if text.trim().is_empty() {
            return Ok(vec![]);
        }

        match RatingEvent::parse(text) {
            Ok(event) => Ok(vec![(event.item_id.to_string(), 1)]),
            Err(reason) => self.reject(input.number, reason),
        }
    }

    fn on_shutdown(&mut self) -> Result<()> {
        if self.skipped > WARN_LIMIT {
            log::warn!(
                "{} malformed lines skipped by one parser ({} not shown)",
                self.skipped,
                self.skipped - WARN_LIMIT
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "record_parser"
    }
}
