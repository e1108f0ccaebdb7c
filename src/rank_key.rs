//! Sort keys for the second stage.
//!
//! The second stage orders items by count using nothing but the grouping
//! step's key order. An encoder turns a count into a key whose `Ord` matches
//! numeric order, and turns the key back into the count on the way out.
//!
//! [`NumericRankKey`] uses the count itself. [`PaddedRankKey`] produces
//! fixed-width decimal strings for substrates that can only sort bytes, such
//! as a Hadoop streaming shuffle. A count wider than the key is rejected
//! rather than encoded, since a wider string would sort out of place.

use crate::config::{RankKeyMode, MAX_KEY_WIDTH};
use crate::error::{PipelineError, Result};
use std::fmt::Debug;
use std::hash::Hash;

/// Turns counts into keys whose ordering matches the numeric ordering
pub trait RankKeyEncoder: Clone + Send + Sync {
    type Key: Ord + Hash + Clone + Send + Debug;

    fn encode(&self, count: u64) -> Result<Self::Key>;

    fn decode(&self, key: &Self::Key) -> Result<u64>;
}

/// Uses the count itself as the key
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericRankKey;

impl RankKeyEncoder for NumericRankKey {
    type Key = u64;

    fn encode(&self, count: u64) -> Result<u64> {
        Ok(count)
    }

    fn decode(&self, key: &u64) -> Result<u64> {
        Ok(*key)
    }
}

/// Zero-padded decimal string of a fixed width
#[derive(Debug, Clone, Copy)]
pub struct PaddedRankKey {
    width: usize,
}

/// Decimal digits needed to write `n`
pub fn decimal_width(n: u64) -> usize {
    n.checked_ilog10().map_or(1, |log| log as usize + 1)
}

impl PaddedRankKey {
    pub fn new(width: usize) -> Result<Self> {
        if width == 0 || width > MAX_KEY_WIDTH {
            return Err(PipelineError::ConfigError(format!(
                "rank key width must be between 1 and {}, got {}",
                MAX_KEY_WIDTH, width
            )));
        }
        Ok(Self { width })
    }

    /// Smallest key wide enough for every count up to `max_count`
    pub fn for_max_count(max_count: u64) -> Self {
        Self {
            width: decimal_width(max_count),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

impl RankKeyEncoder for PaddedRankKey {
    type Key = String;

    fn encode(&self, count: u64) -> Result<String> {
        if decimal_width(count) > self.width {
            return Err(PipelineError::RankKeyOverflow {
                count,
                width: self.width,
            });
        }
        Ok(format!("{:0width$}", count, width = self.width))
    }

    fn decode(&self, key: &String) -> Result<u64> {
        if key.len() != self.width || !key.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PipelineError::InvalidRankKey(format!(
                "'{}' is not a {}-digit key",
                key, self.width
            )));
        }
        key.parse()
            .map_err(|e| PipelineError::InvalidRankKey(format!("'{}': {}", key, e)))
    }
}

impl TryFrom<RankKeyMode> for PaddedRankKey {
    type Error = PipelineError;

    fn try_from(mode: RankKeyMode) -> Result<Self> {
        match mode {
            RankKeyMode::Padded { width } => PaddedRankKey::new(width),
            RankKeyMode::Numeric => Err(PipelineError::ConfigError(
                "numeric rank keys have no width".into(),
            )),
        }
    }
}
