use thiserror::Error;

/// Result type for ratings pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while running the ratings pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// An input line could not be parsed and the run is configured to abort
    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    /// A count has more decimal digits than the fixed rank key width
    #[error("Count {count} does not fit in a rank key of width {width}")]
    RankKeyOverflow { count: u64, width: usize },

    /// A rank key could not be decoded back into a count
    #[error("Invalid rank key: {0}")]
    InvalidRankKey(String),

    /// The grouping/sort step failed
    #[error("Shuffle failed: {0}")]
    ShuffleError(String),

    /// Stage execution error
    #[error("Stage execution failed: {0}")]
    StageError(String),

    /// Thread join error
    #[error("Thread join error: {0}")]
    ThreadError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Reading input or writing output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
