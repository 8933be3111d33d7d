//! Error types for the reactive engine.
//!
//! Nothing in the engine is fatal. Every failure mode degrades to "the write
//! was ignored" or "the computation did not run", and is reported through
//! [`ReactiveError`] where the caller can act on it.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Errors reported by the reactive engine.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A write or removal was attempted through a read-only view.
    ///
    /// The underlying object is left untouched and nothing is published.
    #[error("field `{key}` is read-only")]
    ReadOnly {
        /// The field that was targeted.
        key: String,
    },

    /// `Runtime::drain` ran more jobs than the configured limit.
    ///
    /// This almost always means a computation keeps re-queueing itself. The
    /// queue is cleared when this is returned.
    #[error("task queue did not settle after {limit} jobs")]
    DrainLimit {
        /// The configured `max_drain_jobs`.
        limit: usize,
    },

    /// Configuration could not be parsed.
    #[error("failed to parse engine configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Configuration parsed but holds an unusable value.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}
