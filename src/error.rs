//! Error types for sieve.
//!
//! User-facing failures are recoverable and reported back to the caller; the
//! session stays usable after any of them. `InvariantViolation` is the one
//! internal class: it means the engine reached a state its own bookkeeping
//! rules out, and it is logged with full context where it is raised.

use thiserror::Error;

use crate::engine::ItemId;

pub type Result<T> = std::result::Result<T, SieveError>;

#[derive(Debug, Error)]
pub enum SieveError {
    #[error("unknown bucket: {0}")]
    UnknownBucket(i64),

    #[error("the maximum number of buckets ({0}) is already reached")]
    TooManyBuckets(usize),

    #[error("at most {0} buckets may be active at any given time")]
    ActiveBucketLimitExceeded(usize),

    #[error("at least one bucket must exist, cannot delete the last one")]
    CannotDeleteLastBucket,

    #[error("bucket names can be at most {max} characters long (got {len})")]
    NameTooLong { len: usize, max: usize },

    #[error("bucket '{0}' has no trained model yet")]
    NotTrained(String),

    #[error("the number of fast-forwards must be a positive integer (got {0})")]
    InvalidFastForwardCount(String),

    #[error("cannot fast-forward the discard pile: no bucket has a trained model")]
    NoTrainedBuckets,

    #[error("item {item} is not a member of bucket '{bucket}'")]
    ItemNotInBucket { item: ItemId, bucket: String },

    #[error("item {0} is not in the discard pile")]
    ItemNotInPile(ItemId),

    #[error("invalid transfer mode '{0}' (expected move|copy)")]
    InvalidTransferMode(String),

    #[error("cannot copy items from or to the discard pile, use move")]
    InvalidCopyTarget,

    #[error("every item in the corpus has been seen")]
    DatasetExhausted,

    #[error("distance query has no items")]
    EmptyQuery,

    #[error("item {item} is outside the corpus (size {size})")]
    ItemOutOfRange { item: ItemId, size: usize },

    #[error("invalid sort order '{0}' (expected confidence|newest_first|oldest_first|fast_forward)")]
    InvalidSortOrder(String),

    #[error("invalid grid size: {0}")]
    InvalidGridSize(String),

    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("classifier training failed: {0}")]
    Training(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing configuration: {0}")]
    MissingConfig(String),

    #[error("[BUG] internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SieveError {
    /// Builds an `InvariantViolation` and logs it with its context.
    pub fn invariant(context: impl Into<String>) -> Self {
        let context = context.into();
        tracing::error!(target: "sieve::invariant", %context, "internal invariant violated");
        Self::InvariantViolation(context)
    }

    /// True for logic bugs, false for anything a caller could have caused.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownBucket(_) => "unknown_bucket",
            Self::TooManyBuckets(_) => "too_many_buckets",
            Self::ActiveBucketLimitExceeded(_) => "active_bucket_limit_exceeded",
            Self::CannotDeleteLastBucket => "cannot_delete_last_bucket",
            Self::NameTooLong { .. } => "name_too_long",
            Self::NotTrained(_) => "not_trained",
            Self::InvalidFastForwardCount(_) => "invalid_fast_forward_count",
            Self::NoTrainedBuckets => "no_trained_buckets",
            Self::ItemNotInBucket { .. } => "item_not_in_bucket",
            Self::ItemNotInPile(_) => "item_not_in_pile",
            Self::InvalidTransferMode(_) => "invalid_transfer_mode",
            Self::InvalidCopyTarget => "invalid_copy_target",
            Self::DatasetExhausted => "dataset_exhausted",
            Self::EmptyQuery => "empty_query",
            Self::ItemOutOfRange { .. } => "item_out_of_range",
            Self::InvalidSortOrder(_) => "invalid_sort_order",
            Self::InvalidGridSize(_) => "invalid_grid_size",
            Self::UnknownSession(_) => "unknown_session",
            Self::Training(_) => "training_failed",
            Self::Dataset(_) => "dataset_error",
            Self::Config(_) | Self::MissingConfig(_) => "config_error",
            Self::InvariantViolation(_) => "internal_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_violations_are_logged_with_context() {
        let (err, logs) = crate::test_utils::logging::capture("error", || {
            SieveError::invariant("3 items but 2 colors")
        });
        assert!(err.is_internal());
        crate::assert_logged!(logs, tracing::Level::ERROR, "internal invariant violated");
        assert_eq!(logs[0].field("context"), Some("3 items but 2 colors"));
    }

    #[test]
    fn only_invariant_violations_are_internal() {
        assert!(SieveError::InvariantViolation("x".into()).is_internal());
        assert!(!SieveError::DatasetExhausted.is_internal());
        assert!(!SieveError::UnknownBucket(3).is_internal());
    }

    #[test]
    fn codes_are_snake_case() {
        let errors = [
            SieveError::CannotDeleteLastBucket,
            SieveError::NoTrainedBuckets,
            SieveError::InvalidCopyTarget,
            SieveError::EmptyQuery,
            SieveError::ActiveBucketLimitExceeded(7),
        ];
        for err in errors {
            let code = err.code();
            assert!(code.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{code}");
        }
    }

    #[test]
    fn messages_carry_context() {
        let err = SieveError::ItemNotInBucket {
            item: 42,
            bucket: "Cats".into(),
        };
        assert_eq!(err.to_string(), "item 42 is not a member of bucket 'Cats'");
    }
}
