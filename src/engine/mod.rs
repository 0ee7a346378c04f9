//! The per-session learning and suggestion core.
//!
//! Items are plain integer ids in `[0, N)`. Buckets are classifier-backed
//! relevance categories owned by one [`Orchestrator`]; the discard pile is a
//! degenerate bucket without a model.

pub mod bucket;
pub mod classifier;
pub mod discard;
pub mod explorer;
pub mod listing;
pub mod orchestrator;
pub mod palette;
pub mod seen;
pub mod sliding;

use serde::{Deserialize, Serialize};

use crate::error::SieveError;

pub use bucket::Bucket;
pub use classifier::{LinearModel, LinearSvm, Model, Trainer};
pub use discard::DiscardPile;
pub use explorer::RandomExplorer;
pub use listing::{Channel, ItemEntry, SortOrder, TransferMode};
pub use orchestrator::{
    BucketDetail, BucketInfo, BucketSummary, Orchestrator, Verdict, classify, split_evenly,
};
pub use palette::BucketPalette;
pub use seen::SeenSet;

pub type ItemId = u32;
pub type BucketId = u32;

/// Wire id reserved for the discard pile.
pub const DISCARD_PILE_ID: i64 = 0;
/// Wire id that asks for exploration suggestions.
pub const EXPLORATION_REQUEST_ID: i64 = -1;

/// A place an item can be assigned to.
///
/// Serialized as the bucket id, with the discard pile as `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Target {
    Discard,
    Bucket(BucketId),
}

impl From<Target> for i64 {
    fn from(target: Target) -> Self {
        match target {
            Target::Discard => DISCARD_PILE_ID,
            Target::Bucket(id) => Self::from(id),
        }
    }
}

impl TryFrom<i64> for Target {
    type Error = SieveError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        if raw == DISCARD_PILE_ID {
            return Ok(Self::Discard);
        }
        BucketId::try_from(raw)
            .map(Self::Bucket)
            .map_err(|_| SieveError::UnknownBucket(raw))
    }
}

/// One key of a suggestion request.
///
/// Serialized as the bucket id, with exploration as `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum RequestTarget {
    Exploration,
    Bucket(BucketId),
}

impl From<RequestTarget> for i64 {
    fn from(target: RequestTarget) -> Self {
        match target {
            RequestTarget::Exploration => EXPLORATION_REQUEST_ID,
            RequestTarget::Bucket(id) => Self::from(id),
        }
    }
}

impl TryFrom<i64> for RequestTarget {
    type Error = SieveError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        if raw == EXPLORATION_REQUEST_ID {
            return Ok(Self::Exploration);
        }
        match BucketId::try_from(raw) {
            Ok(id) if raw != DISCARD_PILE_ID => Ok(Self::Bucket(id)),
            _ => Err(SieveError::UnknownBucket(raw)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_ids_round_trip_through_serde() {
        let targets = vec![Target::Discard, Target::Bucket(3)];
        let raw = serde_json::to_string(&targets).unwrap();
        assert_eq!(raw, "[0,3]");
        let back: Vec<Target> = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, targets);
    }

    #[test]
    fn negative_ids_are_unknown_buckets() {
        assert!(matches!(
            Target::try_from(-1),
            Err(SieveError::UnknownBucket(-1))
        ));
        assert_eq!(
            RequestTarget::try_from(-1).unwrap(),
            RequestTarget::Exploration
        );
        assert!(matches!(
            RequestTarget::try_from(0),
            Err(SieveError::UnknownBucket(0))
        ));
        assert!(RequestTarget::try_from(-7).is_err());
    }
}
