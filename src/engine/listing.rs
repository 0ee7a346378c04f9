//! Item lists handed back to callers: suggestions and bucket contents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::{ItemId, Target};
use crate::error::{Result, SieveError};

/// Base suggestion outline width; scaled up by confidence.
pub const LINE_THICKNESS: f64 = 4.0;

/// Where a suggestion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Classifier,
    NearestNeighbor,
    Exploration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEntry {
    pub item: ItemId,
    /// `None` for exploration output, which belongs to no bucket.
    pub bucket: Option<Target>,
    pub confidence: Option<f64>,
    pub confidence_color: Option<String>,
    pub line_thickness: Option<f64>,
    pub is_fast_forward: bool,
    pub is_query: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ItemEntry {
    #[must_use]
    pub const fn exploration(item: ItemId) -> Self {
        Self {
            item,
            bucket: None,
            confidence: None,
            confidence_color: None,
            line_thickness: None,
            is_fast_forward: false,
            is_query: false,
            channel: Some(Channel::Exploration),
            url: None,
        }
    }
}

/// Parallel per-item columns that make up a list.
///
/// Optional flag columns default to all-false.
#[derive(Debug, Default)]
pub struct ListColumns<'a> {
    pub items: &'a [ItemId],
    pub confidences: &'a [Option<f64>],
    pub colors: &'a [Option<String>],
    pub fast_forward: Option<&'a [bool]>,
    pub queries: Option<&'a [bool]>,
    pub channels: Option<&'a [Channel]>,
}

/// Zips the columns into entries. Columns of unequal length are a logic
/// error on the caller's side and surface as `InvariantViolation`.
pub fn build_entries(bucket: Option<Target>, columns: &ListColumns<'_>) -> Result<Vec<ItemEntry>> {
    let n = columns.items.len();
    let lengths = [
        ("confidences", columns.confidences.len()),
        ("colors", columns.colors.len()),
        ("fast_forward", columns.fast_forward.map_or(n, <[bool]>::len)),
        ("queries", columns.queries.map_or(n, <[bool]>::len)),
        ("channels", columns.channels.map_or(n, <[Channel]>::len)),
    ];
    if let Some((name, len)) = lengths.iter().find(|(_, len)| *len != n) {
        return Err(SieveError::invariant(format!(
            "list columns disagree: {n} items but {len} {name} (bucket {bucket:?})"
        )));
    }

    Ok((0..n)
        .map(|i| {
            let confidence = columns.confidences[i];
            ItemEntry {
                item: columns.items[i],
                bucket,
                confidence,
                confidence_color: columns.colors[i].clone(),
                line_thickness: confidence.map(|c| c.mul_add(LINE_THICKNESS, LINE_THICKNESS)),
                is_fast_forward: columns.fast_forward.is_some_and(|flags| flags[i]),
                is_query: columns.queries.is_some_and(|flags| flags[i]),
                channel: columns.channels.map(|channels| channels[i]),
                url: None,
            }
        })
        .collect())
}

/// Ordering of a bucket listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Confidence,
    NewestFirst,
    OldestFirst,
    /// Staged fast-forward items first, then committed members.
    FastForward,
}

impl FromStr for SortOrder {
    type Err = SieveError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "confidence" => Ok(Self::Confidence),
            "newest_first" => Ok(Self::NewestFirst),
            "oldest_first" => Ok(Self::OldestFirst),
            "fast_forward" => Ok(Self::FastForward),
            other => Err(SieveError::InvalidSortOrder(other.to_string())),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Confidence => "confidence",
            Self::NewestFirst => "newest_first",
            Self::OldestFirst => "oldest_first",
            Self::FastForward => "fast_forward",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    Move,
    Copy,
}

impl FromStr for TransferMode {
    type Err = SieveError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "move" => Ok(Self::Move),
            "copy" => Ok(Self::Copy),
            other => Err(SieveError::InvalidTransferMode(other.to_string())),
        }
    }
}
