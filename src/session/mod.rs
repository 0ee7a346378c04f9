//! One user's analytic session: an orchestrator plus the interaction mode
//! that decides how each round's suggestions are requested.

pub mod protocol;
pub mod registry;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::config::{Config, SessionConfig};
use crate::dataset::DatasetContext;
use crate::engine::{
    BucketId, BucketInfo, BucketSummary, ItemEntry, ItemId, Orchestrator, RequestTarget,
    SortOrder, Target, TransferMode, split_evenly,
};
use crate::error::{Result, SieveError};

pub use protocol::{Request, Response};
pub use registry::{SessionRegistry, SessionSummary};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// One suggestion at a time.
    Single,
    #[default]
    Grid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridDim {
    Rows,
    Cols,
}

impl FromStr for GridDim {
    type Err = SieveError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "rows" => Ok(Self::Rows),
            "cols" => Ok(Self::Cols),
            other => Err(SieveError::InvalidGridSize(format!(
                "unknown grid dimension '{other}'"
            ))),
        }
    }
}

impl fmt::Display for GridDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rows => "rows",
            Self::Cols => "cols",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridView {
    pub grid_images: Vec<ItemEntry>,
    /// Every shown item, unjudged. Callers fill it in and send it back.
    pub feedback: BTreeMap<ItemId, Option<Target>>,
    pub n_rows: usize,
    pub n_cols: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RoundView {
    Single { suggestion: Option<ItemEntry> },
    Grid(GridView),
}

impl RoundView {
    /// The shown items, in display order.
    #[must_use]
    pub fn items(&self) -> Vec<&ItemEntry> {
        match self {
            Self::Single { suggestion } => suggestion.iter().collect(),
            Self::Grid(grid) => grid.grid_images.iter().collect(),
        }
    }
}

#[derive(Debug)]
pub struct AnalyticSession {
    orchestrator: Orchestrator,
    settings: SessionConfig,
    mode: Mode,
    n_rows: usize,
    n_cols: usize,
}

impl AnalyticSession {
    pub fn new(dataset: Arc<DatasetContext>, config: &Config) -> Result<Self> {
        Ok(Self {
            orchestrator: Orchestrator::new(dataset, config)?,
            settings: config.session.clone(),
            mode: Mode::default(),
            n_rows: config.session.grid_rows,
            n_cols: config.session.grid_cols,
        })
    }

    #[must_use]
    pub const fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub const fn grid_size(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    pub const fn toggle_mode(&mut self) -> Mode {
        self.mode = match self.mode {
            Mode::Single => Mode::Grid,
            Mode::Grid => Mode::Single,
        };
        self.mode
    }

    /// Bucket info with archetypes resolved to display strings.
    #[must_use]
    pub fn bucket_info(&self) -> BucketInfo {
        let mut info = self.orchestrator.bucket_info();
        let dataset = self.orchestrator.dataset();
        for detail in &mut info.buckets {
            detail.archetype_urls = detail.archetypes.iter().map(|&a| dataset.url(a)).collect();
        }
        info
    }

    pub fn create_bucket(&mut self) -> Result<BucketSummary> {
        self.orchestrator.create_bucket()
    }

    pub fn delete_bucket(&mut self, id: BucketId) -> Result<BucketSummary> {
        self.orchestrator.delete_bucket(id)
    }

    pub fn rename_bucket(&mut self, id: BucketId, name: &str) -> Result<BucketSummary> {
        self.orchestrator.rename_bucket(id, name)
    }

    pub fn swap_buckets(&mut self, first: BucketId, second: BucketId) -> Result<()> {
        self.orchestrator.swap_buckets(first, second)
    }

    pub fn toggle_bucket(&mut self, id: BucketId) -> Result<BucketSummary> {
        self.orchestrator.toggle_bucket(id)
    }

    pub fn fast_forward(&mut self, target: Target, n: i64) -> Result<()> {
        self.orchestrator.fast_forward(target, n)
    }

    pub fn ff_commit(&mut self, target: Target) -> Result<()> {
        self.orchestrator.ff_commit(target)
    }

    pub fn transfer_images(
        &mut self,
        items: &[ItemId],
        src: Target,
        dst: Target,
        mode: TransferMode,
    ) -> Result<()> {
        self.orchestrator.transfer_images(items, src, dst, mode)
    }

    pub fn bucket_view_data(&self, target: Target, sort: SortOrder) -> Result<Vec<ItemEntry>> {
        let mut entries = self.orchestrator.bucket_view_data(target, sort)?;
        self.attach_urls(&mut entries);
        Ok(entries)
    }

    pub fn bucket_name(&self, target: Target) -> Result<String> {
        self.orchestrator.bucket_name(target)
    }

    /// Applies feedback without asking for new suggestions.
    pub fn submit_feedback(&mut self, feedback: &BTreeMap<ItemId, Option<Target>>) -> Result<()> {
        self.orchestrator.user_feedback(feedback)
    }

    /// Applies feedback and produces the next round's suggestions.
    pub fn interaction_round(
        &mut self,
        feedback: &BTreeMap<ItemId, Option<Target>>,
        refresh_exploration: bool,
    ) -> Result<RoundView> {
        self.orchestrator.user_feedback(feedback)?;
        let request = self.build_request();
        tracing::debug!(mode = ?self.mode, ?request, "suggestion request");

        let mut entries = self.orchestrator.suggest(&request, refresh_exploration)?;
        self.attach_urls(&mut entries);

        Ok(match self.mode {
            Mode::Single => RoundView::Single {
                suggestion: entries.into_iter().next(),
            },
            Mode::Grid => RoundView::Grid(GridView {
                feedback: entries.iter().map(|e| (e.item, None)).collect(),
                grid_images: entries,
                n_rows: self.n_rows,
                n_cols: self.n_cols,
            }),
        })
    }

    fn build_request(&mut self) -> Vec<(RequestTarget, usize)> {
        let candidates = self.orchestrator.active_and_trained_buckets();
        let chance = self.settings.random_suggestion_chance;
        match self.mode {
            Mode::Single => {
                let rng = self.orchestrator.rng();
                let target = if rng.random::<f64>() < chance {
                    RequestTarget::Exploration
                } else {
                    candidates
                        .choose(rng)
                        .map_or(RequestTarget::Exploration, |&id| RequestTarget::Bucket(id))
                };
                vec![(target, 1)]
            }
            Mode::Grid => {
                let slots = self.n_rows * self.n_cols;
                if candidates.is_empty() {
                    return vec![(RequestTarget::Exploration, slots)];
                }
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let n_random = ((slots as f64 * chance).round() as usize).min(slots);
                let mut request = vec![(RequestTarget::Exploration, n_random)];
                request.extend(
                    candidates
                        .iter()
                        .zip(split_evenly(slots - n_random, candidates.len()))
                        .map(|(&id, n)| (RequestTarget::Bucket(id), n)),
                );
                request
            }
        }
    }

    /// Resizes the grid and re-renders it without new exploration items.
    pub fn grid_set_size(&mut self, dim: GridDim, size: i64) -> Result<RoundView> {
        let max = match dim {
            GridDim::Rows => self.settings.grid_max_rows,
            GridDim::Cols => self.settings.grid_max_cols,
        };
        let size = usize::try_from(size)
            .ok()
            .filter(|&s| s > 0 && s <= max)
            .ok_or_else(|| {
                SieveError::InvalidGridSize(format!("{dim} must be between 1 and {max}, got {size}"))
            })?;
        match dim {
            GridDim::Rows => self.n_rows = size,
            GridDim::Cols => self.n_cols = size,
        }
        self.interaction_round(&BTreeMap::new(), false)
    }

    fn attach_urls(&self, entries: &mut [ItemEntry]) {
        let dataset = self.orchestrator.dataset();
        for entry in entries {
            entry.url = Some(dataset.url(entry.item));
        }
    }
}
