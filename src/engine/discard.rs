//! The discard pile: rejected items, no classifier.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::engine::listing::{ItemEntry, ListColumns, SortOrder, build_entries};
use crate::engine::palette::DISCARD_LISTING_COLOR;
use crate::engine::seen::SeenSet;
use crate::engine::{ItemId, Target};
use crate::error::{Result, SieveError};

pub const DISCARD_PILE_NAME: &str = "Discard pile";

#[derive(Debug, Clone, Default)]
pub struct DiscardPile {
    pile: Vec<ItemId>,
    staged: Vec<ItemId>,
}

impl DiscardPile {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pile.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pile.is_empty()
    }

    #[must_use]
    pub fn items(&self) -> &[ItemId] {
        &self.pile
    }

    #[must_use]
    pub fn staged(&self) -> &[ItemId] {
        &self.staged
    }

    #[must_use]
    pub fn contains(&self, item: ItemId) -> bool {
        self.pile.contains(&item) || self.staged.contains(&item)
    }

    /// Appends items in order, skipping ones already in the pile.
    pub fn discard(&mut self, items: &[ItemId]) {
        let mut present: HashSet<ItemId> = self.pile.iter().copied().collect();
        for &item in items {
            if present.insert(item) {
                self.pile.push(item);
            }
        }
        self.staged.retain(|item| !present.contains(item));
    }

    /// Takes items back out of the pile or its staged fast-forward.
    ///
    /// Nothing changes unless every item is found. Restored staged items were
    /// shown to the user and become seen.
    pub fn restore(&mut self, items: &[ItemId], seen: &mut SeenSet) -> Result<()> {
        if let Some(&missing) = items.iter().find(|&&item| !self.contains(item)) {
            return Err(SieveError::ItemNotInPile(missing));
        }

        let restore: HashSet<ItemId> = items.iter().copied().collect();
        let from_staged: Vec<ItemId> = self
            .staged
            .iter()
            .copied()
            .filter(|item| restore.contains(item))
            .collect();
        self.pile.retain(|item| !restore.contains(item));
        self.staged.retain(|item| !restore.contains(item));

        seen.update(from_staged)
    }

    /// Replaces the staged fast-forward.
    pub fn fast_forward(&mut self, items: Vec<ItemId>) {
        self.staged = items;
    }

    /// Moves the staged items onto the pile and marks them seen.
    pub fn ff_commit(&mut self, seen: &mut SeenSet) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        self.discard(&staged);
        seen.update(staged)
    }

    /// Up to `n` distinct pile items outside `exclude`, uniformly.
    pub fn random_sample<R: Rng + ?Sized>(
        &self,
        n: usize,
        exclude: &HashSet<ItemId>,
        rng: &mut R,
    ) -> Vec<ItemId> {
        let candidates: Vec<ItemId> = self
            .pile
            .iter()
            .copied()
            .filter(|item| !exclude.contains(item))
            .collect();
        candidates.choose_multiple(rng, n).copied().collect()
    }

    /// The pile has no confidences; `Confidence` falls back to newest first.
    pub fn listing(&self, sort: SortOrder) -> Result<Vec<ItemEntry>> {
        let (items, fast_forward): (Vec<ItemId>, Option<Vec<bool>>) = match sort {
            SortOrder::Confidence | SortOrder::NewestFirst => {
                (self.pile.iter().rev().copied().collect(), None)
            }
            SortOrder::OldestFirst => (self.pile.clone(), None),
            SortOrder::FastForward => {
                let items = self.staged.iter().chain(&self.pile).copied().collect();
                let flags = std::iter::repeat_n(true, self.staged.len())
                    .chain(std::iter::repeat_n(false, self.pile.len()))
                    .collect();
                (items, Some(flags))
            }
        };

        let confidences = vec![None; items.len()];
        let colors = vec![Some(DISCARD_LISTING_COLOR.to_string()); items.len()];
        build_entries(
            Some(Target::Discard),
            &ListColumns {
                items: &items,
                confidences: &confidences,
                colors: &colors,
                fast_forward: fast_forward.as_deref(),
                ..ListColumns::default()
            },
        )
    }
}
