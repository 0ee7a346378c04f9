//! Items the user has already been shown or has otherwise consumed.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::engine::ItemId;
use crate::error::{Result, SieveError};

/// Monotonically growing set of seen items over a corpus of fixed size.
#[derive(Debug, Clone)]
pub struct SeenSet {
    seen: Vec<bool>,
    count: usize,
}

impl SeenSet {
    #[must_use]
    pub fn new(corpus_size: usize) -> Self {
        Self {
            seen: vec![false; corpus_size],
            count: 0,
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub fn corpus_size(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.count == self.seen.len()
    }

    #[must_use]
    pub fn is_seen(&self, item: ItemId) -> bool {
        self.seen.get(item as usize).copied().unwrap_or(false)
    }

    /// Marks items as seen.
    ///
    /// Out-of-range ids reject the whole batch. Insertions are kept even when
    /// the batch exhausts the corpus; `DatasetExhausted` is returned only by
    /// the call that crosses into exhaustion.
    pub fn update<I>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = ItemId>,
    {
        let items: Vec<ItemId> = items.into_iter().collect();
        if let Some(&bad) = items.iter().find(|&&item| item as usize >= self.seen.len()) {
            return Err(SieveError::ItemOutOfRange {
                item: bad,
                size: self.seen.len(),
            });
        }

        let was_exhausted = self.is_exhausted();
        for item in items {
            let slot = &mut self.seen[item as usize];
            if !*slot {
                *slot = true;
                self.count += 1;
            }
        }

        if !was_exhausted && self.is_exhausted() {
            tracing::info!(corpus_size = self.seen.len(), "every item has been seen");
            return Err(SieveError::DatasetExhausted);
        }
        Ok(())
    }

    /// All seen items in ascending order.
    #[must_use]
    pub fn items(&self) -> Vec<ItemId> {
        self.ids().filter(|&item| self.seen[item as usize]).collect()
    }

    /// All unseen items outside `exclude`, ascending.
    #[must_use]
    pub fn all_unseen(&self, exclude: &[ItemId]) -> Vec<ItemId> {
        let exclude: HashSet<ItemId> = exclude.iter().copied().collect();
        self.ids()
            .filter(|item| !self.seen[*item as usize] && !exclude.contains(item))
            .collect()
    }

    /// Drops seen and excluded items from `items`, keeping first occurrences.
    #[must_use]
    pub fn remove_seen(&self, items: &[ItemId], exclude: &[ItemId]) -> Vec<ItemId> {
        let mut skip: HashSet<ItemId> = exclude.iter().copied().collect();
        items
            .iter()
            .copied()
            .filter(|&item| !self.is_seen(item) && skip.insert(item))
            .collect()
    }

    /// Uniform sample of up to `n` unseen items outside `exclude`.
    ///
    /// Returns every candidate when fewer than `n` remain, and
    /// `DatasetExhausted` when none do.
    pub fn random_unseen<R: Rng + ?Sized>(
        &self,
        n: usize,
        exclude: &[ItemId],
        rng: &mut R,
    ) -> Result<Vec<ItemId>> {
        let candidates = self.all_unseen(exclude);
        if candidates.is_empty() {
            return Err(SieveError::DatasetExhausted);
        }
        if n >= candidates.len() {
            return Ok(candidates);
        }
        Ok(candidates.choose_multiple(rng, n).copied().collect())
    }

    fn ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        (0..self.seen.len()).filter_map(|item| ItemId::try_from(item).ok())
    }
}
