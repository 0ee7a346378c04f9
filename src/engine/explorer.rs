//! Model-free exploration suggestions.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::dataset::DatasetContext;
use crate::engine::ItemId;
use crate::engine::seen::SeenSet;

/// Suggests unseen items far away from everything seen so far.
///
/// Keeps the last list it produced so that a round can be re-rendered
/// without changing the exploration items.
#[derive(Debug, Clone)]
pub struct RandomExplorer {
    cache: Vec<ItemId>,
    oversample_factor: usize,
}

impl RandomExplorer {
    #[must_use]
    pub fn new(oversample_factor: usize) -> Self {
        Self {
            cache: Vec::new(),
            oversample_factor: oversample_factor.max(1),
        }
    }

    /// Up to `n` unseen items outside `exclude`.
    ///
    /// Without `refresh`, still-unseen cached items are reused first and only
    /// the shortfall is drawn. New items come from a random pool of
    /// `oversample_factor` times the shortfall, ranked by distance to the
    /// nearest seen item, farthest first. Returns fewer than `n` items only
    /// when the unseen corpus runs out.
    pub fn suggest<R: Rng + ?Sized>(
        &mut self,
        n: usize,
        refresh: bool,
        exclude: &[ItemId],
        seen: &SeenSet,
        dataset: &DatasetContext,
        rng: &mut R,
    ) -> Vec<ItemId> {
        let excluded: HashSet<ItemId> = exclude.iter().copied().collect();
        let mut suggestions: Vec<ItemId> = if refresh {
            Vec::new()
        } else {
            self.cache
                .iter()
                .copied()
                .filter(|item| !seen.is_seen(*item) && !excluded.contains(item))
                .take(n)
                .collect()
        };

        let shortfall = n - suggestions.len();
        if shortfall > 0 {
            let mut avoid: Vec<ItemId> = exclude.to_vec();
            avoid.extend_from_slice(&suggestions);
            let pool_size = shortfall.saturating_mul(self.oversample_factor);
            match seen.random_unseen(pool_size, &avoid, rng) {
                Ok(pool) => {
                    let ranked = Self::rank(pool, seen, dataset, rng);
                    suggestions.extend(ranked.into_iter().take(shortfall));
                }
                Err(err) => tracing::debug!(%err, "no unseen items left to explore"),
            }
        }

        tracing::trace!(n, refresh, produced = suggestions.len(), "exploration suggestions");
        self.cache.clone_from(&suggestions);
        suggestions
    }

    fn rank<R: Rng + ?Sized>(
        mut pool: Vec<ItemId>,
        seen: &SeenSet,
        dataset: &DatasetContext,
        rng: &mut R,
    ) -> Vec<ItemId> {
        let Some(index) = dataset.index() else {
            pool.shuffle(rng);
            return pool;
        };
        if seen.is_empty() {
            pool.shuffle(rng);
            return pool;
        }

        match index.min_distances(&pool, &seen.items()) {
            Ok(distances) => {
                let mut ranked: Vec<(ItemId, f64)> = pool.into_iter().zip(distances).collect();
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
                ranked.into_iter().map(|(item, _)| item).collect()
            }
            Err(err) => {
                tracing::warn!(%err, "distance index query failed, exploring uniformly");
                pool.shuffle(rng);
                pool
            }
        }
    }
}
