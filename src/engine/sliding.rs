//! Exploration/exploitation sliding.
//!
//! Each bucket tracks, per model-driven channel, how many of its recent
//! suggestions the user accepted. The resulting confidences decide how the
//! next round's slots are split between the classifier, the nearest-neighbor
//! search and random exploration.

use std::collections::{BTreeMap, HashSet, VecDeque};

use rand::Rng;

use crate::engine::ItemId;
use crate::engine::listing::Channel;

/// Channels with a success-rate window. Exploration gets whatever is left.
const TRACKED: [Channel; 2] = [Channel::Classifier, Channel::NearestNeighbor];

#[derive(Debug, Clone)]
struct Window {
    hits: VecDeque<usize>,
    totals: VecDeque<usize>,
}

impl Window {
    fn new(len: usize) -> Self {
        Self {
            hits: std::iter::repeat_n(0, len).collect(),
            totals: std::iter::repeat_n(0, len).collect(),
        }
    }

    fn push(&mut self, hits: usize, total: usize) {
        self.hits.pop_front();
        self.totals.pop_front();
        self.hits.push_back(hits);
        self.totals.push_back(total);
    }

    fn confidence(&self) -> f64 {
        let total: usize = self.totals.iter().sum();
        if total == 0 {
            return 1.0;
        }
        let hits: usize = self.hits.iter().sum();
        #[allow(clippy::cast_precision_loss)]
        let rate = hits as f64 / total as f64;
        rate.sqrt()
    }
}

/// How many slots each channel gets this round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelSplit {
    pub classifier: usize,
    pub nearest_neighbor: usize,
    pub exploration: usize,
}

#[derive(Debug, Clone)]
pub struct SlidingState {
    windows: BTreeMap<Channel, Window>,
    outstanding: BTreeMap<Channel, Vec<ItemId>>,
}

impl SlidingState {
    #[must_use]
    pub fn new(n_rounds: usize) -> Self {
        Self {
            windows: TRACKED
                .iter()
                .map(|&channel| (channel, Window::new(n_rounds)))
                .collect(),
            outstanding: BTreeMap::new(),
        }
    }

    /// `sqrt(hits / total)` over the window; 1.0 while nothing was suggested.
    #[must_use]
    pub fn confidence(&self, channel: Channel) -> f64 {
        self.windows.get(&channel).map_or(1.0, Window::confidence)
    }

    /// Remembers what a channel suggested until the next feedback.
    pub fn record(&mut self, channel: Channel, items: Vec<ItemId>) {
        if self.windows.contains_key(&channel) {
            self.outstanding.insert(channel, items);
        }
    }

    /// Slides every window by one round, counting which outstanding
    /// suggestions came back as good. Outstanding suggestions are consumed.
    pub fn update(&mut self, good: &[ItemId]) {
        let good: HashSet<ItemId> = good.iter().copied().collect();
        for (channel, window) in &mut self.windows {
            let suggested = self.outstanding.remove(channel).unwrap_or_default();
            let hits = suggested.iter().filter(|item| good.contains(item)).count();
            window.push(hits, suggested.len());
            tracing::trace!(?channel, hits, total = suggested.len(), "sliding window updated");
        }
    }

    /// Roulette cut points on `[0, 1)`: below the first goes to the
    /// classifier, below the second to nearest neighbors, the rest explores.
    #[must_use]
    pub fn thresholds(&self) -> (f64, f64) {
        let classifier = self.confidence(Channel::Classifier);
        let index = self.confidence(Channel::NearestNeighbor);
        (classifier, index.mul_add(1.0 - classifier, classifier))
    }

    pub fn split<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> ChannelSplit {
        let (first, second) = self.thresholds();
        let mut split = ChannelSplit::default();
        for _ in 0..n {
            let roll: f64 = rng.random();
            if roll <= first {
                split.classifier += 1;
            } else if roll <= second {
                split.nearest_neighbor += 1;
            } else {
                split.exploration += 1;
            }
        }
        split
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn fresh_state_is_fully_confident() {
        let state = SlidingState::new(5);
        assert_eq!(state.confidence(Channel::Classifier), 1.0);
        assert_eq!(state.thresholds(), (1.0, 1.0));

        let mut rng = StdRng::seed_from_u64(2);
        let split = state.split(10, &mut rng);
        assert_eq!(split.classifier, 10);
    }

    #[test]
    fn confidence_is_root_of_hit_rate() {
        let mut state = SlidingState::new(3);
        state.record(Channel::Classifier, vec![1, 2, 3, 4]);
        state.record(Channel::NearestNeighbor, vec![5, 6]);
        state.update(&[1]);

        assert!((state.confidence(Channel::Classifier) - 0.5).abs() < 1e-12);
        assert_eq!(state.confidence(Channel::NearestNeighbor), 0.0);

        let (first, second) = state.thresholds();
        assert!((first - 0.5).abs() < 1e-12);
        assert!((second - 0.5).abs() < 1e-12);
    }

    #[test]
    fn old_rounds_fall_out_of_the_window() {
        let mut state = SlidingState::new(2);
        state.record(Channel::Classifier, vec![1, 2]);
        state.update(&[]);
        assert_eq!(state.confidence(Channel::Classifier), 0.0);

        state.record(Channel::Classifier, vec![3]);
        state.update(&[3]);
        state.record(Channel::Classifier, vec![4]);
        state.update(&[4]);
        assert_eq!(state.confidence(Channel::Classifier), 1.0);
    }

    #[test]
    fn outstanding_suggestions_are_consumed_by_an_update() {
        let mut state = SlidingState::new(2);
        state.record(Channel::Classifier, vec![1, 2]);
        state.update(&[1, 2]);
        state.update(&[]);
        assert_eq!(state.confidence(Channel::Classifier), 1.0);
    }

    #[test]
    fn exploration_is_never_tracked() {
        let mut state = SlidingState::new(2);
        state.record(Channel::Exploration, vec![1]);
        state.update(&[]);
        assert_eq!(state.confidence(Channel::Exploration), 1.0);
    }
}
