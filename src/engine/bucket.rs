//! Classifier-backed relevance categories.
//!
//! A bucket is Untrained until its first retrain with at least one member and
//! drops back to Untrained when retraining finds no members. Only a trained
//! bucket can suggest, fast-forward or produce discard candidates.

use std::collections::HashSet;

use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;

use crate::config::{ModelConfig, NeighborMethod, OracleMode};
use crate::dataset::DatasetContext;
use crate::engine::classifier::Model;
use crate::engine::discard::DiscardPile;
use crate::engine::explorer::RandomExplorer;
use crate::engine::listing::{Channel, ItemEntry, ListColumns, SortOrder, build_entries};
use crate::engine::palette::confidence_color;
use crate::engine::seen::SeenSet;
use crate::engine::sliding::SlidingState;
use crate::engine::{BucketId, ItemId, Target};
use crate::error::{Result, SieveError};

/// Session state a bucket reads (and, for commits, writes) but does not own.
pub struct Env<'a> {
    pub dataset: &'a DatasetContext,
    pub config: &'a ModelConfig,
    pub seen: &'a mut SeenSet,
    pub discard: &'a DiscardPile,
    pub explorer: &'a mut RandomExplorer,
    pub rng: &'a mut StdRng,
}

#[derive(Debug, Clone, PartialEq)]
struct Member {
    item: ItemId,
    score: f64,
    confidence: f64,
    color: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Staged {
    item: ItemId,
    confidence: f64,
    color: String,
}

/// Whether feedback answers a suggestion round or places items directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedbackSource {
    Round,
    Direct,
}

#[derive(Debug)]
pub struct Bucket {
    id: BucketId,
    name: String,
    ordering: usize,
    active: bool,
    color: String,

    members: Vec<Member>,
    negatives: Vec<ItemId>,
    model: Option<Box<dyn Model>>,
    best_score: f64,

    n_good: usize,
    n_judged: usize,
    precision: f64,

    staged: Vec<Staged>,
    rejected: Vec<ItemId>,

    sliding: Option<SlidingState>,
    queries: HashSet<ItemId>,
    active_suggestions: Option<Vec<ItemEntry>>,
}

impl Bucket {
    #[must_use]
    pub fn new(
        id: BucketId,
        name: String,
        ordering: usize,
        active: bool,
        color: String,
        config: &ModelConfig,
    ) -> Self {
        Self {
            id,
            name,
            ordering,
            active,
            color,
            members: Vec::new(),
            negatives: Vec::new(),
            model: None,
            best_score: 0.0,
            n_good: 0,
            n_judged: 0,
            precision: 1.0,
            staged: Vec::new(),
            rejected: Vec::new(),
            sliding: config
                .exploration
                .as_ref()
                .map(|exploration| SlidingState::new(exploration.n_rounds)),
            queries: HashSet::new(),
            active_suggestions: None,
        }
    }

    #[must_use]
    pub const fn id(&self) -> BucketId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn ordering(&self) -> usize {
        self.ordering
    }

    pub const fn set_ordering(&mut self, ordering: usize) {
        self.ordering = ordering;
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    pub const fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    #[must_use]
    pub fn color(&self) -> &str {
        &self.color
    }

    #[must_use]
    pub const fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    #[must_use]
    pub const fn precision(&self) -> f64 {
        self.precision
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn members(&self) -> Vec<ItemId> {
        self.members.iter().map(|m| m.item).collect()
    }

    #[must_use]
    pub fn confidences(&self) -> Vec<f64> {
        self.members.iter().map(|m| m.confidence).collect()
    }

    #[must_use]
    pub fn negatives(&self) -> &[ItemId] {
        &self.negatives
    }

    #[must_use]
    pub fn staged(&self) -> Vec<ItemId> {
        self.staged.iter().map(|s| s.item).collect()
    }

    #[must_use]
    pub fn rejected(&self) -> &[ItemId] {
        &self.rejected
    }

    #[must_use]
    pub fn pending_queries(&self) -> &HashSet<ItemId> {
        &self.queries
    }

    #[must_use]
    pub fn active_suggestions(&self) -> Option<&[ItemEntry]> {
        self.active_suggestions.as_deref()
    }

    #[must_use]
    pub const fn sliding(&self) -> Option<&SlidingState> {
        self.sliding.as_ref()
    }

    #[must_use]
    pub fn contains(&self, item: ItemId) -> bool {
        self.members.iter().any(|m| m.item == item)
    }

    pub fn rename(&mut self, name: &str, max_len: usize) -> Result<()> {
        let len = name.chars().count();
        if len > max_len {
            return Err(SieveError::NameTooLong { len, max: max_len });
        }
        self.name = name.to_string();
        Ok(())
    }

    /// The `n` highest-confidence members, or every member when there are
    /// fewer than `n`.
    #[must_use]
    pub fn archetypes(&self, n: usize) -> Vec<ItemId> {
        if self.members.len() < n {
            return self.members();
        }
        let mut ranked: Vec<&Member> = self.members.iter().collect();
        ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        ranked.into_iter().take(n).map(|m| m.item).collect()
    }

    fn confidence(&self, score: f64) -> f64 {
        if self.best_score > 0.0 {
            (score / self.best_score).clamp(0.0, 1.0)
        } else if score >= self.best_score {
            // degenerate model: no member scores positive
            1.0
        } else {
            0.0
        }
    }

    fn require_model(&self) -> Result<&dyn Model> {
        self.model
            .as_deref()
            .ok_or_else(|| SieveError::NotTrained(self.name.clone()))
    }

    /// Feedback from one round: `good` were suggested here and accepted,
    /// `neutral` were placed here without being suggested, `bad` were
    /// suggested here and placed elsewhere.
    ///
    /// Only round feedback slides the exploration windows.
    pub fn user_feedback(
        &mut self,
        good: &[ItemId],
        neutral: &[ItemId],
        bad: &[ItemId],
        env: &mut Env<'_>,
    ) -> Result<()> {
        self.apply_feedback(good, neutral, bad, FeedbackSource::Round, env)
    }

    /// Places items here outside a suggestion round, as a transfer does.
    /// Precision, the sliding windows and pending queries are untouched.
    pub fn assign(&mut self, items: &[ItemId], env: &mut Env<'_>) -> Result<()> {
        self.apply_feedback(&[], items, &[], FeedbackSource::Direct, env)
    }

    fn apply_feedback(
        &mut self,
        good: &[ItemId],
        neutral: &[ItemId],
        bad: &[ItemId],
        source: FeedbackSource,
        env: &mut Env<'_>,
    ) -> Result<()> {
        if good.is_empty() && neutral.is_empty() && bad.is_empty() {
            return Ok(());
        }
        let round = source == FeedbackSource::Round;

        // Answers to uncertainty queries are labels, not verdicts on a
        // suggestion: accepted ones count as neutral, rejected ones go to
        // the negatives without touching precision.
        let (query_good, good): (Vec<ItemId>, Vec<ItemId>) =
            good.iter().partition(|item| self.queries.contains(*item));
        let (query_bad, bad): (Vec<ItemId>, Vec<ItemId>) =
            bad.iter().partition(|item| self.queries.contains(*item));
        if round && matches!(env.config.oracle, OracleMode::ActiveLearning { .. }) {
            self.queries.clear();
        }

        self.n_good += good.len();
        self.n_judged += good.len() + bad.len();
        if round {
            if let Some(sliding) = &mut self.sliding {
                sliding.update(&good);
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let precision = if self.n_judged == 0 {
            1.0
        } else {
            self.n_good as f64 / self.n_judged as f64
        };
        self.precision = precision;

        let additions: Vec<ItemId> = good
            .iter()
            .chain(neutral)
            .chain(&query_good)
            .copied()
            .collect();
        self.add_members(&additions);
        self.add_negatives(query_bad.iter().chain(&bad).copied());
        self.active_suggestions = None;

        tracing::debug!(
            bucket = self.id,
            ?source,
            good = good.len(),
            neutral = neutral.len() + query_good.len(),
            bad = bad.len(),
            query_negatives = query_bad.len(),
            precision = self.precision,
            "bucket feedback"
        );

        self.retrain(env)
    }

    fn add_members(&mut self, items: &[ItemId]) {
        let mut present: HashSet<ItemId> = self.members.iter().map(|m| m.item).collect();
        for &item in items {
            if present.insert(item) {
                self.members.push(Member {
                    item,
                    score: 0.0,
                    confidence: 0.0,
                    color: confidence_color(&self.color, 0.0),
                });
            }
        }
        self.negatives.retain(|item| !present.contains(item));
    }

    fn add_negatives(&mut self, items: impl Iterator<Item = ItemId>) {
        let mut present: HashSet<ItemId> = self.negatives.iter().copied().collect();
        present.extend(self.members.iter().map(|m| m.item));
        for item in items {
            if present.insert(item) {
                self.negatives.push(item);
            }
        }
    }

    /// Refits the classifier on the current members.
    ///
    /// Negatives are the bucket's own, padded up to twice the member count
    /// from the discard pile and then from random corpus items.
    pub fn retrain(&mut self, env: &mut Env<'_>) -> Result<()> {
        let positives = self.members();
        if positives.is_empty() {
            if self.model.take().is_some() {
                tracing::debug!(bucket = self.id, "bucket emptied, model dropped");
            }
            self.best_score = 0.0;
            return Ok(());
        }

        let mut train_items = positives.clone();
        train_items.extend_from_slice(&self.negatives);
        let wanted = 2 * positives.len();
        let mut random_fill = 0;
        if self.negatives.len() < wanted {
            let shortfall = wanted - self.negatives.len();
            let taken: HashSet<ItemId> = train_items.iter().copied().collect();
            let pile = env.discard.random_sample(shortfall, &taken, env.rng);
            random_fill = shortfall - pile.len();
            train_items.extend(pile);
        }

        let features = env
            .dataset
            .features()
            .matrix(&train_items, random_fill, env.rng)?;
        let n_negatives = features.n_rows() - positives.len();
        let labels: Vec<f64> = std::iter::repeat_n(1.0, positives.len())
            .chain(std::iter::repeat_n(-1.0, n_negatives))
            .collect();
        let model = env.dataset.trainer().train(&features, &labels)?;

        let member_rows = env.dataset.features().matrix(&positives, 0, env.rng)?;
        let scores = model.score_matrix(&member_rows);
        self.model = Some(model);
        self.best_score = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        for (member, score) in self.members.iter_mut().zip(scores) {
            member.score = score;
        }
        for i in 0..self.members.len() {
            let confidence = self.confidence(self.members[i].score);
            self.members[i].confidence = confidence;
            self.members[i].color = confidence_color(&self.color, confidence);
        }

        tracing::trace!(
            bucket = self.id,
            positives = positives.len(),
            negatives = n_negatives,
            best_score = self.best_score,
            "bucket retrained"
        );
        Ok(())
    }

    /// Unseen items outside `exclude` with their scores, best first (or
    /// worst first when `ascending`).
    fn ranked_unseen(
        &self,
        model: &dyn Model,
        exclude: &HashSet<ItemId>,
        ascending: bool,
        env: &Env<'_>,
    ) -> Vec<(ItemId, f64)> {
        let scores = model.score_matrix(env.dataset.features().all());
        let mut ranked: Vec<(ItemId, f64)> = scores
            .into_iter()
            .enumerate()
            .filter_map(|(i, score)| ItemId::try_from(i).ok().map(|item| (item, score)))
            .filter(|(item, _)| !env.seen.is_seen(*item) && !exclude.contains(item))
            .collect();
        if ascending {
            ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        } else {
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        }
        ranked
    }

    /// Up to `n` suggestions for this bucket, never touching `exclude`.
    ///
    /// Active-learning queries are drawn first from the whole unseen ranking
    /// and appended last. With sliding enabled, the remaining slots are split
    /// between classifier, nearest-neighbor and exploration channels.
    pub fn suggest(
        &mut self,
        n: usize,
        exclude: &[ItemId],
        env: &mut Env<'_>,
    ) -> Result<Vec<ItemEntry>> {
        let model = self.require_model()?;
        let excluded: HashSet<ItemId> = exclude.iter().copied().collect();
        let mut ranking = self.ranked_unseen(model, &excluded, false, env);

        let mut queries = Vec::new();
        if let OracleMode::ActiveLearning { ratio } = env.config.oracle {
            let n_queries = (0..n).filter(|_| env.rng.random_bool(ratio)).count();
            let mut by_uncertainty: Vec<usize> = (0..ranking.len()).collect();
            by_uncertainty.sort_by(|&a, &b| {
                ranking[a]
                    .1
                    .abs()
                    .total_cmp(&ranking[b].1.abs())
                    .then(a.cmp(&b))
            });
            by_uncertainty.truncate(n_queries);
            queries = by_uncertainty.iter().map(|&i| ranking[i].0).collect();
            let picked: HashSet<usize> = by_uncertainty.into_iter().collect();
            ranking = ranking
                .into_iter()
                .enumerate()
                .filter(|(i, _)| !picked.contains(i))
                .map(|(_, entry)| entry)
                .collect();
        }
        let n_regular = n - queries.len();

        ranking.truncate(env.config.n_suggestion_candidates);
        let candidates: Vec<ItemId> = ranking.into_iter().map(|(item, _)| item).collect();

        let mut channels: Vec<(Channel, Vec<ItemId>)> = Vec::new();
        if let Some(sliding) = &self.sliding {
            let split = sliding.split(n_regular, env.rng);
            let classifier: Vec<ItemId> = candidates.iter().copied().take(split.classifier).collect();

            let mut chosen: Vec<ItemId> = exclude.to_vec();
            chosen.extend(&queries);
            chosen.extend(&classifier);
            let neighbors = self.neighbor_suggestions(split.nearest_neighbor, &chosen, env)?;
            chosen.extend(&neighbors);

            let n_explore = split.exploration + (split.nearest_neighbor - neighbors.len());
            let exploration = if n_explore > 0 {
                env.explorer
                    .suggest(n_explore, true, &chosen, env.seen, env.dataset, env.rng)
            } else {
                Vec::new()
            };

            tracing::trace!(
                bucket = self.id,
                classifier = classifier.len(),
                nearest_neighbor = neighbors.len(),
                exploration = exploration.len(),
                queries = queries.len(),
                "suggestion split"
            );
            channels.push((Channel::Classifier, classifier));
            channels.push((Channel::NearestNeighbor, neighbors));
            channels.push((Channel::Exploration, exploration));
        } else {
            channels.push((
                Channel::Classifier,
                candidates.into_iter().take(n_regular).collect(),
            ));
        }

        if let Some(sliding) = &mut self.sliding {
            for (channel, items) in &channels {
                sliding.record(*channel, items.clone());
            }
        }
        if matches!(env.config.oracle, OracleMode::ActiveLearning { .. }) {
            self.queries = queries.iter().copied().collect();
        }

        let mut items = Vec::with_capacity(n);
        let mut item_channels = Vec::with_capacity(n);
        for (channel, list) in &channels {
            items.extend(list);
            item_channels.extend(std::iter::repeat_n(*channel, list.len()));
        }
        let n_suggested = items.len();
        items.extend(&queries);
        item_channels.extend(std::iter::repeat_n(Channel::Classifier, queries.len()));
        let is_query: Vec<bool> = std::iter::repeat_n(false, n_suggested)
            .chain(std::iter::repeat_n(true, queries.len()))
            .collect();

        let entries = self.scored_entries(&items, Some(&is_query), Some(&item_channels), env)?;
        self.active_suggestions = Some(entries.clone());
        Ok(entries)
    }

    fn scored_entries(
        &self,
        items: &[ItemId],
        is_query: Option<&[bool]>,
        channels: Option<&[Channel]>,
        env: &mut Env<'_>,
    ) -> Result<Vec<ItemEntry>> {
        let model = self.require_model()?;
        let rows = env.dataset.features().matrix(items, 0, env.rng)?;
        let confidences: Vec<Option<f64>> = model
            .score_matrix(&rows)
            .into_iter()
            .map(|score| Some(self.confidence(score)))
            .collect();
        let colors: Vec<Option<String>> = confidences
            .iter()
            .map(|c| c.map(|c| confidence_color(&self.color, c)))
            .collect();
        build_entries(
            Some(Target::Bucket(self.id)),
            &ListColumns {
                items,
                confidences: &confidences,
                colors: &colors,
                queries: is_query,
                channels,
                ..ListColumns::default()
            },
        )
    }

    fn neighbor_suggestions(
        &self,
        n: usize,
        exclude: &[ItemId],
        env: &mut Env<'_>,
    ) -> Result<Vec<ItemId>> {
        if n == 0 || self.members.is_empty() {
            return Ok(Vec::new());
        }
        let Some(index) = env.dataset.index() else {
            return Ok(Vec::new());
        };
        let method = env
            .config
            .exploration
            .as_ref()
            .map_or(NeighborMethod::Ann, |e| e.method);

        match method {
            NeighborMethod::Ann => {
                let pool = if env.seen.corpus_size() > env.config.ann_sample_cap {
                    match env
                        .seen
                        .random_unseen(env.config.ann_sample_cap, exclude, env.rng)
                    {
                        Ok(pool) => pool,
                        Err(SieveError::DatasetExhausted) => Vec::new(),
                        Err(err) => return Err(err),
                    }
                } else {
                    env.seen.all_unseen(exclude)
                };
                if pool.is_empty() {
                    return Ok(Vec::new());
                }

                let mut exemplars: Vec<&Member> = self.members.iter().collect();
                exemplars.sort_by(|a, b| b.score.total_cmp(&a.score));
                let exemplars: Vec<ItemId> = exemplars
                    .into_iter()
                    .take(env.config.ann_max_exemplars.max(1))
                    .map(|m| m.item)
                    .collect();

                let distances = index.min_distances(&pool, &exemplars)?;
                let mut ranked: Vec<(ItemId, f64)> = pool.into_iter().zip(distances).collect();
                ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
                Ok(ranked.into_iter().take(n).map(|(item, _)| item).collect())
            }
            NeighborMethod::Knn => {
                if !index.has_knn() {
                    return Ok(Vec::new());
                }
                let members = self.members();
                let exemplars: Vec<ItemId> = members
                    .choose_multiple(env.rng, env.config.knn_max_exemplars.max(1))
                    .copied()
                    .collect();
                let neighbours: Vec<ItemId> = exemplars
                    .iter()
                    .filter_map(|&item| index.neighbours(item))
                    .flatten()
                    .copied()
                    .collect();
                let candidates = env.seen.remove_seen(&neighbours, exclude);
                Ok(candidates.choose_multiple(env.rng, n).copied().collect())
            }
        }
    }

    /// Stages the `n` best unseen items for review, clearing earlier rejects.
    pub fn fast_forward(&mut self, n: usize, env: &mut Env<'_>) -> Result<()> {
        let model = self.require_model()?;
        let ranking = self.ranked_unseen(model, &HashSet::new(), false, env);
        self.staged = ranking
            .into_iter()
            .take(n)
            .map(|(item, score)| {
                let confidence = self.confidence(score);
                Staged {
                    item,
                    confidence,
                    color: confidence_color(&self.color, confidence),
                }
            })
            .collect();
        self.rejected.clear();
        tracing::debug!(bucket = self.id, staged = self.staged.len(), "bucket fast-forwarded");
        Ok(())
    }

    /// Commits the staged items as accepted and the rejects as refused.
    ///
    /// Staged and rejected items become seen; a `DatasetExhausted` from that
    /// update is returned after the feedback has been applied.
    pub fn ff_commit(&mut self, env: &mut Env<'_>) -> Result<()> {
        let staged = self.staged();
        let rejected = std::mem::take(&mut self.rejected);
        self.staged.clear();

        let seen_update = env.seen.update(staged.iter().chain(&rejected).copied());
        self.apply_feedback(&staged, &[], &rejected, FeedbackSource::Direct, env)?;
        seen_update
    }

    /// The `n` lowest-scoring unseen items outside `exclude`.
    pub fn discard_candidates(
        &self,
        n: usize,
        exclude: &[ItemId],
        env: &Env<'_>,
    ) -> Result<Vec<ItemId>> {
        let model = self.require_model()?;
        let excluded: HashSet<ItemId> = exclude.iter().copied().collect();
        Ok(self
            .ranked_unseen(model, &excluded, true, env)
            .into_iter()
            .take(n)
            .map(|(item, _)| item)
            .collect())
    }

    /// Checks that every item is a member or staged, without changing
    /// anything.
    pub fn check_removable(&self, items: &[ItemId]) -> Result<()> {
        if let Some(&missing) = items
            .iter()
            .find(|&&item| !self.contains(item) && !self.staged.iter().any(|s| s.item == item))
        {
            return Err(SieveError::ItemNotInBucket {
                item: missing,
                bucket: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Removes members, or turns staged items into rejects, then retrains.
    pub fn remove_items(&mut self, items: &[ItemId], env: &mut Env<'_>) -> Result<()> {
        self.check_removable(items)?;
        let remove: HashSet<ItemId> = items.iter().copied().collect();
        self.rejected.extend(
            self.staged
                .iter()
                .filter(|s| remove.contains(&s.item))
                .map(|s| s.item),
        );
        self.staged.retain(|s| !remove.contains(&s.item));
        self.members.retain(|m| !remove.contains(&m.item));
        self.active_suggestions = None;
        self.retrain(env)
    }

    pub fn listing(&self, sort: SortOrder) -> Result<Vec<ItemEntry>> {
        let by_confidence = |entries: &mut Vec<(ItemId, f64, String)>| {
            entries.sort_by(|a, b| b.1.total_cmp(&a.1));
        };
        let members: Vec<(ItemId, f64, String)> = self
            .members
            .iter()
            .map(|m| (m.item, m.confidence, m.color.clone()))
            .collect();

        let (rows, n_staged) = match sort {
            SortOrder::Confidence => {
                let mut rows = members;
                by_confidence(&mut rows);
                (rows, 0)
            }
            SortOrder::NewestFirst => (members.into_iter().rev().collect(), 0),
            SortOrder::OldestFirst => (members, 0),
            SortOrder::FastForward => {
                let mut staged: Vec<(ItemId, f64, String)> = self
                    .staged
                    .iter()
                    .map(|s| (s.item, s.confidence, s.color.clone()))
                    .collect();
                by_confidence(&mut staged);
                let mut members = members;
                by_confidence(&mut members);
                let n_staged = staged.len();
                staged.extend(members);
                (staged, n_staged)
            }
        };

        let items: Vec<ItemId> = rows.iter().map(|r| r.0).collect();
        let confidences: Vec<Option<f64>> = rows.iter().map(|r| Some(r.1)).collect();
        let colors: Vec<Option<String>> = rows.into_iter().map(|r| Some(r.2)).collect();
        let fast_forward: Vec<bool> = (0..items.len()).map(|i| i < n_staged).collect();
        build_entries(
            Some(Target::Bucket(self.id)),
            &ListColumns {
                items: &items,
                confidences: &confidences,
                colors: &colors,
                fast_forward: (sort == SortOrder::FastForward).then_some(fast_forward.as_slice()),
                ..ListColumns::default()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::config::SvmConfig;
    use crate::dataset::{SyntheticCorpus, SyntheticSpec};
    use crate::engine::palette::PALETTE;

    struct Fixture {
        corpus: SyntheticCorpus,
        dataset: DatasetContext,
        config: ModelConfig,
        seen: SeenSet,
        discard: DiscardPile,
        explorer: RandomExplorer,
        rng: StdRng,
    }

    impl Fixture {
        fn new(config: ModelConfig) -> Self {
            let corpus = SyntheticCorpus::generate(&SyntheticSpec {
                n_items: 200,
                separation: 10.0,
                spread: 0.5,
                ..SyntheticSpec::default()
            });
            let dataset = corpus.context(&SvmConfig::default()).unwrap();
            let mut fixture = Self {
                seen: SeenSet::new(corpus.labels.len()),
                corpus,
                dataset,
                config,
                discard: DiscardPile::new(),
                explorer: RandomExplorer::new(10),
                rng: StdRng::seed_from_u64(17),
            };
            // three items of every other cluster give clean negatives
            let pile: Vec<ItemId> = (1..5)
                .flat_map(|label| fixture.corpus.members_of(label)[..3].to_vec())
                .collect();
            fixture.seen.update(pile.iter().copied()).unwrap();
            fixture.discard.discard(&pile);
            fixture
        }

        fn env(&mut self) -> Env<'_> {
            Env {
                dataset: &self.dataset,
                config: &self.config,
                seen: &mut self.seen,
                discard: &self.discard,
                explorer: &mut self.explorer,
                rng: &mut self.rng,
            }
        }

        fn bucket(&self) -> Bucket {
            Bucket::new(1, "Bucket 1".into(), 0, true, PALETTE[0].into(), &self.config)
        }

        /// Trains `bucket` on the first `n` items of cluster 0.
        fn seed(&mut self, bucket: &mut Bucket, n: usize) -> Vec<ItemId> {
            let items = self.corpus.members_of(0)[..n].to_vec();
            self.seen.update(items.iter().copied()).unwrap();
            bucket.user_feedback(&[], &items, &[], &mut self.env()).unwrap();
            items
        }

        fn in_cluster(&self, items: &[ItemEntry], label: usize) -> bool {
            items
                .iter()
                .all(|entry| self.corpus.label_of(entry.item).unwrap() == label)
        }
    }

    fn without_sliding() -> ModelConfig {
        ModelConfig {
            exploration: None,
            ..ModelConfig::default()
        }
    }

    #[test]
    fn empty_feedback_changes_nothing() {
        let mut fx = Fixture::new(ModelConfig::default());
        let mut bucket = fx.bucket();
        bucket.user_feedback(&[], &[], &[], &mut fx.env()).unwrap();
        assert!(!bucket.is_trained());
        assert!(bucket.is_empty());
        assert!((bucket.precision() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_feedback_leaves_a_trained_bucket_alone() {
        let mut fx = Fixture::new(ModelConfig::default());
        let mut bucket = fx.bucket();
        fx.seed(&mut bucket, 5);
        let round = bucket.suggest(4, &[], &mut fx.env()).unwrap();
        let items: Vec<ItemId> = round.iter().map(|e| e.item).collect();
        bucket
            .user_feedback(&items[..2], &[], &items[2..], &mut fx.env())
            .unwrap();
        bucket.suggest(4, &[], &mut fx.env()).unwrap();

        let precision = bucket.precision();
        let sliding = bucket.sliding().unwrap().clone();
        let confidences = bucket.confidences();
        let negatives = bucket.negatives().to_vec();
        assert!((precision - 0.5).abs() < 1e-12);

        bucket.user_feedback(&[], &[], &[], &mut fx.env()).unwrap();

        assert!((bucket.precision() - precision).abs() < f64::EPSILON);
        for channel in [Channel::Classifier, Channel::NearestNeighbor] {
            let after = bucket.sliding().unwrap().confidence(channel);
            assert!((after - sliding.confidence(channel)).abs() < f64::EPSILON);
        }
        assert_eq!(bucket.confidences(), confidences);
        assert_eq!(bucket.negatives(), negatives.as_slice());
        assert!(bucket.active_suggestions().is_some());
    }

    #[test]
    fn assignments_and_commits_do_not_slide_the_windows() {
        let mut fx = Fixture::new(ModelConfig::default());
        let mut bucket = fx.bucket();
        fx.seed(&mut bucket, 5);
        let round = bucket.suggest(4, &[], &mut fx.env()).unwrap();
        assert!(round.iter().all(|e| e.channel == Some(Channel::Classifier)));
        let accepted: Vec<ItemId> = round.iter().map(|e| e.item).collect();

        let extra = fx.corpus.members_of(0)[10];
        bucket.assign(&[extra], &mut fx.env()).unwrap();
        assert!(bucket.contains(extra));
        bucket.fast_forward(2, &mut fx.env()).unwrap();
        bucket.ff_commit(&mut fx.env()).unwrap();

        bucket.user_feedback(&accepted, &[], &[], &mut fx.env()).unwrap();
        let sliding = bucket.sliding().unwrap();
        assert!((sliding.confidence(Channel::Classifier) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn feedback_trains_and_normalizes_confidences() {
        let mut fx = Fixture::new(ModelConfig::default());
        let mut bucket = fx.bucket();
        let items = fx.seed(&mut bucket, 5);

        assert!(bucket.is_trained());
        assert_eq!(bucket.members(), items);
        let confidences = bucket.confidences();
        assert!(confidences.iter().all(|c| (0.0..=1.0).contains(c)));
        assert!(confidences.iter().any(|c| (c - 1.0).abs() < 1e-9));
    }

    #[test]
    fn suggestions_follow_the_classifier() {
        let mut fx = Fixture::new(without_sliding());
        let mut bucket = fx.bucket();
        fx.seed(&mut bucket, 5);

        let exclude = fx.corpus.members_of(0)[5..7].to_vec();
        let suggestions = bucket.suggest(10, &exclude, &mut fx.env()).unwrap();
        assert_eq!(suggestions.len(), 10);
        assert!(fx.in_cluster(&suggestions, 0));
        assert!(suggestions.iter().all(|e| !exclude.contains(&e.item)));
        assert!(suggestions.iter().all(|e| !fx.seen.is_seen(e.item)));
        assert!(
            suggestions
                .iter()
                .all(|e| e.bucket == Some(Target::Bucket(1)) && e.confidence.is_some())
        );
        assert_eq!(bucket.active_suggestions().map(<[ItemEntry]>::len), Some(10));
    }

    #[test]
    fn untrained_buckets_cannot_suggest() {
        let mut fx = Fixture::new(ModelConfig::default());
        let mut bucket = fx.bucket();
        let err = bucket.suggest(3, &[], &mut fx.env()).unwrap_err();
        assert!(matches!(err, SieveError::NotTrained(_)));
        assert!(matches!(
            bucket.fast_forward(3, &mut fx.env()),
            Err(SieveError::NotTrained(_))
        ));
    }

    #[test]
    fn a_missing_classifier_hands_slots_to_neighbors() {
        let mut fx = Fixture::new(ModelConfig::default());
        let mut bucket = fx.bucket();
        fx.seed(&mut bucket, 5);

        let first = bucket.suggest(5, &[], &mut fx.env()).unwrap();
        assert!(
            first
                .iter()
                .all(|e| e.channel == Some(Channel::Classifier))
        );
        let rejected: Vec<ItemId> = first.iter().map(|e| e.item).collect();
        fx.seen.update(rejected.iter().copied()).unwrap();
        bucket.user_feedback(&[], &[], &rejected, &mut fx.env()).unwrap();
        assert!(bucket.precision().abs() < f64::EPSILON);

        let sliding = bucket.sliding().unwrap();
        assert!(sliding.confidence(Channel::Classifier).abs() < f64::EPSILON);
        let second = bucket.suggest(5, &[], &mut fx.env()).unwrap();
        assert_eq!(second.len(), 5);
        assert!(
            second
                .iter()
                .all(|e| e.channel == Some(Channel::NearestNeighbor))
        );
        assert!(fx.in_cluster(&second, 0));
    }

    #[test]
    fn query_answers_do_not_move_precision() {
        let mut fx = Fixture::new(ModelConfig {
            oracle: OracleMode::ActiveLearning { ratio: 1.0 },
            ..without_sliding()
        });
        let mut bucket = fx.bucket();
        fx.seed(&mut bucket, 5);

        let queries = bucket.suggest(4, &[], &mut fx.env()).unwrap();
        assert_eq!(queries.len(), 4);
        assert!(queries.iter().all(|e| e.is_query));
        assert_eq!(bucket.pending_queries().len(), 4);

        let items: Vec<ItemId> = queries.iter().map(|e| e.item).collect();
        fx.seen.update(items.iter().copied()).unwrap();
        bucket
            .user_feedback(&items[..2], &[], &items[2..], &mut fx.env())
            .unwrap();

        assert!((bucket.precision() - 1.0).abs() < f64::EPSILON);
        assert!(bucket.pending_queries().is_empty());
        assert!(bucket.contains(items[0]) && bucket.contains(items[1]));
        assert!(bucket.negatives().contains(&items[2]));
        assert!(bucket.negatives().contains(&items[3]));
    }

    #[test]
    fn fast_forward_stages_rejects_and_commits() {
        let mut fx = Fixture::new(without_sliding());
        let mut bucket = fx.bucket();
        fx.seed(&mut bucket, 5);

        bucket.fast_forward(6, &mut fx.env()).unwrap();
        let staged = bucket.staged();
        assert_eq!(staged.len(), 6);
        let listing = bucket.listing(SortOrder::FastForward).unwrap();
        assert_eq!(listing.iter().filter(|e| e.is_fast_forward).count(), 6);
        assert!(listing[..6].iter().all(|e| e.is_fast_forward));

        bucket.remove_items(&staged[..1], &mut fx.env()).unwrap();
        assert_eq!(bucket.rejected(), &staged[..1]);
        assert_eq!(bucket.staged().len(), 5);

        bucket.ff_commit(&mut fx.env()).unwrap();
        assert!(bucket.staged().is_empty());
        assert!(bucket.rejected().is_empty());
        assert_eq!(bucket.len(), 10);
        assert!(bucket.negatives().contains(&staged[0]));
        assert!(staged.iter().all(|&item| fx.seen.is_seen(item)));
    }

    #[test]
    fn removing_foreign_items_fails_without_changes() {
        let mut fx = Fixture::new(ModelConfig::default());
        let mut bucket = fx.bucket();
        let items = fx.seed(&mut bucket, 3);

        let err = bucket
            .remove_items(&[items[0], 199], &mut fx.env())
            .unwrap_err();
        assert!(matches!(err, SieveError::ItemNotInBucket { item: 199, .. }));
        assert_eq!(bucket.members(), items);

        bucket.remove_items(&items, &mut fx.env()).unwrap();
        assert!(!bucket.is_trained());
    }

    #[test]
    fn discard_candidates_are_the_least_relevant() {
        let mut fx = Fixture::new(without_sliding());
        let mut bucket = fx.bucket();
        fx.seed(&mut bucket, 5);

        let env = fx.env();
        let candidates = bucket.discard_candidates(8, &[], &env).unwrap();
        drop(env);
        assert_eq!(candidates.len(), 8);
        assert!(
            candidates
                .iter()
                .all(|&item| fx.corpus.label_of(item).unwrap() != 0)
        );
    }

    #[test]
    fn names_are_bounded_in_characters() {
        let fx = Fixture::new(ModelConfig::default());
        let mut bucket = fx.bucket();
        bucket.rename("Katzen und Hunde", 16).unwrap();
        assert!(matches!(
            bucket.rename("much too long a name", 16),
            Err(SieveError::NameTooLong { len: 20, max: 16 })
        ));
        assert_eq!(bucket.name(), "Katzen und Hunde");
    }

    #[test]
    fn archetypes_prefer_confident_members() {
        let mut fx = Fixture::new(ModelConfig::default());
        let mut bucket = fx.bucket();
        let items = fx.seed(&mut bucket, 2);
        assert_eq!(bucket.archetypes(3), items);

        fx.seed(&mut bucket, 6);
        let archetypes = bucket.archetypes(3);
        assert_eq!(archetypes.len(), 3);
        let best = bucket
            .members()
            .into_iter()
            .zip(bucket.confidences())
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(item, _)| item)
            .unwrap();
        assert_eq!(archetypes[0], best);
    }
}
