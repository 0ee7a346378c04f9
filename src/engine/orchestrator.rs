//! The per-session model: buckets, discard pile, seen set and the
//! round-to-round bookkeeping that classifies feedback.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::config::{Config, LimitsConfig, ModelConfig};
use crate::dataset::DatasetContext;
use crate::engine::bucket::{Bucket, Env};
use crate::engine::discard::{DISCARD_PILE_NAME, DiscardPile};
use crate::engine::explorer::RandomExplorer;
use crate::engine::listing::{ItemEntry, SortOrder, TransferMode};
use crate::engine::palette::{BucketPalette, DISCARD_COLOR};
use crate::engine::seen::SeenSet;
use crate::engine::{BucketId, ItemId, RequestTarget, Target};
use crate::error::{Result, SieveError};

const FIRST_BUCKET_ID: BucketId = 1;

/// Splits `n` into `t` near-equal parts, the first `n % t` parts one larger.
#[must_use]
pub fn split_evenly(n: usize, t: usize) -> Vec<usize> {
    if t == 0 {
        return Vec::new();
    }
    (0..t).map(|i| n / t + usize::from(i < n % t)).collect()
}

/// How one judged item feeds back into the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub discard: bool,
    pub good: Option<BucketId>,
    pub neutral: Option<BucketId>,
    pub bad: Option<BucketId>,
}

/// Classifies an assignment against what was suggested for the item last
/// round.
#[must_use]
pub fn classify(assigned: Target, suggested: Option<BucketId>) -> Verdict {
    let none = Verdict {
        discard: false,
        good: None,
        neutral: None,
        bad: None,
    };
    match (assigned, suggested) {
        (Target::Discard, suggested) => Verdict {
            discard: true,
            bad: suggested,
            ..none
        },
        (Target::Bucket(c), None) => Verdict {
            neutral: Some(c),
            ..none
        },
        (Target::Bucket(c), Some(b)) if b == c => Verdict {
            good: Some(c),
            ..none
        },
        (Target::Bucket(c), Some(b)) => Verdict {
            neutral: Some(c),
            bad: Some(b),
            ..none
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSummary {
    pub bucket_id: BucketId,
    pub bucket_name: String,
    pub is_now_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketDetail {
    pub id: Target,
    pub name: String,
    pub ordering: usize,
    pub banner_ordering: Option<usize>,
    pub n_items: usize,
    pub color: String,
    pub active: bool,
    pub trained: bool,
    /// `None` for the discard pile.
    pub precision: Option<f64>,
    pub archetypes: Vec<ItemId>,
    /// Display strings of `archetypes`; filled in by the session layer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub archetype_urls: Vec<String>,
}

/// Everything the bucket banner needs, in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub buckets: Vec<BucketDetail>,
    pub bucket_ordering: Vec<Target>,
    pub banner_ordering: Vec<Target>,
    pub n_active_and_trained: usize,
}

#[derive(Debug, Default)]
struct Bins {
    good: Vec<ItemId>,
    neutral: Vec<ItemId>,
    bad: Vec<ItemId>,
}

/// State every bucket reads; kept apart from the bucket map so a bucket and
/// its environment can be borrowed at the same time.
#[derive(Debug)]
struct Shared {
    seen: SeenSet,
    discard: DiscardPile,
    /// Serves exploration requests; its cache survives until refreshed.
    explorer: RandomExplorer,
    /// Serves bucket channels, untrained substitutes and top-ups.
    fill: RandomExplorer,
    palette: BucketPalette,
    rng: StdRng,
}

impl Shared {
    fn env<'a>(&'a mut self, dataset: &'a DatasetContext, config: &'a ModelConfig) -> Env<'a> {
        Env {
            dataset,
            config,
            seen: &mut self.seen,
            discard: &self.discard,
            explorer: &mut self.fill,
            rng: &mut self.rng,
        }
    }
}

#[derive(Debug)]
pub struct Orchestrator {
    dataset: Arc<DatasetContext>,
    model: ModelConfig,
    limits: LimitsConfig,
    buckets: BTreeMap<BucketId, Bucket>,
    next_id: BucketId,
    shared: Shared,
    /// Last round's suggestions: item to the bucket it was suggested for.
    outstanding: HashMap<ItemId, Option<BucketId>>,
}

impl Orchestrator {
    /// A fresh model with one empty bucket. The config is validated first.
    pub fn new(dataset: Arc<DatasetContext>, config: &Config) -> Result<Self> {
        config.validate()?;
        let rng = config
            .session
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        let size = dataset.size();
        let mut orchestrator = Self {
            dataset,
            model: config.model.clone(),
            limits: config.limits.clone(),
            buckets: BTreeMap::new(),
            next_id: FIRST_BUCKET_ID,
            shared: Shared {
                seen: SeenSet::new(size),
                discard: DiscardPile::new(),
                explorer: RandomExplorer::new(config.explorer.oversample_factor),
                fill: RandomExplorer::new(config.explorer.oversample_factor),
                palette: BucketPalette::new(),
                rng,
            },
            outstanding: HashMap::new(),
        };
        orchestrator.create_bucket()?;
        Ok(orchestrator)
    }

    #[must_use]
    pub fn dataset(&self) -> &DatasetContext {
        &self.dataset
    }

    #[must_use]
    pub const fn model_config(&self) -> &ModelConfig {
        &self.model
    }

    #[must_use]
    pub const fn seen(&self) -> &SeenSet {
        &self.shared.seen
    }

    #[must_use]
    pub const fn discard_pile(&self) -> &DiscardPile {
        &self.shared.discard
    }

    #[must_use]
    pub fn bucket(&self, id: BucketId) -> Option<&Bucket> {
        self.buckets.get(&id)
    }

    pub fn buckets(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.values()
    }

    #[must_use]
    pub fn outstanding(&self) -> &HashMap<ItemId, Option<BucketId>> {
        &self.outstanding
    }

    /// The session RNG, shared with callers that make routing choices.
    pub const fn rng(&mut self) -> &mut StdRng {
        &mut self.shared.rng
    }

    fn lookup(&self, id: BucketId) -> Result<&Bucket> {
        self.buckets
            .get(&id)
            .ok_or(SieveError::UnknownBucket(i64::from(id)))
    }

    fn check_target(&self, target: Target) -> Result<()> {
        match target {
            Target::Discard => Ok(()),
            Target::Bucket(id) => self.lookup(id).map(|_| ()),
        }
    }

    fn n_active(&self) -> usize {
        self.buckets.values().filter(|b| b.is_active()).count()
    }

    /// Bucket ids sorted by display order.
    fn display_order(&self) -> Vec<BucketId> {
        let mut ids: Vec<(usize, BucketId)> = self
            .buckets
            .values()
            .map(|b| (b.ordering(), b.id()))
            .collect();
        ids.sort_unstable();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Active buckets with a model, in display order.
    #[must_use]
    pub fn active_and_trained_buckets(&self) -> Vec<BucketId> {
        self.display_order()
            .into_iter()
            .filter(|id| {
                self.buckets
                    .get(id)
                    .is_some_and(|b| b.is_active() && b.is_trained())
            })
            .collect()
    }

    fn trained_buckets(&self) -> Vec<BucketId> {
        self.display_order()
            .into_iter()
            .filter(|id| self.buckets.get(id).is_some_and(Bucket::is_trained))
            .collect()
    }

    pub fn create_bucket(&mut self) -> Result<BucketSummary> {
        if self.buckets.len() >= self.limits.max_buckets {
            return Err(SieveError::TooManyBuckets(self.limits.max_buckets));
        }
        let active = self.n_active() < self.limits.max_active_buckets;
        let id = self.next_id;
        let name = format!("Bucket {id}");
        let color = self.shared.palette.assign(&mut self.shared.rng);
        let bucket = Bucket::new(
            id,
            name.clone(),
            self.buckets.len(),
            active,
            color,
            &self.model,
        );
        self.buckets.insert(id, bucket);
        self.next_id += 1;

        tracing::info!(bucket = id, active, "bucket created");
        Ok(BucketSummary {
            bucket_id: id,
            bucket_name: name,
            is_now_active: active,
        })
    }

    pub fn delete_bucket(&mut self, id: BucketId) -> Result<BucketSummary> {
        if self.buckets.len() == 1 {
            return Err(SieveError::CannotDeleteLastBucket);
        }
        self.lookup(id)?;
        let Some(bucket) = self.buckets.remove(&id) else {
            return Err(SieveError::UnknownBucket(i64::from(id)));
        };

        self.shared.palette.relinquish(bucket.color());
        for other in self.buckets.values_mut() {
            if other.ordering() > bucket.ordering() {
                other.set_ordering(other.ordering() - 1);
            }
        }
        // items suggested for the deleted bucket count as unsuggested
        for suggested in self.outstanding.values_mut() {
            if *suggested == Some(id) {
                *suggested = None;
            }
        }

        tracing::info!(bucket = id, "bucket deleted");
        Ok(BucketSummary {
            bucket_id: id,
            bucket_name: bucket.name().to_string(),
            is_now_active: false,
        })
    }

    pub fn rename_bucket(&mut self, id: BucketId, name: &str) -> Result<BucketSummary> {
        let max = self.limits.max_name_length;
        let bucket = self
            .buckets
            .get_mut(&id)
            .ok_or(SieveError::UnknownBucket(i64::from(id)))?;
        bucket.rename(name, max)?;
        Ok(BucketSummary {
            bucket_id: id,
            bucket_name: bucket.name().to_string(),
            is_now_active: bucket.is_active(),
        })
    }

    /// Exchanges the display order of two buckets.
    pub fn swap_buckets(&mut self, first: BucketId, second: BucketId) -> Result<()> {
        let a = self.lookup(first)?.ordering();
        let b = self.lookup(second)?.ordering();
        if let Some(bucket) = self.buckets.get_mut(&first) {
            bucket.set_ordering(b);
        }
        if let Some(bucket) = self.buckets.get_mut(&second) {
            bucket.set_ordering(a);
        }
        Ok(())
    }

    pub fn toggle_bucket(&mut self, id: BucketId) -> Result<BucketSummary> {
        let activating = !self.lookup(id)?.is_active();
        if activating && self.n_active() >= self.limits.max_active_buckets {
            return Err(SieveError::ActiveBucketLimitExceeded(
                self.limits.max_active_buckets,
            ));
        }
        let bucket = self
            .buckets
            .get_mut(&id)
            .ok_or(SieveError::UnknownBucket(i64::from(id)))?;
        bucket.set_active(activating);
        tracing::debug!(bucket = id, active = activating, "bucket toggled");
        Ok(BucketSummary {
            bucket_id: id,
            bucket_name: bucket.name().to_string(),
            is_now_active: activating,
        })
    }

    /// Applies one round of judgments. Items mapped to `None` are not judged
    /// yet and are ignored.
    ///
    /// Judged items end up seen. When that exhausts the corpus the feedback
    /// is still applied and `DatasetExhausted` is returned.
    pub fn user_feedback(&mut self, feedback: &BTreeMap<ItemId, Option<Target>>) -> Result<()> {
        let judged: Vec<(ItemId, Target)> = feedback
            .iter()
            .filter_map(|(&item, target)| target.map(|t| (item, t)))
            .collect();
        for &(item, target) in &judged {
            self.dataset.check_item(item)?;
            self.check_target(target)?;
        }

        let mut bins: BTreeMap<BucketId, Bins> = BTreeMap::new();
        let mut discarded = Vec::new();
        for &(item, assigned) in &judged {
            let suggested = self.outstanding.get(&item).copied().flatten();
            let verdict = classify(assigned, suggested);
            if verdict.discard {
                discarded.push(item);
            }
            if let Some(id) = verdict.good {
                bins.entry(id).or_default().good.push(item);
            }
            if let Some(id) = verdict.neutral {
                bins.entry(id).or_default().neutral.push(item);
            }
            if let Some(id) = verdict.bad {
                bins.entry(id).or_default().bad.push(item);
            }
        }
        if let Some(stale) = bins.keys().find(|id| !self.buckets.contains_key(id)) {
            return Err(SieveError::invariant(format!(
                "feedback routed to bucket {stale}, which does not exist"
            )));
        }

        tracing::debug!(
            judged = judged.len(),
            discarded = discarded.len(),
            buckets = bins.len(),
            "classified feedback"
        );

        for (id, bin) in &bins {
            if let Some(bucket) = self.buckets.get_mut(id) {
                let mut env = self.shared.env(&self.dataset, &self.model);
                bucket.user_feedback(&bin.good, &bin.neutral, &bin.bad, &mut env)?;
            }
        }
        self.shared.discard.discard(&discarded);
        self.shared
            .seen
            .update(judged.into_iter().map(|(item, _)| item))
    }

    /// Suggestions for a request of `(target, count)` pairs.
    ///
    /// Bucket lists come in display order, exploration items last. Nothing
    /// is suggested twice within one round.
    pub fn suggest(
        &mut self,
        request: &[(RequestTarget, usize)],
        refresh: bool,
    ) -> Result<Vec<ItemEntry>> {
        let mut wanted: Vec<(usize, BucketId, usize)> = Vec::new();
        let mut n_exploration = 0;
        for &(target, n) in request {
            match target {
                RequestTarget::Exploration => n_exploration += n,
                RequestTarget::Bucket(id) => {
                    let ordering = self.lookup(id)?.ordering();
                    wanted.push((ordering, id, n));
                }
            }
        }
        let total = n_exploration + wanted.iter().map(|w| w.2).sum::<usize>();
        if total > 0 && self.shared.seen.is_exhausted() {
            return Err(SieveError::DatasetExhausted);
        }
        wanted.sort_by_key(|w| w.0);

        let exploration: Vec<ItemId> = if n_exploration > 0 {
            self.shared.explorer.suggest(
                n_exploration,
                refresh,
                &[],
                &self.shared.seen,
                &self.dataset,
                &mut self.shared.rng,
            )
        } else {
            Vec::new()
        };

        let mut chosen: Vec<ItemId> = exploration.clone();
        let mut suggestions: Vec<ItemEntry> = Vec::with_capacity(total);
        for (_, id, n) in wanted {
            if n == 0 {
                continue;
            }
            let Some(bucket) = self.buckets.get_mut(&id) else {
                continue;
            };
            let mut env = self.shared.env(&self.dataset, &self.model);
            let mut entries = if bucket.is_trained() {
                bucket.suggest(n, &chosen, &mut env)?
            } else {
                Vec::new()
            };
            if entries.len() < n {
                chosen.extend(entries.iter().map(|e| e.item));
                let topup = env.explorer.suggest(
                    n - entries.len(),
                    true,
                    &chosen,
                    env.seen,
                    env.dataset,
                    env.rng,
                );
                entries.extend(topup.into_iter().map(ItemEntry::exploration));
            }
            tracing::trace!(bucket = id, requested = n, produced = entries.len(), "bucket suggestions");
            chosen.extend(entries.iter().map(|e| e.item));
            suggestions.extend(entries);
        }
        suggestions.extend(exploration.into_iter().map(ItemEntry::exploration));

        self.outstanding = suggestions
            .iter()
            .map(|entry| {
                let bucket = match entry.bucket {
                    Some(Target::Bucket(id)) => Some(id),
                    _ => None,
                };
                (entry.item, bucket)
            })
            .collect();

        tracing::debug!(
            requested = total,
            produced = suggestions.len(),
            exploration = n_exploration,
            "suggestion round"
        );
        Ok(suggestions)
    }

    pub fn fast_forward(&mut self, target: Target, n: i64) -> Result<()> {
        let n = usize::try_from(n)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| SieveError::InvalidFastForwardCount(n.to_string()))?;
        match target {
            Target::Discard => self.fast_forward_discard(n),
            Target::Bucket(id) => {
                self.lookup(id)?;
                let Some(bucket) = self.buckets.get_mut(&id) else {
                    return Err(SieveError::UnknownBucket(i64::from(id)));
                };
                let mut env = self.shared.env(&self.dataset, &self.model);
                bucket.fast_forward(n, &mut env)
            }
        }
    }

    /// Stages the strongest rejects of every trained bucket on the pile.
    fn fast_forward_discard(&mut self, n: usize) -> Result<()> {
        let trained = self.trained_buckets();
        if trained.is_empty() {
            return Err(SieveError::NoTrainedBuckets);
        }

        let mut staged: Vec<ItemId> = Vec::with_capacity(n);
        for (id, count) in trained.iter().zip(split_evenly(n, trained.len())) {
            let Some(bucket) = self.buckets.get(id) else {
                continue;
            };
            let env = self.shared.env(&self.dataset, &self.model);
            let candidates = bucket.discard_candidates(count, &staged, &env)?;
            staged.extend(candidates);
        }
        tracing::debug!(staged = staged.len(), buckets = trained.len(), "discard pile fast-forwarded");
        self.shared.discard.fast_forward(staged);
        Ok(())
    }

    pub fn ff_commit(&mut self, target: Target) -> Result<()> {
        match target {
            Target::Discard => self.shared.discard.ff_commit(&mut self.shared.seen),
            Target::Bucket(id) => {
                self.lookup(id)?;
                let Some(bucket) = self.buckets.get_mut(&id) else {
                    return Err(SieveError::UnknownBucket(i64::from(id)));
                };
                let mut env = self.shared.env(&self.dataset, &self.model);
                bucket.ff_commit(&mut env)
            }
        }
    }

    /// Moves or copies items between buckets and the discard pile.
    pub fn transfer_images(
        &mut self,
        items: &[ItemId],
        src: Target,
        dst: Target,
        mode: TransferMode,
    ) -> Result<()> {
        if mode == TransferMode::Copy && (src == Target::Discard || dst == Target::Discard) {
            return Err(SieveError::InvalidCopyTarget);
        }
        self.check_target(src)?;
        self.check_target(dst)?;
        for &item in items {
            self.dataset.check_item(item)?;
        }

        let mut seen_update = Ok(());
        if mode == TransferMode::Move {
            match src {
                Target::Discard => {
                    if let Some(&missing) = items
                        .iter()
                        .find(|&&item| !self.shared.discard.contains(item))
                    {
                        return Err(SieveError::ItemNotInPile(missing));
                    }
                    seen_update = self
                        .shared
                        .discard
                        .restore(items, &mut self.shared.seen);
                }
                Target::Bucket(id) => {
                    self.lookup(id)?.check_removable(items)?;
                    if let Some(bucket) = self.buckets.get_mut(&id) {
                        let mut env = self.shared.env(&self.dataset, &self.model);
                        bucket.remove_items(items, &mut env)?;
                    }
                }
            }
        }

        match dst {
            Target::Discard => self.shared.discard.discard(items),
            Target::Bucket(id) => {
                if let Some(bucket) = self.buckets.get_mut(&id) {
                    let mut env = self.shared.env(&self.dataset, &self.model);
                    bucket.assign(items, &mut env)?;
                }
            }
        }
        tracing::debug!(n = items.len(), ?src, ?dst, ?mode, "items transferred");
        seen_update
    }

    #[must_use]
    pub fn bucket_info(&self) -> BucketInfo {
        let order = self.display_order();
        let mut buckets = Vec::with_capacity(order.len() + 1);
        let mut banner_ordering = Vec::new();
        let mut n_active_and_trained = 0;

        for id in &order {
            let Some(bucket) = self.buckets.get(id) else {
                continue;
            };
            let banner = bucket.is_active().then(|| {
                banner_ordering.push(Target::Bucket(*id));
                banner_ordering.len() - 1
            });
            if bucket.is_active() && bucket.is_trained() {
                n_active_and_trained += 1;
            }
            buckets.push(BucketDetail {
                id: Target::Bucket(*id),
                name: bucket.name().to_string(),
                ordering: bucket.ordering(),
                banner_ordering: banner,
                n_items: bucket.len(),
                color: bucket.color().to_string(),
                active: bucket.is_active(),
                trained: bucket.is_trained(),
                precision: Some(bucket.precision()),
                archetypes: bucket.archetypes(self.model.n_archetypes),
                archetype_urls: Vec::new(),
            });
        }

        buckets.push(BucketDetail {
            id: Target::Discard,
            name: DISCARD_PILE_NAME.to_string(),
            ordering: order.len(),
            banner_ordering: Some(banner_ordering.len()),
            n_items: self.shared.discard.len(),
            color: DISCARD_COLOR.to_string(),
            active: true,
            trained: false,
            precision: None,
            archetypes: Vec::new(),
            archetype_urls: Vec::new(),
        });
        banner_ordering.push(Target::Discard);

        let mut bucket_ordering: Vec<Target> = order.into_iter().map(Target::Bucket).collect();
        bucket_ordering.push(Target::Discard);

        BucketInfo {
            buckets,
            bucket_ordering,
            banner_ordering,
            n_active_and_trained,
        }
    }

    pub fn bucket_view_data(&self, target: Target, sort: SortOrder) -> Result<Vec<ItemEntry>> {
        match target {
            Target::Discard => self.shared.discard.listing(sort),
            Target::Bucket(id) => self.lookup(id)?.listing(sort),
        }
    }

    pub fn bucket_name(&self, target: Target) -> Result<String> {
        match target {
            Target::Discard => Ok(DISCARD_PILE_NAME.to_string()),
            Target::Bucket(id) => Ok(self.lookup(id)?.name().to_string()),
        }
    }

    /// Every item currently placed somewhere, for consistency checks.
    #[must_use]
    pub fn placed_items(&self) -> HashSet<ItemId> {
        self.buckets
            .values()
            .flat_map(Bucket::members)
            .chain(self.shared.discard.items().iter().copied())
            .collect()
    }
}
