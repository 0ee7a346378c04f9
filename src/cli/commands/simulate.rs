//! sieve simulate - Scripted relevance feedback over a labelled corpus
//!
//! Bucket `k` stands for ground-truth cluster `k - 1`. Every round the
//! scripted user files each shown item into its cluster's bucket, or onto
//! the discard pile when its cluster has no bucket.

use std::collections::BTreeMap;
use std::time::Instant;

use clap::Args;
use serde::Serialize;

use crate::app::AppContext;
use crate::cli::commands::CorpusArgs;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::engine::{BucketId, ItemId, Target};
use crate::error::{Result, SieveError};
use crate::session::AnalyticSession;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    /// Interaction rounds to run
    #[arg(long, short = 'r', default_value = "20")]
    pub rounds: usize,

    /// Buckets the scripted user fills, one per cluster
    #[arg(long, short = 'b', default_value = "3")]
    pub buckets: usize,

    /// Session seed (overrides session.seed from config)
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketReport {
    pub bucket_id: BucketId,
    pub cluster: usize,
    pub members: usize,
    /// Items the bucket's own channels suggested.
    pub suggested: usize,
    /// Of those, items that belong to the bucket's cluster.
    pub hits: usize,
    pub hit_rate: Option<f64>,
    /// The bucket's running precision estimate.
    pub precision: f64,
    pub trained: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub rounds_run: usize,
    pub corpus_size: usize,
    pub seen: usize,
    pub discarded: usize,
    pub exhausted: bool,
    pub elapsed_ms: u64,
    pub buckets: Vec<BucketReport>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    suggested: usize,
    hits: usize,
}

pub fn run(ctx: &AppContext, args: &SimulateArgs) -> Result<()> {
    let (dataset, labels) = args.corpus.load(ctx, true)?;
    let labels = labels.ok_or_else(|| SieveError::Dataset("no ground-truth labels".into()))?;

    let mut config = ctx.config.clone();
    if args.seed.is_some() {
        config.session.seed = args.seed;
    }
    let n_buckets = args.buckets.clamp(1, config.limits.max_active_buckets);
    let mut session = AnalyticSession::new(dataset, &config)?;
    let report = simulate(&mut session, &labels, n_buckets, args.rounds)?;

    let mut warnings = Vec::new();
    if n_buckets != args.buckets {
        warnings.push(format!("{} buckets requested, {n_buckets} used", args.buckets));
    }
    if report.exhausted {
        warnings.push(format!("corpus exhausted after {} rounds", report.rounds_run));
    }

    if ctx.robot() {
        let response = warnings
            .into_iter()
            .fold(robot_ok(report), |response, warning| response.with_warning(warning));
        return emit_robot(&response);
    }
    for warning in &warnings {
        tracing::warn!("{warning}");
    }
    emit_human(render(&report));
    Ok(())
}

/// Runs the scripted user for up to `rounds` rounds.
pub fn simulate(
    session: &mut AnalyticSession,
    labels: &[usize],
    n_buckets: usize,
    rounds: usize,
) -> Result<SimulationReport> {
    let started = Instant::now();
    let mut bucket_ids = vec![1];
    for cluster in 1..n_buckets {
        bucket_ids.push(session.create_bucket()?.bucket_id);
        tracing::debug!(cluster, "bucket created for cluster");
    }
    for (cluster, &id) in bucket_ids.iter().enumerate() {
        session.rename_bucket(id, &format!("cluster {cluster}"))?;
    }

    let mut tallies: BTreeMap<BucketId, Tally> = BTreeMap::new();
    let mut feedback: BTreeMap<ItemId, Option<Target>> = BTreeMap::new();
    let mut rounds_run = 0;
    let mut exhausted = false;

    for round in 0..rounds {
        let view = match session.interaction_round(&feedback, true) {
            Ok(view) => view,
            Err(SieveError::DatasetExhausted) => {
                exhausted = true;
                break;
            }
            Err(err) => return Err(err),
        };
        rounds_run += 1;

        feedback.clear();
        for entry in view.items() {
            let label = label_of(labels, entry.item)?;
            let target = bucket_ids
                .get(label)
                .map_or(Target::Discard, |&id| Target::Bucket(id));
            if let Some(Target::Bucket(id)) = entry.bucket {
                let tally = tallies.entry(id).or_default();
                tally.suggested += 1;
                tally.hits += usize::from(target == Target::Bucket(id));
            }
            feedback.insert(entry.item, Some(target));
        }
        tracing::debug!(round, shown = feedback.len(), "scripted feedback");
    }

    if !exhausted && !feedback.is_empty() {
        match session.submit_feedback(&feedback) {
            Ok(()) => {}
            Err(SieveError::DatasetExhausted) => exhausted = true,
            Err(err) => return Err(err),
        }
    }

    let orchestrator = session.orchestrator();
    let buckets = bucket_ids
        .iter()
        .enumerate()
        .filter_map(|(cluster, id)| orchestrator.bucket(*id).map(|bucket| (cluster, bucket)))
        .map(|(cluster, bucket)| {
            let tally = tallies.get(&bucket.id()).copied().unwrap_or_default();
            #[allow(clippy::cast_precision_loss)]
            let hit_rate =
                (tally.suggested > 0).then(|| tally.hits as f64 / tally.suggested as f64);
            BucketReport {
                bucket_id: bucket.id(),
                cluster,
                members: bucket.len(),
                suggested: tally.suggested,
                hits: tally.hits,
                hit_rate,
                precision: bucket.precision(),
                trained: bucket.is_trained(),
            }
        })
        .collect();

    let report = SimulationReport {
        rounds_run,
        corpus_size: orchestrator.dataset().size(),
        seen: orchestrator.seen().len(),
        discarded: orchestrator.discard_pile().len(),
        exhausted,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        buckets,
    };
    tracing::info!(
        rounds = report.rounds_run,
        seen = report.seen,
        exhausted = report.exhausted,
        "simulation finished"
    );
    Ok(report)
}

fn label_of(labels: &[usize], item: ItemId) -> Result<usize> {
    labels
        .get(item as usize)
        .copied()
        .ok_or(SieveError::ItemOutOfRange {
            item,
            size: labels.len(),
        })
}

fn render(report: &SimulationReport) -> HumanLayout {
    let mut layout = HumanLayout::new();
    layout
        .title("Simulation")
        .kv("rounds", &report.rounds_run.to_string())
        .kv(
            "seen",
            &format!("{} / {}", report.seen, report.corpus_size),
        )
        .kv("discarded", &report.discarded.to_string())
        .kv("elapsed", &format!("{} ms", report.elapsed_ms));
    if report.exhausted {
        layout.kv("stopped", "corpus exhausted");
    }
    layout.blank().section("Buckets");
    for bucket in &report.buckets {
        let hit_rate = bucket
            .hit_rate
            .map_or_else(|| "-".to_string(), |rate| format!("{:.1}%", rate * 100.0));
        layout.bullet(&format!(
            "#{} cluster {}: {} members, {}/{} suggestions on target ({hit_rate}), precision {:.2}{}",
            bucket.bucket_id,
            bucket.cluster,
            bucket.members,
            bucket.hits,
            bucket.suggested,
            bucket.precision,
            if bucket.trained { "" } else { ", untrained" },
        ));
    }
    layout
}
