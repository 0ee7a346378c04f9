//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - run() function to execute the command

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand};

pub mod inspect;
pub mod serve;
pub mod simulate;

use crate::app::AppContext;
use crate::dataset::{DatasetContext, SyntheticCorpus, SyntheticSpec};
use crate::error::Result;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve one session over JSON lines on stdin/stdout
    Serve(serve::ServeArgs),

    /// Run a scripted user against a labelled corpus
    Simulate(simulate::SimulateArgs),

    /// Print the shape of a dataset directory
    Inspect(inspect::InspectArgs),
}

/// Dispatch a command to its handler
pub fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Serve(args) => serve::run(ctx, args),
        Commands::Simulate(args) => simulate::run(ctx, args),
        Commands::Inspect(args) => inspect::run(ctx, args),
    }
}

/// Where a command gets its corpus from: a dataset directory, or a
/// generated clustered corpus when none is given.
#[derive(Args, Debug, Clone)]
pub struct CorpusArgs {
    /// Dataset directory (features.json, index.json, urls.json)
    #[arg(long, short = 'd')]
    pub dataset: Option<PathBuf>,

    /// Items in the generated corpus
    #[arg(long, default_value = "2000")]
    pub items: usize,

    /// Clusters in the generated corpus
    #[arg(long, default_value = "5")]
    pub clusters: usize,

    /// Feature dimension of the generated corpus
    #[arg(long, default_value = "16")]
    pub dim: usize,

    /// Seed of the generated corpus
    #[arg(long, default_value = "42")]
    pub corpus_seed: u64,
}

impl CorpusArgs {
    #[must_use]
    pub fn synthetic_spec(&self) -> SyntheticSpec {
        SyntheticSpec {
            n_items: self.items,
            n_clusters: self.clusters,
            dim: self.dim,
            seed: self.corpus_seed,
            ..SyntheticSpec::default()
        }
    }

    /// Loads or generates the corpus, with ground-truth labels when known.
    pub fn load(
        &self,
        ctx: &AppContext,
        with_labels: bool,
    ) -> Result<(Arc<DatasetContext>, Option<Vec<usize>>)> {
        if let Some(dir) = &self.dataset {
            let dataset = ctx.load_dataset(dir)?;
            let labels = if with_labels {
                Some(crate::dataset::load_labels(dir, dataset.size())?)
            } else {
                None
            };
            return Ok((dataset, labels));
        }

        let corpus = SyntheticCorpus::generate(&self.synthetic_spec());
        let dataset = Arc::new(corpus.context(&ctx.config.model.svm)?);
        tracing::info!(
            items = self.items,
            clusters = self.clusters,
            dim = self.dim,
            "generated synthetic corpus"
        );
        Ok((dataset, Some(corpus.labels)))
    }
}
