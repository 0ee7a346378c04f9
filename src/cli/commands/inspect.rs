//! sieve inspect - Print the shape of a dataset directory

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::dataset::DatasetContext;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Dataset directory
    pub dataset: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexShape {
    pub n_subspaces: usize,
    pub has_knn: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetShape {
    pub path: String,
    pub items: usize,
    pub dim: usize,
    pub index: Option<IndexShape>,
    pub sample_urls: Vec<String>,
}

impl DatasetShape {
    #[must_use]
    pub fn of(path: String, dataset: &DatasetContext) -> Self {
        let sample = dataset.size().min(3);
        Self {
            path,
            items: dataset.size(),
            dim: dataset.features().dim(),
            index: dataset.index().map(|index| IndexShape {
                n_subspaces: index.n_subspaces(),
                has_knn: index.has_knn(),
            }),
            sample_urls: (0..sample)
                .filter_map(|i| u32::try_from(i).ok())
                .map(|item| dataset.url(item))
                .collect(),
        }
    }
}

pub fn run(ctx: &AppContext, args: &InspectArgs) -> Result<()> {
    let dataset = ctx.load_dataset(&args.dataset)?;
    let shape = DatasetShape::of(args.dataset.display().to_string(), &dataset);

    if ctx.robot() {
        return emit_robot(&robot_ok(shape));
    }

    let mut layout = HumanLayout::new();
    layout
        .title("Dataset")
        .kv("path", &shape.path)
        .kv("items", &shape.items.to_string())
        .kv("dimension", &shape.dim.to_string());
    match &shape.index {
        Some(index) => {
            layout
                .kv("index subspaces", &index.n_subspaces.to_string())
                .kv("k-NN table", if index.has_knn { "yes" } else { "no" });
        }
        None => {
            layout.kv("index", "none (uniform exploration)");
        }
    }
    if !shape.sample_urls.is_empty() {
        layout.blank().section("Sample items");
        for url in &shape.sample_urls {
            layout.bullet(url);
        }
    }
    emit_human(layout);
    Ok(())
}
