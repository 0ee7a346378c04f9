//! Read-only corpus context shared by every session.
//!
//! A dataset directory holds `features.json`, and optionally `index.json`
//! and `urls.json`. The context is built once at startup and handed to
//! sessions behind an `Arc`; nothing in it is mutated afterwards.

pub mod features;
pub mod index;
pub mod synthetic;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::SvmConfig;
use crate::engine::ItemId;
use crate::engine::classifier::{LinearSvm, Trainer};
use crate::error::{Result, SieveError};

pub use features::{DenseFeatures, FeatureMatrix, FeatureProvider, FeaturesArtifact};
pub use index::{DistanceIndex, DistanceMatrix, IndexArtifact};
pub use synthetic::{SyntheticCorpus, SyntheticSpec};

pub const FEATURES_FILE: &str = "features.json";
pub const INDEX_FILE: &str = "index.json";
pub const URLS_FILE: &str = "urls.json";
/// Ground-truth cluster per item; only the simulator reads it.
pub const LABELS_FILE: &str = "labels.json";

/// `urls.json` holds either one string per item or a template with `{}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlsArtifact {
    List(Vec<String>),
    Template(String),
}

/// Maps item ids to display strings.
#[derive(Debug, Clone, Default)]
pub enum UrlResolver {
    #[default]
    Identity,
    List(Vec<String>),
    Template(String),
}

impl UrlResolver {
    #[must_use]
    pub fn url(&self, item: ItemId) -> String {
        match self {
            Self::Identity => item.to_string(),
            Self::List(urls) => urls
                .get(item as usize)
                .cloned()
                .unwrap_or_else(|| item.to_string()),
            Self::Template(template) => template.replace("{}", &item.to_string()),
        }
    }
}

impl From<UrlsArtifact> for UrlResolver {
    fn from(artifact: UrlsArtifact) -> Self {
        match artifact {
            UrlsArtifact::List(urls) => Self::List(urls),
            UrlsArtifact::Template(template) => Self::Template(template),
        }
    }
}

#[derive(Debug)]
pub struct DatasetContext {
    features: Box<dyn FeatureProvider>,
    index: Option<DistanceIndex>,
    urls: UrlResolver,
    trainer: Arc<dyn Trainer>,
}

impl DatasetContext {
    pub fn new(
        features: Box<dyn FeatureProvider>,
        index: Option<DistanceIndex>,
        urls: UrlResolver,
        trainer: Arc<dyn Trainer>,
    ) -> Result<Self> {
        if let Some(index) = &index {
            if index.len() != features.size() {
                return Err(SieveError::Dataset(format!(
                    "index covers {} items but the corpus has {}",
                    index.len(),
                    features.size()
                )));
            }
        }
        if let UrlResolver::List(urls) = &urls {
            if urls.len() != features.size() {
                return Err(SieveError::Dataset(format!(
                    "{} display urls for {} items",
                    urls.len(),
                    features.size()
                )));
            }
        }
        Ok(Self {
            features,
            index,
            urls,
            trainer,
        })
    }

    /// Loads a dataset directory with the default linear SVM trainer.
    pub fn load(dir: &Path, svm: &SvmConfig) -> Result<Self> {
        let features_path = dir.join(FEATURES_FILE);
        if !features_path.exists() {
            return Err(SieveError::Dataset(format!(
                "{} not found",
                features_path.display()
            )));
        }
        let features = DenseFeatures::from_artifact(read_json(&features_path)?)?;

        let index_path = dir.join(INDEX_FILE);
        let index = if index_path.exists() {
            Some(DistanceIndex::from_artifact(read_json(&index_path)?)?)
        } else {
            tracing::warn!(dir = %dir.display(), "no distance index, exploration falls back to uniform sampling");
            None
        };

        let urls_path = dir.join(URLS_FILE);
        let urls = if urls_path.exists() {
            UrlResolver::from(read_json::<UrlsArtifact>(&urls_path)?)
        } else {
            UrlResolver::Identity
        };

        let context = Self::new(
            Box::new(features),
            index,
            urls,
            Arc::new(LinearSvm::new(svm)),
        )?;
        tracing::info!(
            dir = %dir.display(),
            items = context.size(),
            dim = context.features().dim(),
            index = context.index_available(),
            "dataset loaded"
        );
        Ok(context)
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.features.size()
    }

    #[must_use]
    pub fn features(&self) -> &dyn FeatureProvider {
        self.features.as_ref()
    }

    #[must_use]
    pub const fn index(&self) -> Option<&DistanceIndex> {
        self.index.as_ref()
    }

    #[must_use]
    pub const fn index_available(&self) -> bool {
        self.index.is_some()
    }

    #[must_use]
    pub fn trainer(&self) -> &dyn Trainer {
        self.trainer.as_ref()
    }

    #[must_use]
    pub fn url(&self, item: ItemId) -> String {
        self.urls.url(item)
    }

    pub fn check_item(&self, item: ItemId) -> Result<()> {
        if item as usize >= self.size() {
            return Err(SieveError::ItemOutOfRange {
                item,
                size: self.size(),
            });
        }
        Ok(())
    }
}

/// Reads the ground-truth labels of a dataset directory.
pub fn load_labels(dir: &Path, size: usize) -> Result<Vec<usize>> {
    let path = dir.join(LABELS_FILE);
    if !path.exists() {
        return Err(SieveError::Dataset(format!(
            "{} not found, simulation needs ground-truth labels",
            path.display()
        )));
    }
    let labels: Vec<usize> = read_json(&path)?;
    if labels.len() != size {
        return Err(SieveError::Dataset(format!(
            "{} labels for {size} items",
            labels.len()
        )));
    }
    Ok(labels)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .map_err(|err| SieveError::Dataset(format!("read {}: {err}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|err| SieveError::Dataset(format!("parse {}: {err}", path.display())))
}
