use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::config::{Config, SvmConfig};
use crate::dataset::{DatasetContext, SyntheticCorpus, SyntheticSpec};
use crate::engine::{ItemId, Orchestrator};
use crate::error::Result;
use crate::session::AnalyticSession;

/// A well separated clustered corpus and its shared context.
pub struct CorpusFixture {
    pub corpus: SyntheticCorpus,
    pub dataset: Arc<DatasetContext>,
}

impl CorpusFixture {
    /// `n_items` items in five tight, far apart clusters.
    pub fn clustered(n_items: usize) -> Result<Self> {
        Self::from_spec(&SyntheticSpec {
            n_items,
            separation: 10.0,
            spread: 0.5,
            ..SyntheticSpec::default()
        })
    }

    pub fn from_spec(spec: &SyntheticSpec) -> Result<Self> {
        let corpus = SyntheticCorpus::generate(spec);
        let dataset = Arc::new(corpus.context(&SvmConfig::default())?);
        Ok(Self { corpus, dataset })
    }

    /// Default config with a fixed session seed.
    #[must_use]
    pub fn config(seed: u64) -> Config {
        let mut config = Config::default();
        config.session.seed = Some(seed);
        config
    }

    pub fn orchestrator(&self, config: &Config) -> Result<Orchestrator> {
        Orchestrator::new(Arc::clone(&self.dataset), config)
    }

    pub fn session(&self, config: &Config) -> Result<AnalyticSession> {
        AnalyticSession::new(Arc::clone(&self.dataset), config)
    }

    #[must_use]
    pub fn cluster(&self, label: usize) -> Vec<ItemId> {
        self.corpus.members_of(label)
    }
}

/// A corpus written out as a dataset directory in a temp dir.
pub struct DatasetDirFixture {
    pub temp_dir: TempDir,
    pub corpus: SyntheticCorpus,
}

impl DatasetDirFixture {
    pub fn new(spec: &SyntheticSpec) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let corpus = SyntheticCorpus::generate(spec);
        corpus.write_to(temp_dir.path())?;
        Ok(Self { temp_dir, corpus })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes an extra file next to the artifacts.
    pub fn write(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }
}
