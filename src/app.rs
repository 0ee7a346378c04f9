use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::OutputMode;
use crate::config::Config;
use crate::dataset::DatasetContext;
use crate::error::{Result, SieveError};

pub struct AppContext {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub config: Config,
    pub output_mode: OutputMode,
    pub verbosity: u8,
}

impl AppContext {
    pub fn from_cli(cli: &crate::cli::Cli) -> Result<Self> {
        let root = Self::find_root()?;
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| default_config_path(&root));
        let config = Config::load(cli.config.as_deref(), &root)?;
        tracing::debug!(root = %root.display(), config = %config_path.display(), "context ready");

        Ok(Self {
            root,
            config_path,
            config,
            output_mode: cli.output_mode(),
            verbosity: cli.verbose,
        })
    }

    #[must_use]
    pub const fn robot(&self) -> bool {
        matches!(self.output_mode, OutputMode::Robot)
    }

    /// Loads a dataset directory with the configured classifier settings.
    pub fn load_dataset(&self, dir: &Path) -> Result<Arc<DatasetContext>> {
        Ok(Arc::new(DatasetContext::load(dir, &self.config.model.svm)?))
    }

    fn find_root() -> Result<PathBuf> {
        if let Ok(root) = std::env::var("SIEVE_ROOT") {
            return Ok(PathBuf::from(root));
        }
        let cwd = std::env::current_dir()?;
        if let Some(found) = find_upwards(&cwd, ".sieve") {
            return Ok(found);
        }

        let data_dir = dirs::data_dir()
            .ok_or_else(|| SieveError::MissingConfig("data directory not found".to_string()))?;
        Ok(data_dir.join("sieve"))
    }
}

fn default_config_path(root: &Path) -> PathBuf {
    if root.ends_with(".sieve") {
        root.join("config.toml")
    } else {
        dirs::config_dir()
            .unwrap_or_else(|| root.to_path_buf())
            .join("sieve/config.toml")
    }
}

fn find_upwards(start: &Path, name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_dir())
}
