use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SieveError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub explorer: ExplorerConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    pub fn load(explicit_path: Option<&Path>, root: &Path) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("SIEVE_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = explicit {
            if let Some(patch) = Self::load_patch(&path)? {
                config.merge_patch(patch);
            }
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global);
            }
            if let Some(project) = Self::load_patch(&root.join("config.toml"))? {
                config.merge_patch(project);
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Parses a full or partial TOML document on top of the defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let patch: ConfigPatch =
            toml::from_str(raw).map_err(|err| SieveError::Config(format!("parse config: {err}")))?;
        let mut config = Self::default();
        config.merge_patch(patch);
        config.validate()?;
        Ok(config)
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        let Some(dir) = dirs::config_dir() else {
            return Ok(None);
        };
        Self::load_patch(&dir.join("sieve/config.toml"))
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| SieveError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| SieveError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.model {
            self.model.merge(patch);
        }
        if let Some(patch) = patch.limits {
            self.limits.merge(patch);
        }
        if let Some(patch) = patch.explorer {
            self.explorer.merge(patch);
        }
        if let Some(patch) = patch.session {
            self.session.merge(patch);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_usize("SIEVE_MODEL_N_SUGGESTION_CANDIDATES")? {
            self.model.n_suggestion_candidates = value;
        }
        if env_bool("SIEVE_MODEL_EXPLORATION_DISABLED").unwrap_or(false) {
            self.model.exploration = None;
        }
        if let Some(value) = env_usize("SIEVE_MODEL_EXPLORATION_ROUNDS")? {
            self.model
                .exploration
                .get_or_insert_with(ExplorationConfig::default)
                .n_rounds = value;
        }
        if let Some(value) = env_string("SIEVE_MODEL_EXPLORATION_METHOD") {
            self.model
                .exploration
                .get_or_insert_with(ExplorationConfig::default)
                .method = parse_neighbor_method(&value)?;
        }
        if let Some(value) = env_string("SIEVE_MODEL_ORACLE") {
            self.model.oracle = parse_oracle(&value)?;
        }
        if let Some(value) = env_f64("SIEVE_MODEL_SVM_C")? {
            self.model.svm.c = value;
        }

        if let Some(value) = env_usize("SIEVE_LIMITS_MAX_BUCKETS")? {
            self.limits.max_buckets = value;
        }
        if let Some(value) = env_usize("SIEVE_LIMITS_MAX_ACTIVE_BUCKETS")? {
            self.limits.max_active_buckets = value;
        }
        if let Some(value) = env_usize("SIEVE_LIMITS_MAX_NAME_LENGTH")? {
            self.limits.max_name_length = value;
        }

        if let Some(value) = env_usize("SIEVE_EXPLORER_OVERSAMPLE_FACTOR")? {
            self.explorer.oversample_factor = value;
        }

        if let Some(value) = env_usize("SIEVE_SESSION_GRID_ROWS")? {
            self.session.grid_rows = value;
        }
        if let Some(value) = env_usize("SIEVE_SESSION_GRID_COLS")? {
            self.session.grid_cols = value;
        }
        if let Some(value) = env_f64("SIEVE_SESSION_RANDOM_SUGGESTION_CHANCE")? {
            self.session.random_suggestion_chance = value;
        }
        if let Some(value) = env_u64("SIEVE_SESSION_SEED")? {
            self.session.seed = Some(value);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.n_suggestion_candidates == 0 {
            return Err(SieveError::Config(
                "model.n_suggestion_candidates must be positive".to_string(),
            ));
        }
        if let Some(exploration) = &self.model.exploration {
            if exploration.n_rounds == 0 {
                return Err(SieveError::Config(
                    "model.exploration.n_rounds must be positive".to_string(),
                ));
            }
        }
        if let OracleMode::ActiveLearning { ratio } = self.model.oracle {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(SieveError::Config(format!(
                    "model.oracle ratio must lie in [0, 1] (got {ratio})"
                )));
            }
        }
        if self.model.svm.c <= 0.0 || self.model.svm.max_iterations == 0 {
            return Err(SieveError::Config(
                "model.svm needs c > 0 and max_iterations > 0".to_string(),
            ));
        }
        if self.limits.max_buckets == 0 || self.limits.max_active_buckets == 0 {
            return Err(SieveError::Config(
                "limits.max_buckets and limits.max_active_buckets must be positive".to_string(),
            ));
        }
        if self.explorer.oversample_factor == 0 {
            return Err(SieveError::Config(
                "explorer.oversample_factor must be positive".to_string(),
            ));
        }
        let session = &self.session;
        if session.grid_rows == 0
            || session.grid_cols == 0
            || session.grid_rows > session.grid_max_rows
            || session.grid_cols > session.grid_max_cols
        {
            return Err(SieveError::Config(format!(
                "session grid {}x{} must be non-empty and within {}x{}",
                session.grid_rows, session.grid_cols, session.grid_max_rows, session.grid_max_cols
            )));
        }
        if !(0.0..=1.0).contains(&session.random_suggestion_chance) {
            return Err(SieveError::Config(format!(
                "session.random_suggestion_chance must lie in [0, 1] (got {})",
                session.random_suggestion_chance
            )));
        }
        Ok(())
    }
}

/// How the oracle treats suggestion slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OracleMode {
    /// Plain relevance feedback: every slot is a genuine suggestion.
    #[default]
    Rf,
    /// Each slot becomes an uncertainty query with probability `ratio`.
    ActiveLearning { ratio: f64 },
}

impl OracleMode {
    pub const DEFAULT_AL_RATIO: f64 = 0.1;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborMethod {
    Ann,
    Knn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationConfig {
    /// Length of the per-channel sliding windows.
    pub n_rounds: usize,
    pub method: NeighborMethod,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            n_rounds: 5,
            method: NeighborMethod::Ann,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmConfig {
    pub c: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iterations: 1000,
            tolerance: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub n_suggestion_candidates: usize,
    #[serde(default)]
    pub exploration: Option<ExplorationConfig>,
    #[serde(default)]
    pub oracle: OracleMode,
    #[serde(default)]
    pub svm: SvmConfig,
    #[serde(default)]
    pub ann_max_exemplars: usize,
    #[serde(default)]
    pub ann_sample_cap: usize,
    #[serde(default)]
    pub knn_max_exemplars: usize,
    #[serde(default)]
    pub n_archetypes: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_suggestion_candidates: 1000,
            exploration: Some(ExplorationConfig::default()),
            oracle: OracleMode::default(),
            svm: SvmConfig::default(),
            ann_max_exemplars: 20,
            ann_sample_cap: 10_000,
            knn_max_exemplars: 50,
            n_archetypes: 3,
        }
    }
}

impl ModelConfig {
    fn merge(&mut self, patch: ModelPatch) {
        if let Some(value) = patch.n_suggestion_candidates {
            self.n_suggestion_candidates = value;
        }
        if let Some(patch) = patch.exploration {
            if patch.enabled == Some(false) {
                self.exploration = None;
            } else {
                let exploration = self.exploration.get_or_insert_with(ExplorationConfig::default);
                if let Some(value) = patch.n_rounds {
                    exploration.n_rounds = value;
                }
                if let Some(value) = patch.method {
                    exploration.method = value;
                }
            }
        }
        if let Some(value) = patch.oracle {
            self.oracle = value;
        }
        if let Some(patch) = patch.svm {
            if let Some(value) = patch.c {
                self.svm.c = value;
            }
            if let Some(value) = patch.max_iterations {
                self.svm.max_iterations = value;
            }
            if let Some(value) = patch.tolerance {
                self.svm.tolerance = value;
            }
        }
        if let Some(value) = patch.ann_max_exemplars {
            self.ann_max_exemplars = value;
        }
        if let Some(value) = patch.ann_sample_cap {
            self.ann_sample_cap = value;
        }
        if let Some(value) = patch.knn_max_exemplars {
            self.knn_max_exemplars = value;
        }
        if let Some(value) = patch.n_archetypes {
            self.n_archetypes = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default)]
    pub max_buckets: usize,
    #[serde(default)]
    pub max_active_buckets: usize,
    #[serde(default)]
    pub max_name_length: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_buckets: 1000,
            max_active_buckets: 7,
            max_name_length: 16,
        }
    }
}

impl LimitsConfig {
    fn merge(&mut self, patch: LimitsPatch) {
        if let Some(value) = patch.max_buckets {
            self.max_buckets = value;
        }
        if let Some(value) = patch.max_active_buckets {
            self.max_active_buckets = value;
        }
        if let Some(value) = patch.max_name_length {
            self.max_name_length = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Candidate pool size as a multiple of the requested suggestion count.
    #[serde(default)]
    pub oversample_factor: usize,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            oversample_factor: 100,
        }
    }
}

impl ExplorerConfig {
    fn merge(&mut self, patch: ExplorerPatch) {
        if let Some(value) = patch.oversample_factor {
            self.oversample_factor = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub grid_rows: usize,
    #[serde(default)]
    pub grid_cols: usize,
    #[serde(default)]
    pub grid_max_rows: usize,
    #[serde(default)]
    pub grid_max_cols: usize,
    #[serde(default)]
    pub random_suggestion_chance: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grid_rows: 4,
            grid_cols: 7,
            grid_max_rows: 10,
            grid_max_cols: 10,
            random_suggestion_chance: 0.1,
            seed: None,
        }
    }
}

impl SessionConfig {
    fn merge(&mut self, patch: SessionPatch) {
        if let Some(value) = patch.grid_rows {
            self.grid_rows = value;
        }
        if let Some(value) = patch.grid_cols {
            self.grid_cols = value;
        }
        if let Some(value) = patch.grid_max_rows {
            self.grid_max_rows = value;
        }
        if let Some(value) = patch.grid_max_cols {
            self.grid_max_cols = value;
        }
        if let Some(value) = patch.random_suggestion_chance {
            self.random_suggestion_chance = value;
        }
        if let Some(value) = patch.seed {
            self.seed = Some(value);
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub model: Option<ModelPatch>,
    pub limits: Option<LimitsPatch>,
    pub explorer: Option<ExplorerPatch>,
    pub session: Option<SessionPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ModelPatch {
    pub n_suggestion_candidates: Option<usize>,
    pub exploration: Option<ExplorationPatch>,
    pub oracle: Option<OracleMode>,
    pub svm: Option<SvmPatch>,
    pub ann_max_exemplars: Option<usize>,
    pub ann_sample_cap: Option<usize>,
    pub knn_max_exemplars: Option<usize>,
    pub n_archetypes: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ExplorationPatch {
    pub enabled: Option<bool>,
    pub n_rounds: Option<usize>,
    pub method: Option<NeighborMethod>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SvmPatch {
    pub c: Option<f64>,
    pub max_iterations: Option<usize>,
    pub tolerance: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LimitsPatch {
    pub max_buckets: Option<usize>,
    pub max_active_buckets: Option<usize>,
    pub max_name_length: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ExplorerPatch {
    pub oversample_factor: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SessionPatch {
    pub grid_rows: Option<usize>,
    pub grid_cols: Option<usize>,
    pub grid_max_rows: Option<usize>,
    pub grid_max_cols: Option<usize>,
    pub random_suggestion_chance: Option<f64>,
    pub seed: Option<u64>,
}

fn parse_neighbor_method(value: &str) -> Result<NeighborMethod> {
    match value.to_lowercase().as_str() {
        "ann" => Ok(NeighborMethod::Ann),
        "knn" => Ok(NeighborMethod::Knn),
        _ => Err(SieveError::Config(format!(
            "invalid exploration method {value} (expected ann|knn)"
        ))),
    }
}

/// Accepts `rf`, `al` (default ratio) or `al:<ratio>`.
fn parse_oracle(value: &str) -> Result<OracleMode> {
    let lowered = value.to_lowercase();
    let (mode, ratio) = match lowered.split_once(':') {
        Some((mode, ratio)) => (mode.to_string(), Some(ratio.to_string())),
        None => (lowered, None),
    };
    match (mode.as_str(), ratio) {
        ("rf", None) => Ok(OracleMode::Rf),
        ("al" | "active_learning", None) => Ok(OracleMode::ActiveLearning {
            ratio: OracleMode::DEFAULT_AL_RATIO,
        }),
        ("al" | "active_learning", Some(ratio)) => ratio
            .parse::<f64>()
            .map(|ratio| OracleMode::ActiveLearning { ratio })
            .map_err(|err| SieveError::Config(format!("invalid oracle ratio {ratio}: {err}"))),
        _ => Err(SieveError::Config(format!(
            "invalid oracle mode {value} (expected rf|al|al:<ratio>)"
        ))),
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn env_usize(key: &str) -> Result<Option<usize>> {
    match std::env::var(key) {
        Ok(value) => value
            .parse::<usize>()
            .map(Some)
            .map_err(|err| SieveError::Config(format!("invalid {key} value {value}: {err}"))),
        Err(_) => Ok(None),
    }
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|err| SieveError::Config(format!("invalid {key} value {value}: {err}"))),
        Err(_) => Ok(None),
    }
}

fn env_f64(key: &str) -> Result<Option<f64>> {
    match std::env::var(key) {
        Ok(value) => value
            .parse::<f64>()
            .map(Some)
            .map_err(|err| SieveError::Config(format!("invalid {key} value {value}: {err}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_merges_over_defaults() {
        let config = Config::from_toml_str(
            r#"
            [model]
            n_suggestion_candidates = 250
            oracle = { mode = "rf" }

            [model.exploration]
            method = "knn"

            [session]
            grid_rows = 2
            seed = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.model.n_suggestion_candidates, 250);
        assert_eq!(config.model.oracle, OracleMode::Rf);
        let exploration = config.model.exploration.unwrap();
        assert_eq!(exploration.method, NeighborMethod::Knn);
        assert_eq!(exploration.n_rounds, 5);
        assert_eq!(config.session.grid_rows, 2);
        assert_eq!(config.session.grid_cols, 7);
        assert_eq!(config.session.seed, Some(7));
        assert_eq!(config.limits.max_active_buckets, 7);
    }

    #[test]
    fn exploration_can_be_disabled() {
        let config = Config::from_toml_str("[model.exploration]\nenabled = false\n").unwrap();
        assert!(config.model.exploration.is_none());
    }

    #[test]
    fn out_of_range_ratio_is_rejected() {
        let err = Config::from_toml_str(
            "[model]\noracle = { mode = \"active_learning\", ratio = 1.5 }\n",
        )
        .unwrap_err();
        assert!(matches!(err, SieveError::Config(_)));
    }

    #[test]
    fn oracle_strings_parse() {
        assert_eq!(parse_oracle("rf").unwrap(), OracleMode::Rf);
        assert_eq!(
            parse_oracle("al:0.25").unwrap(),
            OracleMode::ActiveLearning { ratio: 0.25 }
        );
        assert!(parse_oracle("bandit").is_err());
    }
}
