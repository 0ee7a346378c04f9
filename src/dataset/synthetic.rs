//! Synthetic clustered corpora for simulation, tests and benches.
//!
//! Items are drawn around random cluster centers. The product-quantization
//! artifact uses the cluster centers' sub-vectors as codebooks, which is a
//! cheap stand-in for offline k-means.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::config::SvmConfig;
use crate::dataset::{
    DatasetContext, DenseFeatures, DistanceIndex, FEATURES_FILE, FeaturesArtifact, INDEX_FILE,
    IndexArtifact, LABELS_FILE, UrlResolver,
};
use crate::engine::ItemId;
use crate::engine::classifier::LinearSvm;
use crate::error::{Result, SieveError};

#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub n_items: usize,
    pub n_clusters: usize,
    pub dim: usize,
    pub n_subspaces: usize,
    /// Standard deviation of the cluster centers.
    pub separation: f64,
    /// Standard deviation of items around their center.
    pub spread: f64,
    /// Neighbors per item in the k-NN table; 0 skips the table.
    pub knn: usize,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            n_items: 500,
            n_clusters: 5,
            dim: 16,
            n_subspaces: 4,
            separation: 4.0,
            spread: 1.0,
            knn: 10,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticCorpus {
    pub features: FeaturesArtifact,
    pub index: IndexArtifact,
    /// Ground-truth cluster of every item.
    pub labels: Vec<usize>,
}

impl SyntheticCorpus {
    #[must_use]
    pub fn generate(spec: &SyntheticSpec) -> Self {
        let mut rng = StdRng::seed_from_u64(spec.seed);
        let dim = spec.dim.max(1);
        let n_clusters = spec.n_clusters.max(1);
        let n_subspaces = spec.n_subspaces.clamp(1, dim);

        let centers = sample_rows(n_clusters, dim, spec.separation, None, &mut rng);
        let labels: Vec<usize> = (0..spec.n_items).map(|i| i % n_clusters).collect();
        let rows: Vec<Vec<f32>> = labels
            .iter()
            .flat_map(|&label| {
                sample_rows(1, dim, spec.spread, Some(centers[label].as_slice()), &mut rng)
            })
            .collect();

        let bounds = subspace_bounds(dim, n_subspaces);
        let tables: Vec<Vec<Vec<f64>>> = bounds
            .iter()
            .map(|&(lo, hi)| {
                centers
                    .iter()
                    .map(|a| {
                        centers
                            .iter()
                            .map(|b| squared_distance(&a[lo..hi], &b[lo..hi]))
                            .collect()
                    })
                    .collect()
            })
            .collect();
        let codes: Vec<Vec<u16>> = rows
            .iter()
            .map(|row| {
                bounds
                    .iter()
                    .map(|&(lo, hi)| nearest_center(&row[lo..hi], &centers, lo, hi))
                    .collect()
            })
            .collect();

        let knn = (spec.knn > 0).then(|| exact_knn(&rows, spec.knn));

        Self {
            features: FeaturesArtifact { dim, rows },
            index: IndexArtifact {
                n_subspaces,
                n_centroids: n_clusters,
                codes,
                tables,
                knn,
            },
            labels,
        }
    }

    /// Builds a shared context with the default linear SVM trainer.
    pub fn context(&self, svm: &SvmConfig) -> Result<DatasetContext> {
        DatasetContext::new(
            Box::new(DenseFeatures::from_artifact(self.features.clone())?),
            Some(DistanceIndex::from_artifact(self.index.clone())?),
            UrlResolver::Identity,
            Arc::new(LinearSvm::new(svm)),
        )
    }

    /// Writes `features.json`, `index.json` and the ground-truth
    /// `labels.json` into `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join(FEATURES_FILE), serde_json::to_vec(&self.features)?)?;
        fs::write(dir.join(INDEX_FILE), serde_json::to_vec(&self.index)?)?;
        fs::write(dir.join(LABELS_FILE), serde_json::to_vec(&self.labels)?)?;
        Ok(())
    }

    /// Items whose ground-truth cluster is `label`.
    #[must_use]
    pub fn members_of(&self, label: usize) -> Vec<ItemId> {
        self.labels
            .iter()
            .enumerate()
            .filter(|&(_, &l)| l == label)
            .filter_map(|(item, _)| ItemId::try_from(item).ok())
            .collect()
    }

    pub fn label_of(&self, item: ItemId) -> Result<usize> {
        self.labels
            .get(item as usize)
            .copied()
            .ok_or(SieveError::ItemOutOfRange {
                item,
                size: self.labels.len(),
            })
    }
}

#[allow(clippy::cast_possible_truncation)]
fn sample_rows(
    n: usize,
    dim: usize,
    std_dev: f64,
    center: Option<&[f32]>,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    (0..n)
        .map(|_| {
            (0..dim)
                .map(|d| {
                    let offset = center.map_or(0.0, |c| f64::from(c[d]));
                    let z: f64 = rng.sample(StandardNormal);
                    std_dev.abs().mul_add(z, offset) as f32
                })
                .collect()
        })
        .collect()
}

fn subspace_bounds(dim: usize, n_subspaces: usize) -> Vec<(usize, usize)> {
    let base = dim / n_subspaces;
    let extra = dim % n_subspaces;
    let mut bounds = Vec::with_capacity(n_subspaces);
    let mut lo = 0;
    for s in 0..n_subspaces {
        let hi = lo + base + usize::from(s < extra);
        bounds.push((lo, hi));
        lo = hi;
    }
    bounds
}

fn squared_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| f64::from(x - y).powi(2))
        .sum()
}

fn nearest_center(sub: &[f32], centers: &[Vec<f32>], lo: usize, hi: usize) -> u16 {
    centers
        .iter()
        .map(|center| squared_distance(sub, &center[lo..hi]))
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .and_then(|(i, _)| u16::try_from(i).ok())
        .unwrap_or(0)
}

fn exact_knn(rows: &[Vec<f32>], k: usize) -> Vec<Vec<ItemId>> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let mut others: Vec<(f64, usize)> = rows
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(j, other)| (squared_distance(row, other), j))
                .collect();
            others.sort_by(|a, b| a.0.total_cmp(&b.0));
            others
                .into_iter()
                .take(k)
                .filter_map(|(_, j)| ItemId::try_from(j).ok())
                .collect()
        })
        .collect()
}
