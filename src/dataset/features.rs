//! Feature vectors for the corpus.

use std::collections::HashSet;
use std::fmt::Debug;

use rand::RngCore;
use rand::seq::IndexedRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::engine::ItemId;
use crate::error::{Result, SieveError};

/// Dense row-major matrix of `f32` features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    dim: usize,
    data: Vec<f32>,
}

impl FeatureMatrix {
    pub fn new(dim: usize, data: Vec<f32>) -> Result<Self> {
        if dim == 0 {
            return Err(SieveError::Dataset("feature dimension must be positive".to_string()));
        }
        if data.len() % dim != 0 {
            return Err(SieveError::Dataset(format!(
                "{} values do not divide into rows of {dim}",
                data.len()
            )));
        }
        Ok(Self { dim, data })
    }

    pub fn from_rows(dim: usize, rows: Vec<Vec<f32>>) -> Result<Self> {
        let mut data = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != dim {
                return Err(SieveError::Dataset(format!(
                    "row {i} has {} values, expected {dim}",
                    row.len()
                )));
            }
            data.extend(row);
        }
        Self::new(dim, data)
    }

    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.data.len() / self.dim
    }

    #[must_use]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dim)
    }

    pub fn par_rows(&self) -> impl IndexedParallelIterator<Item = &[f32]> {
        self.data.par_chunks_exact(self.dim)
    }
}

/// Read access to the corpus features.
pub trait FeatureProvider: Send + Sync + Debug {
    /// Corpus size N.
    fn size(&self) -> usize;

    fn dim(&self) -> usize;

    fn vector(&self, item: ItemId) -> Result<&[f32]>;

    /// Rows for `items`, followed by `random_fill` rows sampled uniformly
    /// from the rest of the corpus.
    fn matrix(
        &self,
        items: &[ItemId],
        random_fill: usize,
        rng: &mut dyn RngCore,
    ) -> Result<FeatureMatrix>;

    fn all(&self) -> &FeatureMatrix;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesArtifact {
    pub dim: usize,
    pub rows: Vec<Vec<f32>>,
}

/// In-memory features, loaded once and never mutated.
#[derive(Debug, Clone)]
pub struct DenseFeatures {
    matrix: FeatureMatrix,
}

impl DenseFeatures {
    pub fn new(matrix: FeatureMatrix) -> Result<Self> {
        if matrix.n_rows() == 0 {
            return Err(SieveError::Dataset("the corpus has no items".to_string()));
        }
        if ItemId::try_from(matrix.n_rows()).is_err() {
            return Err(SieveError::Dataset(format!(
                "corpus of {} items exceeds the item id range",
                matrix.n_rows()
            )));
        }
        Ok(Self { matrix })
    }

    pub fn from_artifact(artifact: FeaturesArtifact) -> Result<Self> {
        Self::new(FeatureMatrix::from_rows(artifact.dim, artifact.rows)?)
    }

    fn check(&self, item: ItemId) -> Result<usize> {
        let index = item as usize;
        if index >= self.matrix.n_rows() {
            return Err(SieveError::ItemOutOfRange {
                item,
                size: self.matrix.n_rows(),
            });
        }
        Ok(index)
    }
}

impl FeatureProvider for DenseFeatures {
    fn size(&self) -> usize {
        self.matrix.n_rows()
    }

    fn dim(&self) -> usize {
        self.matrix.dim()
    }

    fn vector(&self, item: ItemId) -> Result<&[f32]> {
        let index = self.check(item)?;
        Ok(self.matrix.row(index))
    }

    fn matrix(
        &self,
        items: &[ItemId],
        random_fill: usize,
        rng: &mut dyn RngCore,
    ) -> Result<FeatureMatrix> {
        let mut rows = Vec::with_capacity(items.len() + random_fill);
        for &item in items {
            rows.push(self.check(item)?);
        }

        if random_fill > 0 {
            let taken: HashSet<usize> = rows.iter().copied().collect();
            let candidates: Vec<usize> = (0..self.size()).filter(|i| !taken.contains(i)).collect();
            rows.extend(candidates.choose_multiple(rng, random_fill).copied());
        }

        let mut data = Vec::with_capacity(rows.len() * self.dim());
        for index in rows {
            data.extend_from_slice(self.matrix.row(index));
        }
        FeatureMatrix::new(self.dim(), data)
    }

    fn all(&self) -> &FeatureMatrix {
        &self.matrix
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn features() -> DenseFeatures {
        DenseFeatures::from_artifact(FeaturesArtifact {
            dim: 2,
            rows: vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]],
        })
        .unwrap()
    }

    #[test]
    fn matrix_gathers_requested_rows_in_order() {
        let mut rng = StdRng::seed_from_u64(0);
        let m = features().matrix(&[3, 1], 0, &mut rng).unwrap();
        assert_eq!(m.n_rows(), 2);
        assert_eq!(m.row(0), &[1.0, 1.0]);
        assert_eq!(m.row(1), &[1.0, 0.0]);
    }

    #[test]
    fn random_fill_draws_from_the_rest() {
        let mut rng = StdRng::seed_from_u64(9);
        let f = features();
        let m = f.matrix(&[0, 1], 5, &mut rng).unwrap();
        // only two other rows exist
        assert_eq!(m.n_rows(), 4);
        let filled: Vec<&[f32]> = m.rows().skip(2).collect();
        assert!(!filled.contains(&f.vector(0).unwrap()));
        assert!(!filled.contains(&f.vector(1).unwrap()));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = FeatureMatrix::from_rows(2, vec![vec![0.0, 1.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, SieveError::Dataset(_)));
    }

    #[test]
    fn out_of_range_items_are_reported() {
        assert!(matches!(
            features().vector(4),
            Err(SieveError::ItemOutOfRange { item: 4, size: 4 })
        ));
    }
}
