//! Query-time product-quantization distances.
//!
//! Every item carries one centroid code per subspace. The distance between
//! two items is the sum over subspaces of the precomputed centroid-to-centroid
//! distance for their codes. Building codes and tables is done offline.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::engine::ItemId;
use crate::error::{Result, SieveError};

/// On-disk index layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexArtifact {
    pub n_subspaces: usize,
    pub n_centroids: usize,
    /// One row of `n_subspaces` codes per item.
    pub codes: Vec<Vec<u16>>,
    /// `[subspace][centroid][centroid]` distances.
    pub tables: Vec<Vec<Vec<f64>>>,
    /// Optional precomputed nearest neighbors per item.
    #[serde(default)]
    pub knn: Option<Vec<Vec<ItemId>>>,
}

/// Row-major `|a| x |b|` distance matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    cols: usize,
    data: Vec<f64>,
}

impl DistanceMatrix {
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.data.len() / self.cols
    }

    #[must_use]
    pub const fn n_cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    #[must_use]
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }
}

#[derive(Debug, Clone)]
pub struct DistanceIndex {
    n_items: usize,
    n_subspaces: usize,
    n_centroids: usize,
    codes: Vec<u16>,
    tables: Vec<f64>,
    knn: Option<Vec<Vec<ItemId>>>,
}

impl DistanceIndex {
    pub fn from_artifact(artifact: IndexArtifact) -> Result<Self> {
        let IndexArtifact {
            n_subspaces,
            n_centroids,
            codes,
            tables,
            knn,
        } = artifact;

        if n_subspaces == 0 || n_centroids == 0 {
            return Err(SieveError::Dataset(
                "index needs at least one subspace and one centroid".to_string(),
            ));
        }
        if tables.len() != n_subspaces {
            return Err(SieveError::Dataset(format!(
                "index has {} distance tables for {n_subspaces} subspaces",
                tables.len()
            )));
        }

        let mut flat_tables = Vec::with_capacity(n_subspaces * n_centroids * n_centroids);
        for (s, table) in tables.into_iter().enumerate() {
            if table.len() != n_centroids || table.iter().any(|row| row.len() != n_centroids) {
                return Err(SieveError::Dataset(format!(
                    "distance table {s} is not {n_centroids}x{n_centroids}"
                )));
            }
            flat_tables.extend(table.into_iter().flatten());
        }

        let n_items = codes.len();
        let mut flat_codes = Vec::with_capacity(n_items * n_subspaces);
        for (item, row) in codes.into_iter().enumerate() {
            if row.len() != n_subspaces {
                return Err(SieveError::Dataset(format!(
                    "item {item} has {} codes, expected {n_subspaces}",
                    row.len()
                )));
            }
            if let Some(code) = row.iter().find(|&&code| usize::from(code) >= n_centroids) {
                return Err(SieveError::Dataset(format!(
                    "item {item} uses code {code} but only {n_centroids} centroids exist"
                )));
            }
            flat_codes.extend(row);
        }

        if let Some(knn) = &knn {
            if knn.len() != n_items {
                return Err(SieveError::Dataset(format!(
                    "k-NN table has {} rows for {n_items} items",
                    knn.len()
                )));
            }
            if let Some(bad) = knn.iter().flatten().find(|&&n| n as usize >= n_items) {
                return Err(SieveError::Dataset(format!(
                    "k-NN table references item {bad} outside the corpus"
                )));
            }
        }

        Ok(Self {
            n_items,
            n_subspaces,
            n_centroids,
            codes: flat_codes,
            tables: flat_tables,
            knn,
        })
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.n_items
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.n_items == 0
    }

    #[must_use]
    pub const fn n_subspaces(&self) -> usize {
        self.n_subspaces
    }

    #[must_use]
    pub const fn has_knn(&self) -> bool {
        self.knn.is_some()
    }

    /// Precomputed neighbors of an item, if a k-NN table was shipped.
    #[must_use]
    pub fn neighbours(&self, item: ItemId) -> Option<&[ItemId]> {
        self.knn
            .as_ref()
            .and_then(|knn| knn.get(item as usize))
            .map(Vec::as_slice)
    }

    #[inline]
    fn codes_of(&self, item: usize) -> &[u16] {
        &self.codes[item * self.n_subspaces..(item + 1) * self.n_subspaces]
    }

    #[inline]
    fn pair_distance(&self, a: &[u16], b: &[u16]) -> f64 {
        let k = self.n_centroids;
        a.iter()
            .zip(b)
            .enumerate()
            .map(|(s, (&ca, &cb))| self.tables[(s * k + usize::from(ca)) * k + usize::from(cb)])
            .sum()
    }

    fn check(&self, items: &[ItemId]) -> Result<()> {
        if items.is_empty() {
            return Err(SieveError::EmptyQuery);
        }
        if let Some(&item) = items.iter().find(|&&item| item as usize >= self.n_items) {
            return Err(SieveError::ItemOutOfRange {
                item,
                size: self.n_items,
            });
        }
        Ok(())
    }

    /// Approximate distance between every pair of `a x b`.
    pub fn distances(&self, a: &[ItemId], b: &[ItemId]) -> Result<DistanceMatrix> {
        self.check(a)?;
        self.check(b)?;

        let data = a
            .par_iter()
            .flat_map_iter(|&x| {
                let codes_x = self.codes_of(x as usize);
                b.iter()
                    .map(move |&y| self.pair_distance(codes_x, self.codes_of(y as usize)))
            })
            .collect();

        Ok(DistanceMatrix {
            cols: b.len(),
            data,
        })
    }

    /// For each item of `from`, its distance to the closest item of `to`.
    pub fn min_distances(&self, from: &[ItemId], to: &[ItemId]) -> Result<Vec<f64>> {
        self.check(from)?;
        self.check(to)?;

        Ok(from
            .par_iter()
            .map(|&x| {
                let codes_x = self.codes_of(x as usize);
                to.iter()
                    .map(|&y| self.pair_distance(codes_x, self.codes_of(y as usize)))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect())
    }
}
