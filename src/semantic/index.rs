//! Flat nearest-neighbour index over an embedding matrix.
//!
//! Entry `i` is row `i` of the matrix it was built from, so search results
//! point straight back into the profile list.

use serde::{Deserialize, Serialize};

use crate::semantic::embeddings::EmbeddingMatrix;

/// Distance used to rank neighbours. Smaller is closer for both.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Squared Euclidean distance
    #[default]
    L2,
    /// `1 - cosine similarity`
    Cosine,
}

impl Metric {
    pub fn code(self) -> u8 {
        match self {
            Metric::L2 => 1,
            Metric::Cosine => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Metric::L2),
            2 => Some(Metric::Cosine),
            _ => None,
        }
    }
}

/// A search hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row number in the indexed matrix
    pub id: usize,
    pub distance: f32,
}

/// In-memory exact nearest-neighbour index.
pub struct VectorIndex {
    metric: Metric,
    dimensions: usize,
    /// Row-major vectors
    data: Vec<f32>,
    /// Per-row L2 norms, only filled for cosine
    norms: Vec<f32>,
}

impl VectorIndex {
    /// Create a new empty vector index with specified dimensions.
    #[cfg(test)]
    pub fn new(dimensions: usize, metric: Metric) -> Self {
        Self::with_capacity(dimensions, metric, 0)
    }

    /// Create an index with pre-allocated capacity.
    pub fn with_capacity(dimensions: usize, metric: Metric, capacity: usize) -> Self {
        Self {
            metric,
            dimensions,
            data: Vec::with_capacity(dimensions * capacity),
            norms: Vec::with_capacity(if metric == Metric::Cosine { capacity } else { 0 }),
        }
    }

    /// Build an index holding every row of `matrix`, in order.
    pub fn build(matrix: &EmbeddingMatrix, metric: Metric) -> Result<Self, IndexError> {
        let mut index = Self::with_capacity(matrix.dimensions(), metric, matrix.rows());
        for row in matrix.iter_rows() {
            index.add(row)?;
        }
        Ok(index)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn len(&self) -> usize {
        if self.dimensions == 0 {
            return 0;
        }
        self.data.len() / self.dimensions
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector and return its id.
    ///
    /// Cosine indexes reject zero-norm vectors since they cannot be normalized.
    pub fn add(&mut self, embedding: &[f32]) -> Result<usize, IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        if self.metric == Metric::Cosine {
            let norm = l2_norm(embedding);
            if norm < f32::EPSILON {
                return Err(IndexError::ZeroNormVector);
            }
            self.norms.push(norm);
        }

        let id = self.len();
        self.data.extend_from_slice(embedding);
        Ok(id)
    }

    /// Get the vector stored under `id`.
    #[cfg(test)]
    pub fn get(&self, id: usize) -> Option<&[f32]> {
        self.data.chunks_exact(self.dimensions.max(1)).nth(id)
    }

    /// Iterate over stored vectors in id order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[f32])> {
        self.data.chunks_exact(self.dimensions.max(1)).enumerate()
    }

    /// Find the `k` nearest vectors to `query`.
    ///
    /// Results are sorted by ascending distance; ties go to the lower id so
    /// repeated searches are stable.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let query_norm = l2_norm(query);
        if self.metric == Metric::Cosine && query_norm < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        let mut results: Vec<Neighbor> = self
            .iter()
            .map(|(id, target)| Neighbor {
                id,
                distance: self.distance(query, query_norm, id, target),
            })
            .collect();

        results.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(k);

        Ok(results)
    }

    fn distance(&self, query: &[f32], query_norm: f32, id: usize, target: &[f32]) -> f32 {
        match self.metric {
            Metric::L2 => query
                .iter()
                .zip(target)
                .map(|(a, b)| (a - b) * (a - b))
                .sum(),
            Metric::Cosine => {
                let dot: f32 = query.iter().zip(target).map(|(a, b)| a * b).sum();
                1.0 - dot / (query_norm * self.norms[id])
            }
        }
    }

    /// Copy the indexed vectors back out as a matrix.
    pub fn to_matrix(&self) -> Result<EmbeddingMatrix, IndexError> {
        EmbeddingMatrix::from_flat(self.dimensions, self.data.clone())
            .map_err(|_| IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: self.data.len(),
            })
    }
}

/// Compute L2 norm of a vector.
fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store or search with zero-norm vector")]
    ZeroNormVector,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f32>>) -> EmbeddingMatrix {
        let dims = rows[0].len();
        EmbeddingMatrix::from_rows(dims, rows).unwrap()
    }

    #[test]
    fn test_new_index() {
        let index = VectorIndex::new(384, Metric::L2);
        assert_eq!(index.dimensions(), 384);
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_build_keeps_row_order() {
        let m = matrix(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]]);
        let index = VectorIndex::build(&m, Metric::L2).unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.get(2), Some(&[1.0, 1.0][..]));
        assert_eq!(index.to_matrix().unwrap(), m);
    }

    #[test]
    fn test_add_dimension_mismatch() {
        let mut index = VectorIndex::new(3, Metric::L2);
        let result = index.add(&[1.0, 0.0, 0.0, 0.0]);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_zero_norm_only_rejected_for_cosine() {
        let mut cosine = VectorIndex::new(3, Metric::Cosine);
        assert!(matches!(
            cosine.add(&[0.0, 0.0, 0.0]),
            Err(IndexError::ZeroNormVector)
        ));

        let mut l2 = VectorIndex::new(3, Metric::L2);
        assert_eq!(l2.add(&[0.0, 0.0, 0.0]).unwrap(), 0);
    }

    #[test]
    fn test_l2_search_distances() {
        let m = matrix(vec![vec![0.0, 0.0], vec![3.0, 4.0], vec![1.0, 0.0]]);
        let index = VectorIndex::build(&m, Metric::L2).unwrap();

        let results = index.search(&[0.0, 0.0], 10).unwrap();
        let ids: Vec<usize> = results.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![0, 2, 1]);
        assert_eq!(results[0].distance, 0.0);
        assert_eq!(results[1].distance, 1.0);
        assert_eq!(results[2].distance, 25.0);
    }

    #[test]
    fn test_cosine_search() {
        let m = matrix(vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
        let index = VectorIndex::build(&m, Metric::Cosine).unwrap();

        let results = index.search(&[1.0, 0.1, 0.0], 10).unwrap();
        assert_eq!(results[0].id, 0);
        assert!(results[0].distance < results[1].distance);

        let exact = index.search(&[2.0, 0.0, 0.0], 1).unwrap();
        assert!(exact[0].distance.abs() < 1e-6);
    }

    #[test]
    fn test_search_with_limit() {
        let rows = (0..20).map(|i| vec![1.0, i as f32 * 0.1]).collect();
        let index = VectorIndex::build(&matrix(rows), Metric::L2).unwrap();

        let results = index.search(&[1.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 10);
        assert_eq!(results[0].id, 0);
    }

    #[test]
    fn test_k_larger_than_index() {
        let index = VectorIndex::build(&matrix(vec![vec![1.0], vec![2.0]]), Metric::L2).unwrap();
        assert_eq!(index.search(&[0.0], 10).unwrap().len(), 2);
    }

    #[test]
    fn test_ties_break_by_id() {
        let m = matrix(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0], vec![0.0, -1.0]]);
        let index = VectorIndex::build(&m, Metric::L2).unwrap();

        for _ in 0..3 {
            let ids: Vec<usize> = index
                .search(&[0.0, 0.0], 4)
                .unwrap()
                .iter()
                .map(|n| n.id)
                .collect();
            assert_eq!(ids, vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn test_empty_index_search() {
        let index = VectorIndex::new(2, Metric::L2);
        assert!(index.search(&[1.0, 0.0], 10).unwrap().is_empty());
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index = VectorIndex::new(2, Metric::L2);
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], 10),
            Err(IndexError::DimensionMismatch { expected: 2, got: 3 })
        ));
    }
}
