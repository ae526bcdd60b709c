//! Exact inner-product index over L2-normalized vectors

use docqa_core::{DocQaError, Result};
use ndarray::{Array2, ArrayView1};

/// Position reported for rows whose score is not a number
pub const NO_MATCH: i64 = -1;

/// One search slot: a vector position and its similarity to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Vector position, or [`NO_MATCH`]
    pub position: i64,

    /// Inner product with the query
    pub score: f32,
}

impl Neighbor {
    fn no_match() -> Self {
        Self {
            position: NO_MATCH,
            score: f32::NEG_INFINITY,
        }
    }

    pub fn is_match(&self) -> bool {
        self.position != NO_MATCH
    }
}

/// Scale a vector to unit length in place; zero vectors are left unchanged
pub fn normalize_l2(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Flat (brute-force) index: row `i` is the normalized embedding of chunk `i`
#[derive(Debug, Clone)]
pub struct FlatIndex {
    vectors: Array2<f32>,
}

impl FlatIndex {
    /// Create an empty index of the given dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: Array2::zeros((0, dimension)),
        }
    }

    /// Rebuild an index from row-major, already normalized values
    pub fn from_normalized(dimension: usize, values: Vec<f32>) -> Result<Self> {
        if dimension == 0 {
            return Err(DocQaError::UnsupportedInput(
                "index dimension must be non-zero".to_string(),
            ));
        }
        let rows = values.len() / dimension;
        let vectors = Array2::from_shape_vec((rows, dimension), values)
            .map_err(|e| DocQaError::StorageError(format!("Invalid index shape: {e}")))?;
        Ok(Self { vectors })
    }

    /// Normalize and append vectors, preserving their order
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for vector in vectors {
            if vector.len() != self.dimension() {
                return Err(DocQaError::EmbeddingError(format!(
                    "Embedding dimension {} does not match index dimension {}",
                    vector.len(),
                    self.dimension()
                )));
            }
            let mut row = vector.clone();
            normalize_l2(&mut row);
            self.vectors
                .push_row(ArrayView1::from(&row))
                .map_err(|e| DocQaError::StorageError(format!("Failed to append vector: {e}")))?;
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row-major view of every stored value
    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.vectors.iter().copied()
    }

    /// Exhaustive top-`k` search by inner product
    ///
    /// Returns at most `min(k, len)` slots in descending score order; equal
    /// scores are ordered by ascending position. A row scoring NaN is
    /// reported as [`NO_MATCH`] and ranked last.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension() {
            return Err(DocQaError::EmbeddingError(format!(
                "Query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension()
            )));
        }

        let scores = self.vectors.dot(&ArrayView1::from(query));
        let mut ranked: Vec<Neighbor> = scores
            .iter()
            .enumerate()
            .map(|(position, &score)| {
                if score.is_nan() {
                    Neighbor::no_match()
                } else {
                    Neighbor {
                        position: position as i64,
                        score,
                    }
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.position.cmp(&b.position))
        });
        ranked.truncate(k);

        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(vectors: &[Vec<f32>]) -> FlatIndex {
        let mut index = FlatIndex::new(vectors[0].len());
        index.add(vectors).unwrap();
        index
    }

    #[test]
    fn test_normalize_l2() {
        let mut v = vec![3.0, 4.0];
        normalize_l2(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize_l2(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let index = index_of(&[vec![1.0, 0.0], vec![0.0, 2.0], vec![1.0, 1.0]]);
        let mut query = vec![0.0, 1.0];
        normalize_l2(&mut query);

        let hits = index.search(&query, 3).unwrap();
        let positions: Vec<i64> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![1, 2, 0]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_returns_at_most_index_size() {
        let index = index_of(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]]);

        let hits = index.search(&[1.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.is_match()));

        let hits = index.search(&[1.0, 0.0], usize::MAX).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].position, 0);
    }

    #[test]
    fn test_nan_rows_are_no_match() {
        let index =
            FlatIndex::from_normalized(2, vec![1.0, 0.0, f32::NAN, f32::NAN, 0.0, 1.0]).unwrap();
        let hits = index.search(&[1.0, 0.0], 3).unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[1].position, 2);
        assert_eq!(hits[2].position, NO_MATCH);
    }

    #[test]
    fn test_equal_scores_prefer_lower_position() {
        let index = index_of(&[vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0]]);
        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].position, 1);
        assert_eq!(hits[1].position, 2);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = FlatIndex::new(3);
        assert!(index.add(&[vec![1.0, 0.0]]).is_err());
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_from_normalized_round_trip() {
        let index = index_of(&[vec![3.0, 4.0], vec![0.0, 5.0]]);
        let values: Vec<f32> = index.values().collect();
        let rebuilt = FlatIndex::from_normalized(2, values).unwrap();
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(
            rebuilt.search(&[0.0, 1.0], 1).unwrap()[0].position,
            1
        );
    }
}
