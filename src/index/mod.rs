//! In-memory vector index over item embeddings.
//!
//! Ordinals are assigned monotonically at insertion time and are never
//! reused; there is no delete and no update-in-place. Re-embedding a changed
//! item appends a new ordinal and leaves the old vector behind, so neighbor
//! queries can cite superseded versions of an item. Capacity is fixed at
//! construction and must be sized for the expected corpus.


use uuid::Uuid;

use crate::{RecsError, Result};

/// One nearest-neighbor hit. `distance` is cosine distance
/// (`1 - cosine_similarity`), in `[0, 2]`, 0 meaning identical direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub ordinal: usize,
    pub item_id: Uuid,
    pub distance: f32,
}

#[derive(Debug)]
pub struct VectorIndex {
    capacity: usize,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    item_ids: Vec<Uuid>,
}

impl VectorIndex {
    #[inline]
    pub fn new(capacity: usize, dimension: usize) -> Self {
        Self {
            capacity,
            dimension,
            vectors: Vec::new(),
            item_ids: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The item an ordinal was recorded for at insertion time.
    #[inline]
    pub fn item_of(&self, ordinal: usize) -> Option<Uuid> {
        self.item_ids.get(ordinal).copied()
    }

    /// Appends a vector and returns its ordinal. Inserting past capacity is
    /// a configuration error and leaves the index untouched.
    #[inline]
    pub fn insert(&mut self, item_id: Uuid, vector: Vec<f32>) -> Result<usize> {
        if self.vectors.len() >= self.capacity {
            return Err(RecsError::IndexCapacity(self.capacity));
        }

        if vector.len() != self.dimension {
            return Err(RecsError::Embedding(format!(
                "Vector dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            )));
        }

        let ordinal = self.vectors.len();
        self.vectors.push(vector);
        self.item_ids.push(item_id);
        Ok(ordinal)
    }

    /// K-nearest-neighbor query, ascending by cosine distance. Returns at
    /// most `k` hits; fewer when the index holds fewer vectors.
    #[inline]
    pub fn knn(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(RecsError::Embedding(format!(
                "Query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }

        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(ordinal, vector)| Neighbor {
                ordinal,
                item_id: self.item_ids[ordinal],
                distance: 1.0 - cosine_similarity(query, vector),
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        neighbors.truncate(k);

        Ok(neighbors)
    }
}

/// Cosine similarity of two equal-length vectors; 0 when either has zero
/// magnitude.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}
