//! Exact brute-force index.
//!
//! Chunks are scanned in insertion order, in fixed-size batches, and ranked
//! on a size-k min-heap. With normalization enabled the score is the dot
//! product against pre-normalized embeddings (equivalent to cosine
//! similarity); without it, negated squared Euclidean distance.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use uuid::Uuid;

use super::{IndexError, MetadataFilter};
use crate::models::Chunk;
use crate::vector::{dot, normalize, sqdist};

const DEFAULT_NORMALIZE: bool = true;
const DEFAULT_BATCH_SIZE: usize = 1000;

/// Heap entry ordered by score, then by earliest insertion index.
#[derive(Debug, PartialEq)]
struct Scored {
    score: f32,
    idx: usize,
}

impl Eq for Scored {}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        // Embeddings are validated finite, so total_cmp is the numeric order.
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
pub struct LinearIndex {
    chunks: Vec<Chunk>,
    normalize: bool,
    batch_size: usize,
    normalized: Vec<Vec<f32>>,
    id_to_idx: HashMap<Uuid, usize>,
}

impl LinearIndex {
    pub fn new(chunks: Vec<Chunk>, normalize: bool, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        let id_to_idx = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id, i))
            .collect();
        let normalized = if normalize {
            chunks.iter().map(|c| crate::vector::normalize(&c.embedding)).collect()
        } else {
            Vec::new()
        };
        Self {
            chunks,
            normalize,
            batch_size,
            normalized,
            id_to_idx,
        }
    }

    pub fn with_defaults(chunks: Vec<Chunk>) -> Self {
        Self::new(chunks, DEFAULT_NORMALIZE, DEFAULT_BATCH_SIZE)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dim(&self) -> Option<usize> {
        self.chunks.first().map(|c| c.embedding.len())
    }

    pub fn add(&mut self, chunk: Chunk) -> Result<(), IndexError> {
        if self.id_to_idx.contains_key(&chunk.id) {
            return Err(IndexError::AlreadyPresent(chunk.id));
        }
        self.id_to_idx.insert(chunk.id, self.chunks.len());
        if self.normalize {
            self.normalized.push(normalize(&chunk.embedding));
        }
        self.chunks.push(chunk);
        Ok(())
    }

    pub fn remove(&mut self, id: Uuid) -> Result<(), IndexError> {
        let idx = *self.id_to_idx.get(&id).ok_or(IndexError::NotFound(id))?;
        self.chunks.remove(idx);
        if self.normalize {
            self.normalized.remove(idx);
        }
        // Positions after the removed slot all shifted; rebuild the map.
        self.id_to_idx = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id, i))
            .collect();
        Ok(())
    }

    fn score(&self, query: &[f32], idx: usize) -> f32 {
        if self.normalize {
            dot(query, &self.normalized[idx])
        } else {
            -sqdist(query, &self.chunks[idx].embedding)
        }
    }

    pub fn query(&self, query: &[f32], k: usize, filter: Option<&MetadataFilter>) -> Vec<Chunk> {
        if self.chunks.is_empty() || k == 0 {
            return Vec::new();
        }

        let normalized_query;
        let query = if self.normalize {
            normalized_query = normalize(query);
            normalized_query.as_slice()
        } else {
            query
        };

        let mut heap: BinaryHeap<Reverse<Scored>> = BinaryHeap::with_capacity(k + 1);

        for batch_start in (0..self.chunks.len()).step_by(self.batch_size) {
            let batch_end = (batch_start + self.batch_size).min(self.chunks.len());
            for idx in batch_start..batch_end {
                if let Some(f) = filter {
                    if !f.matches(&self.chunks[idx]) {
                        continue;
                    }
                }
                let entry = Scored {
                    score: self.score(query, idx),
                    idx,
                };
                if heap.len() < k {
                    heap.push(Reverse(entry));
                } else if heap.peek().is_some_and(|min| entry > min.0) {
                    heap.pop();
                    heap.push(Reverse(entry));
                }
            }
        }

        let mut ranked: Vec<Scored> = heap.into_iter().map(|r| r.0).collect();
        ranked.sort_by(|a, b| b.cmp(a));
        ranked
            .into_iter()
            .map(|s| self.chunks[s.idx].clone())
            .collect()
    }
}
