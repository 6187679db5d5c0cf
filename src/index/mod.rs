//! Nearest-neighbor index subsystem.
//!
//! Three interchangeable structures sit behind one tagged variant: an exact
//! linear scanner, a KD-tree with deferred rebuilds, and a multi-table
//! random-hyperplane LSH. The store owns at most one `VectorIndex` per
//! library and keeps it in sync through the incremental hooks; a
//! change-ratio heuristic decides when patching gives way to a full rebuild.

mod filter;
mod kdtree;
mod linear;
mod lsh;

pub use filter::MetadataFilter;
pub use kdtree::KdTreeIndex;
pub use linear::LinearIndex;
pub use lsh::LshIndex;

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Chunk;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IndexError {
    #[error("chunk {0} is already present in the index")]
    AlreadyPresent(Uuid),

    #[error("chunk {0} not found in the index")]
    NotFound(Uuid),
}

/// Index algorithm selector, as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Linear,
    KdTree,
    Lsh,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Linear => "linear",
            Algorithm::KdTree => "kd_tree",
            Algorithm::Lsh => "lsh",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(Algorithm::Linear),
            "kd_tree" => Ok(Algorithm::KdTree),
            "lsh" => Ok(Algorithm::Lsh),
            other => Err(other.to_string()),
        }
    }
}

/// Construction tunables for the three index families, surfaced through the
/// service configuration.
#[derive(Debug, Clone)]
pub struct IndexParams {
    pub linear_normalize: bool,
    pub linear_batch_size: usize,
    pub kdtree_dim_threshold: usize,
    pub lsh_num_tables: usize,
    pub lsh_hash_size: u32,
    pub lsh_normalize: bool,
    pub lsh_max_candidates: usize,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            linear_normalize: true,
            linear_batch_size: 1000,
            kdtree_dim_threshold: 20,
            lsh_num_tables: 6,
            lsh_hash_size: 12,
            lsh_normalize: true,
            lsh_max_candidates: 50,
        }
    }
}

/// Polymorphic index handle. A closed set of variants instead of trait
/// objects: the store needs to branch on the algorithm for status strings,
/// and nothing outside this module ever adds a fourth implementation.
#[derive(Debug)]
pub enum VectorIndex {
    Linear(LinearIndex),
    KdTree(KdTreeIndex),
    Lsh(LshIndex),
}

impl VectorIndex {
    /// Factory: build an index of the requested algorithm over `chunks`.
    pub fn create(chunks: Vec<Chunk>, algorithm: Algorithm, params: &IndexParams) -> Self {
        match algorithm {
            Algorithm::Linear => VectorIndex::Linear(LinearIndex::new(
                chunks,
                params.linear_normalize,
                params.linear_batch_size,
            )),
            Algorithm::KdTree => {
                VectorIndex::KdTree(KdTreeIndex::new(chunks, params.kdtree_dim_threshold))
            }
            Algorithm::Lsh => VectorIndex::Lsh(LshIndex::new(
                chunks,
                params.lsh_num_tables,
                params.lsh_hash_size,
                params.lsh_normalize,
                params.lsh_max_candidates,
            )),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            VectorIndex::Linear(_) => Algorithm::Linear,
            VectorIndex::KdTree(_) => Algorithm::KdTree,
            VectorIndex::Lsh(_) => Algorithm::Lsh,
        }
    }

    /// Whether the handle supports incremental add/remove. Every variant
    /// does today; the store still probes before patching so a wrapper that
    /// disables the pathway keeps working.
    pub fn is_updateable(&self) -> bool {
        match self {
            VectorIndex::Linear(_) | VectorIndex::KdTree(_) | VectorIndex::Lsh(_) => true,
        }
    }

    pub fn add(&mut self, chunk: Chunk) -> Result<(), IndexError> {
        match self {
            VectorIndex::Linear(idx) => idx.add(chunk),
            VectorIndex::KdTree(idx) => idx.add(chunk),
            VectorIndex::Lsh(idx) => idx.add(chunk),
        }
    }

    pub fn remove(&mut self, id: Uuid) -> Result<(), IndexError> {
        match self {
            VectorIndex::Linear(idx) => idx.remove(id),
            VectorIndex::KdTree(idx) => idx.remove(id),
            VectorIndex::Lsh(idx) => idx.remove(id),
        }
    }

    /// k-NN query. Takes `&mut self` because the KD-tree performs its due
    /// rebuild lazily on the query path.
    pub fn query(&mut self, query: &[f32], k: usize, filter: Option<&MetadataFilter>) -> Vec<Chunk> {
        match self {
            VectorIndex::Linear(idx) => idx.query(query, k, filter),
            VectorIndex::KdTree(idx) => idx.query(query, k, filter),
            VectorIndex::Lsh(idx) => idx.query(query, k, filter),
        }
    }

    pub fn check_rebuild_needed(&self) -> bool {
        match self {
            VectorIndex::KdTree(idx) => idx.check_rebuild_needed(),
            VectorIndex::Linear(_) | VectorIndex::Lsh(_) => false,
        }
    }

    /// Rebuild from live data when the change ratio demands it. Only the
    /// KD-tree defers structure changes; the other variants report `false`.
    pub fn rebuild_if_needed(&mut self, all_chunks: Option<Vec<Chunk>>) -> bool {
        match self {
            VectorIndex::KdTree(idx) => idx.rebuild_if_needed(all_chunks),
            VectorIndex::Linear(_) | VectorIndex::Lsh(_) => false,
        }
    }

    /// Unapplied-change marker, for indices that track one.
    pub fn pending_changes(&self) -> bool {
        match self {
            VectorIndex::Linear(_) => false,
            VectorIndex::KdTree(idx) => idx.pending_changes(),
            VectorIndex::Lsh(idx) => idx.pending_changes(),
        }
    }

    pub fn clear_pending_changes(&mut self) {
        match self {
            VectorIndex::Linear(_) => {}
            VectorIndex::KdTree(idx) => idx.clear_pending_changes(),
            VectorIndex::Lsh(idx) => idx.clear_pending_changes(),
        }
    }

    /// Embedding dimension, if the index has seen any vector.
    pub fn dim(&self) -> Option<usize> {
        match self {
            VectorIndex::Linear(idx) => idx.dim(),
            VectorIndex::KdTree(idx) => idx.dim(),
            VectorIndex::Lsh(idx) => idx.dim(),
        }
    }

    /// Number of chunks the index accounts for, pending bookkeeping included.
    pub fn len(&self) -> usize {
        match self {
            VectorIndex::Linear(idx) => idx.len(),
            VectorIndex::KdTree(idx) => idx.len(),
            VectorIndex::Lsh(idx) => idx.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of chunks sitting in the KD-tree's insert buffer.
    pub fn buffered_chunks(&self) -> Option<usize> {
        match self {
            VectorIndex::KdTree(idx) => Some(idx.buffered_len()),
            _ => None,
        }
    }

    /// Number of tombstoned chunk ids awaiting a rebuild.
    pub fn deleted_chunks(&self) -> Option<usize> {
        match self {
            VectorIndex::KdTree(idx) => Some(idx.tombstone_len()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn chunk(embedding: Vec<f32>) -> Chunk {
        Chunk::new("t".into(), embedding, ChunkMetadata::named("t"))
    }

    #[test]
    fn algorithm_round_trips_through_str() {
        for alg in [Algorithm::Linear, Algorithm::KdTree, Algorithm::Lsh] {
            assert_eq!(alg.as_str().parse::<Algorithm>().unwrap(), alg);
        }
        assert!("hnsw".parse::<Algorithm>().is_err());
    }

    #[test]
    fn factory_builds_each_variant() {
        let params = IndexParams::default();
        let chunks = vec![chunk(vec![0.1, 0.2]), chunk(vec![0.3, 0.4])];
        for alg in [Algorithm::Linear, Algorithm::KdTree, Algorithm::Lsh] {
            let index = VectorIndex::create(chunks.clone(), alg, &params);
            assert_eq!(index.algorithm(), alg);
            assert!(index.is_updateable());
            assert_eq!(index.dim(), Some(2));
        }
    }
}
