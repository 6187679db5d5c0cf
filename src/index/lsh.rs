//! Random-hyperplane LSH over M tables of H-bit signatures.
//!
//! Candidates come from the query's exact buckets first, then from a
//! Hamming-neighborhood ladder (1-bit, then 2-bit flips), then from a
//! small-buckets-first sweep when the tables are too sparse. The survivors
//! are always reranked exactly by a linear scan, capped at `max_candidates`.

use std::collections::{HashMap, HashSet};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::StandardNormal;
use uuid::Uuid;

use super::{IndexError, LinearIndex, MetadataFilter};
use crate::models::Chunk;
use crate::vector::normalize;

const DEFAULT_NUM_TABLES: usize = 6;
const DEFAULT_HASH_SIZE: u32 = 12;
const DEFAULT_MAX_CANDIDATES: usize = 50;

#[derive(Debug)]
pub struct LshIndex {
    num_tables: usize,
    hash_size: u32,
    normalize: bool,
    max_candidates: usize,
    /// One bucket map per table, keyed by the H-bit signature.
    tables: Vec<HashMap<u32, Vec<Chunk>>>,
    /// `num_tables * hash_size` unit hyperplanes, generated lazily when the
    /// first vector fixes the dimension.
    hyperplanes: Vec<Vec<f32>>,
    chunks_by_id: HashMap<Uuid, Chunk>,
    pending_changes: bool,
    dim: usize,
}

impl LshIndex {
    pub fn new(
        chunks: Vec<Chunk>,
        num_tables: usize,
        hash_size: u32,
        normalize: bool,
        max_candidates: usize,
    ) -> Self {
        let mut index = Self {
            num_tables: num_tables.max(1),
            hash_size: hash_size.clamp(1, 32),
            normalize,
            max_candidates: max_candidates.max(1),
            tables: vec![HashMap::new(); num_tables.max(1)],
            hyperplanes: Vec::new(),
            chunks_by_id: HashMap::new(),
            pending_changes: false,
            dim: 0,
        };
        if chunks.is_empty() {
            return index;
        }

        index.dim = chunks[0].embedding.len();
        index.generate_hyperplanes();
        for chunk in chunks {
            index.insert_into_tables(&chunk);
            index.chunks_by_id.insert(chunk.id, chunk);
        }
        index
    }

    pub fn with_defaults(chunks: Vec<Chunk>) -> Self {
        Self::new(
            chunks,
            DEFAULT_NUM_TABLES,
            DEFAULT_HASH_SIZE,
            true,
            DEFAULT_MAX_CANDIDATES,
        )
    }

    pub fn dim(&self) -> Option<usize> {
        (self.dim > 0).then_some(self.dim)
    }

    pub fn len(&self) -> usize {
        self.chunks_by_id.len()
    }

    pub fn pending_changes(&self) -> bool {
        self.pending_changes
    }

    pub fn clear_pending_changes(&mut self) {
        self.pending_changes = false;
    }

    fn generate_hyperplanes(&mut self) {
        let mut rng = rand::thread_rng();
        self.hyperplanes = (0..self.num_tables * self.hash_size as usize)
            .map(|_| {
                let raw: Vec<f32> = (0..self.dim).map(|_| rng.sample(StandardNormal)).collect();
                normalize(&raw)
            })
            .collect();
    }

    fn maybe_normalized(&self, embedding: &[f32]) -> Vec<f32> {
        if self.normalize {
            normalize(embedding)
        } else {
            embedding.to_vec()
        }
    }

    /// H-bit signature of `vec` in table `table_idx`: bit h is set iff the
    /// vector lies on the non-negative side of hyperplane h.
    fn compute_hash(&self, vec: &[f32], table_idx: usize) -> u32 {
        let offset = table_idx * self.hash_size as usize;
        let mut hash = 0u32;
        for h in 0..self.hash_size {
            let hp = &self.hyperplanes[offset + h as usize];
            if crate::vector::dot(vec, hp) >= 0.0 {
                hash |= 1 << h;
            }
        }
        hash
    }

    fn insert_into_tables(&mut self, chunk: &Chunk) {
        let embedding = self.maybe_normalized(&chunk.embedding);
        for t in 0..self.num_tables {
            let hash = self.compute_hash(&embedding, t);
            self.tables[t].entry(hash).or_default().push(chunk.clone());
        }
    }

    pub fn add(&mut self, chunk: Chunk) -> Result<(), IndexError> {
        if self.hyperplanes.is_empty() {
            // First vector fixes the dimension.
            self.dim = chunk.embedding.len();
            self.generate_hyperplanes();
        }
        if self.chunks_by_id.contains_key(&chunk.id) {
            return Err(IndexError::AlreadyPresent(chunk.id));
        }
        self.insert_into_tables(&chunk);
        self.chunks_by_id.insert(chunk.id, chunk);
        self.pending_changes = true;
        Ok(())
    }

    pub fn remove(&mut self, id: Uuid) -> Result<(), IndexError> {
        if self.chunks_by_id.remove(&id).is_none() {
            return Err(IndexError::NotFound(id));
        }
        for table in &mut self.tables {
            let mut emptied = None;
            for (hash, bucket) in table.iter_mut() {
                if let Some(pos) = bucket.iter().position(|c| c.id == id) {
                    bucket.remove(pos);
                    if bucket.is_empty() {
                        emptied = Some(*hash);
                    }
                    break;
                }
            }
            if let Some(hash) = emptied {
                table.remove(&hash);
            }
        }
        self.pending_changes = true;
        Ok(())
    }

    /// Signatures within Hamming distance 2 of `hash`, nearest first, the
    /// original excluded.
    fn neighboring_hashes(&self, hash: u32) -> Vec<u32> {
        let bits = self.hash_size;
        let mut neighbors = Vec::with_capacity(bits as usize * (bits as usize + 1) / 2);
        for i in 0..bits {
            neighbors.push(hash ^ (1 << i));
        }
        for i in 0..bits {
            for j in (i + 1)..bits {
                neighbors.push(hash ^ (1 << i) ^ (1 << j));
            }
        }
        neighbors
    }

    pub fn query(&self, query: &[f32], k: usize, filter: Option<&MetadataFilter>) -> Vec<Chunk> {
        if self.hyperplanes.is_empty() || k == 0 {
            return Vec::new();
        }

        let query = self.maybe_normalized(query);
        let query_hashes: Vec<u32> = (0..self.num_tables)
            .map(|t| self.compute_hash(&query, t))
            .collect();

        let candidates = self.gather_candidates(&query_hashes, k, filter);
        if candidates.is_empty() {
            return Vec::new();
        }
        self.rerank(candidates, &query, k)
    }

    fn gather_candidates(
        &self,
        query_hashes: &[u32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<Chunk> {
        let enough = k * 3;
        let mut candidates = Vec::new();
        let mut seen: HashSet<Uuid> = HashSet::new();

        // Exact buckets.
        for (t, &hash) in query_hashes.iter().enumerate() {
            collect_bucket(self.tables[t].get(&hash), filter, &mut seen, &mut candidates);
            if candidates.len() >= enough {
                return candidates;
            }
        }

        // Hamming-neighborhood expansion, nearest signatures first.
        if candidates.len() < k {
            'expansion: for (t, &hash) in query_hashes.iter().enumerate() {
                for neighbor in self.neighboring_hashes(hash) {
                    collect_bucket(
                        self.tables[t].get(&neighbor),
                        filter,
                        &mut seen,
                        &mut candidates,
                    );
                    if candidates.len() >= enough {
                        break 'expansion;
                    }
                }
            }
        }

        // Sparse tables: sweep the remaining buckets, smallest first, on the
        // heuristic that small buckets are the most specific.
        if candidates.len() < k {
            let target = k + k / 2;
            let mut other_buckets: Vec<(usize, usize, u32)> = Vec::new();
            for (t, table) in self.tables.iter().enumerate() {
                for (&hash, bucket) in table {
                    if hash != query_hashes[t] && !bucket.is_empty() {
                        other_buckets.push((bucket.len(), t, hash));
                    }
                }
            }
            other_buckets.sort_unstable();
            for (_, t, hash) in other_buckets {
                collect_bucket(self.tables[t].get(&hash), filter, &mut seen, &mut candidates);
                if candidates.len() >= target {
                    break;
                }
            }
        }

        candidates
    }

    /// Exact pass over the candidate set, down-sampled to `max_candidates`.
    fn rerank(&self, mut candidates: Vec<Chunk>, query: &[f32], k: usize) -> Vec<Chunk> {
        if candidates.len() > self.max_candidates {
            let mut rng = rand::thread_rng();
            candidates.shuffle(&mut rng);
            candidates.truncate(self.max_candidates);
        }
        LinearIndex::new(candidates, self.normalize, 1000).query(query, k, None)
    }
}

fn collect_bucket(
    bucket: Option<&Vec<Chunk>>,
    filter: Option<&MetadataFilter>,
    seen: &mut HashSet<Uuid>,
    out: &mut Vec<Chunk>,
) {
    let Some(bucket) = bucket else { return };
    for chunk in bucket {
        if seen.contains(&chunk.id) {
            continue;
        }
        if let Some(f) = filter {
            if !f.matches(chunk) {
                continue;
            }
        }
        seen.insert(chunk.id);
        out.push(chunk.clone());
    }
}
