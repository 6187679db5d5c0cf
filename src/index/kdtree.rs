//! Median-split KD-tree with deferred maintenance.
//!
//! The tree itself is immutable between rebuilds: inserts land in a side
//! buffer, deletes set a tombstone bit, and a change-ratio heuristic decides
//! when the accumulated churn justifies rebuilding from the live set. The
//! buffer is served by a small linear scan and merged into tree results at
//! query time.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use rand::Rng;
use tracing::warn;
use uuid::Uuid;

use super::{IndexError, LinearIndex, MetadataFilter};
use crate::models::Chunk;
use crate::vector::{dot, sqdist};

const DEFAULT_DIM_THRESHOLD: usize = 20;
const REBUILD_THRESHOLD: f32 = 0.10;
/// Below this length quickselect degrades to a direct sort.
const SORT_CUTOFF: usize = 20;

#[derive(Debug)]
struct Node {
    chunk: Chunk,
    axis: usize,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
    deleted: bool,
}

/// Max-heap entry keyed on squared distance; the peek is the current k-th
/// best while the heap is full.
struct Candidate<'a> {
    dist: f32,
    chunk: &'a Chunk,
}

impl PartialEq for Candidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist
    }
}

impl Eq for Candidate<'_> {}

impl Ord for Candidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.total_cmp(&other.dist)
    }
}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
pub struct KdTreeIndex {
    root: Option<Box<Node>>,
    dim: usize,
    tombstones: HashSet<Uuid>,
    insert_buffer: Vec<Chunk>,
    pending_changes: bool,
    rebuild_threshold: f32,
    total_chunks: usize,
}

impl KdTreeIndex {
    pub fn new(chunks: Vec<Chunk>, dim_threshold: usize) -> Self {
        let mut index = Self {
            root: None,
            dim: 0,
            tombstones: HashSet::new(),
            insert_buffer: Vec::new(),
            pending_changes: false,
            rebuild_threshold: REBUILD_THRESHOLD,
            total_chunks: 0,
        };
        if chunks.is_empty() {
            return index;
        }

        index.dim = chunks[0].embedding.len();
        if index.dim > dim_threshold {
            warn!(
                dimension = index.dim,
                threshold = dim_threshold,
                "KD-tree performance degrades in high dimensions; consider lsh"
            );
        }
        index.total_chunks = chunks.len();
        index.root = build(chunks, index.dim);
        index
    }

    pub fn with_defaults(chunks: Vec<Chunk>) -> Self {
        Self::new(chunks, DEFAULT_DIM_THRESHOLD)
    }

    pub fn dim(&self) -> Option<usize> {
        if self.dim > 0 {
            Some(self.dim)
        } else {
            self.insert_buffer.first().map(|c| c.embedding.len())
        }
    }

    pub fn len(&self) -> usize {
        self.total_chunks
    }

    pub fn buffered_len(&self) -> usize {
        self.insert_buffer.len()
    }

    pub fn tombstone_len(&self) -> usize {
        self.tombstones.len()
    }

    pub fn pending_changes(&self) -> bool {
        self.pending_changes
    }

    pub fn clear_pending_changes(&mut self) {
        self.pending_changes = false;
    }

    /// Buffer the chunk; the tree structure is untouched until a rebuild.
    pub fn add(&mut self, chunk: Chunk) -> Result<(), IndexError> {
        self.insert_buffer.push(chunk);
        self.pending_changes = true;
        self.total_chunks += 1;
        Ok(())
    }

    /// Drop the chunk from the insert buffer if it never reached the tree,
    /// otherwise tombstone its node.
    pub fn remove(&mut self, id: Uuid) -> Result<(), IndexError> {
        if let Some(pos) = self.insert_buffer.iter().position(|c| c.id == id) {
            self.insert_buffer.remove(pos);
            self.pending_changes = true;
            return Ok(());
        }

        match mark_deleted(self.root.as_deref_mut(), id) {
            Some(newly_marked) => {
                self.tombstones.insert(id);
                if newly_marked {
                    self.total_chunks -= 1;
                }
                self.pending_changes = true;
                Ok(())
            }
            None => Err(IndexError::NotFound(id)),
        }
    }

    /// Whether accumulated churn crossed the rebuild ratio.
    pub fn check_rebuild_needed(&self) -> bool {
        if !self.pending_changes {
            return false;
        }
        let changes = (self.insert_buffer.len() + self.tombstones.len()) as f32;
        changes / self.total_chunks.max(1) as f32 >= self.rebuild_threshold
    }

    /// Rebuild from the live set when due. `all_chunks`, when given,
    /// replaces the collected live set entirely.
    pub fn rebuild_if_needed(&mut self, all_chunks: Option<Vec<Chunk>>) -> bool {
        if !self.check_rebuild_needed() {
            return false;
        }

        let chunks = all_chunks.unwrap_or_else(|| {
            let mut live = Vec::with_capacity(self.total_chunks);
            collect_live(self.root.as_deref(), &self.tombstones, &mut live);
            live.append(&mut self.insert_buffer);
            live
        });

        if let Some(first) = chunks.first() {
            self.dim = first.embedding.len();
        }
        self.total_chunks = chunks.len();
        self.root = build(chunks, self.dim);
        self.tombstones.clear();
        self.insert_buffer.clear();
        self.pending_changes = false;
        true
    }

    pub fn query(&mut self, query: &[f32], k: usize, filter: Option<&MetadataFilter>) -> Vec<Chunk> {
        if k == 0 {
            return Vec::new();
        }
        if self.check_rebuild_needed() {
            self.rebuild_if_needed(None);
        }

        let buffered = if self.insert_buffer.is_empty() {
            Vec::new()
        } else {
            LinearIndex::with_defaults(self.insert_buffer.clone()).query(query, k, filter)
        };

        let Some(root) = self.root.as_deref() else {
            return buffered;
        };

        let mut heap: BinaryHeap<Candidate<'_>> = BinaryHeap::with_capacity(k + 1);
        search(root, query, k, filter, &self.tombstones, &mut heap);

        let mut tree_results: Vec<Candidate<'_>> = heap.into_vec();
        tree_results.sort_by(|a, b| a.dist.total_cmp(&b.dist));
        let tree_results: Vec<Chunk> = tree_results.into_iter().map(|c| c.chunk.clone()).collect();

        if buffered.is_empty() {
            return tree_results;
        }

        // Rank the union the way the buffer scan ranks, so the two orderings
        // are commensurate under normalization.
        let mut combined: Vec<Chunk> = tree_results;
        combined.extend(buffered);
        combined.sort_by(|a, b| {
            dot(query, &b.embedding).total_cmp(&dot(query, &a.embedding))
        });
        combined.truncate(k);
        combined
    }
}

// ---------------------------------------------------------------------------
// Tree construction
// ---------------------------------------------------------------------------

fn build(mut chunks: Vec<Chunk>, dim: usize) -> Option<Box<Node>> {
    if chunks.is_empty() {
        return None;
    }

    let axis = find_split_axis(&chunks, dim);
    let mid = chunks.len() / 2;
    quickselect(&mut chunks, mid, axis);

    let right = chunks.split_off(mid + 1);
    let median = chunks.pop().expect("median exists after split");

    Some(Box::new(Node {
        chunk: median,
        axis,
        left: build(chunks, dim),
        right: build(right, dim),
        deleted: false,
    }))
}

/// Axis with the maximum variance over the slice.
fn find_split_axis(chunks: &[Chunk], dim: usize) -> usize {
    if chunks.len() <= 1 || dim == 0 {
        return 0;
    }

    let n = chunks.len() as f32;
    let mut means = vec![0.0f32; dim];
    for chunk in chunks {
        for (i, v) in chunk.embedding.iter().enumerate() {
            means[i] += v;
        }
    }
    for m in &mut means {
        *m /= n;
    }

    let mut variances = vec![0.0f32; dim];
    for chunk in chunks {
        for (i, v) in chunk.embedding.iter().enumerate() {
            let d = v - means[i];
            variances[i] += d * d;
        }
    }

    let mut max_axis = 0;
    for i in 1..dim {
        if variances[i] > variances[max_axis] {
            max_axis = i;
        }
    }
    max_axis
}

/// Place the k-th element along `axis` at position k (Lomuto partition with a
/// random pivot); short slices are sorted outright.
fn quickselect(arr: &mut [Chunk], k: usize, axis: usize) {
    if arr.len() <= SORT_CUTOFF {
        arr.sort_by(|a, b| a.embedding[axis].total_cmp(&b.embedding[axis]));
        return;
    }

    let mut rng = rand::thread_rng();
    let mut left = 0;
    let mut right = arr.len() - 1;
    while left < right {
        let pivot_idx = rng.gen_range(left..=right);
        let pivot_idx = partition(arr, left, right, pivot_idx, axis);
        match k.cmp(&pivot_idx) {
            Ordering::Equal => return,
            Ordering::Less => right = pivot_idx - 1,
            Ordering::Greater => left = pivot_idx + 1,
        }
    }
}

fn partition(arr: &mut [Chunk], left: usize, right: usize, pivot_idx: usize, axis: usize) -> usize {
    let pivot_val = arr[pivot_idx].embedding[axis];
    arr.swap(pivot_idx, right);
    let mut store = left;
    for i in left..right {
        if arr[i].embedding[axis] < pivot_val {
            arr.swap(i, store);
            store += 1;
        }
    }
    arr.swap(store, right);
    store
}

// ---------------------------------------------------------------------------
// Traversals
// ---------------------------------------------------------------------------

/// Returns `Some(newly_marked)` when the id was found in the tree.
fn mark_deleted(node: Option<&mut Node>, id: Uuid) -> Option<bool> {
    let node = node?;
    if node.chunk.id == id {
        let newly = !node.deleted;
        node.deleted = true;
        return Some(newly);
    }
    mark_deleted(node.left.as_deref_mut(), id)
        .or_else(|| mark_deleted(node.right.as_deref_mut(), id))
}

fn collect_live(node: Option<&Node>, tombstones: &HashSet<Uuid>, out: &mut Vec<Chunk>) {
    let Some(node) = node else { return };
    if !node.deleted && !tombstones.contains(&node.chunk.id) {
        out.push(node.chunk.clone());
    }
    collect_live(node.left.as_deref(), tombstones, out);
    collect_live(node.right.as_deref(), tombstones, out);
}

fn search<'a>(
    node: &'a Node,
    query: &[f32],
    k: usize,
    filter: Option<&MetadataFilter>,
    tombstones: &HashSet<Uuid>,
    heap: &mut BinaryHeap<Candidate<'a>>,
) {
    if !node.deleted
        && !tombstones.contains(&node.chunk.id)
        && filter.is_none_or(|f| f.matches(&node.chunk))
    {
        let dist = sqdist(query, &node.chunk.embedding);
        if heap.len() < k {
            heap.push(Candidate { dist, chunk: &node.chunk });
        } else if heap.peek().is_some_and(|worst| dist < worst.dist) {
            heap.pop();
            heap.push(Candidate { dist, chunk: &node.chunk });
        }
    }

    let axis_val = query[node.axis];
    let node_val = node.chunk.embedding[node.axis];
    let (first, second) = if axis_val < node_val {
        (node.left.as_deref(), node.right.as_deref())
    } else {
        (node.right.as_deref(), node.left.as_deref())
    };

    if let Some(child) = first {
        search(child, query, k, filter, tombstones, heap);
    }

    // The far side can only matter if the splitting plane is closer than the
    // current k-th best distance.
    let kth_best = if heap.len() == k {
        heap.peek().map(|c| c.dist).unwrap_or(f32::INFINITY)
    } else {
        f32::INFINITY
    };
    if (axis_val - node_val) * (axis_val - node_val) < kth_best {
        if let Some(child) = second {
            search(child, query, k, filter, tombstones, heap);
        }
    }
}
