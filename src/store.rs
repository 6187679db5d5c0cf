//! In-memory store for libraries, documents, and chunks.
//!
//! Every library owns an optional index handle, and every mutation runs
//! under that library's async mutex, so mutations are totally ordered per
//! library and index bookkeeping can never interleave with a competing
//! writer. Index work itself is synchronous and holds no state across await
//! points.
//!
//! Index errors during a mutation are contained: the store logs them, drops
//! the index (it can be rebuilt), and lets the caller's operation succeed.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::index::{Algorithm, IndexParams, MetadataFilter, VectorIndex};
use crate::models::{
    Chunk, ChunkCreate, Document, DocumentCreate, DocumentSummary, Library, LibraryCreate,
    LibraryDetail, LibrarySummary,
};

/// How a mutation left the library's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexEffect {
    /// No index was attached.
    Untouched,
    /// The index absorbed the change incrementally.
    Patched,
    /// Patched, but the change ratio now calls for a rebuild.
    NeedsRebuild,
    /// An index failure forced the index to be dropped.
    Invalidated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// A fresh index was constructed.
    Built,
    /// An existing index was rebuilt from the live chunk set.
    Rebuilt,
    /// The existing index was already in sync; pending changes were flushed.
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    None,
    Current,
    Modified,
    NeedsRebuild,
}

#[derive(Debug, Serialize)]
pub struct IndexStats {
    pub chunk_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffered_chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_chunks: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct IndexStatusReport {
    pub status: IndexState,
    pub algorithm: Option<Algorithm>,
    pub stats: IndexStats,
}

pub struct VectorStore {
    /// The mutex doubles as the per-library mutation serializer; it is
    /// created with the library and dropped with it.
    libraries: DashMap<Uuid, Arc<Mutex<Library>>>,
    index_params: IndexParams,
}

impl VectorStore {
    pub fn new(index_params: IndexParams) -> Self {
        Self {
            libraries: DashMap::new(),
            index_params,
        }
    }

    fn library(&self, library_id: Uuid) -> AppResult<Arc<Mutex<Library>>> {
        self.libraries
            .get(&library_id)
            .map(|entry| entry.value().clone())
            .ok_or(AppError::LibraryNotFound(library_id))
    }

    // -----------------------------------------------------------------------
    // Libraries
    // -----------------------------------------------------------------------

    pub async fn create_library(&self, req: LibraryCreate) -> LibraryDetail {
        let library = Library::new(req.name, req.metadata);
        let detail = LibraryDetail::from(&library);
        self.libraries
            .insert(library.id, Arc::new(Mutex::new(library)));
        detail
    }

    pub async fn get_library(&self, library_id: Uuid) -> AppResult<LibrarySummary> {
        let cell = self.library(library_id)?;
        let lib = cell.lock().await;
        Ok(LibrarySummary::from(&*lib))
    }

    pub async fn get_all_libraries(&self) -> Vec<LibrarySummary> {
        let cells: Vec<Arc<Mutex<Library>>> = self
            .libraries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let mut summaries = Vec::with_capacity(cells.len());
        for cell in cells {
            let lib = cell.lock().await;
            summaries.push(LibrarySummary::from(&*lib));
        }
        summaries
    }

    /// Drop the library, its documents and chunks, its serializer, and any
    /// attached index.
    pub async fn delete_library(&self, library_id: Uuid) -> AppResult<()> {
        self.libraries
            .remove(&library_id)
            .map(|_| ())
            .ok_or(AppError::LibraryNotFound(library_id))
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    pub async fn add_document(&self, library_id: Uuid, req: DocumentCreate) -> AppResult<Document> {
        let cell = self.library(library_id)?;
        let mut lib = cell.lock().await;
        let document = Document::new(req.metadata);
        lib.documents.push(document.clone());
        Ok(document)
    }

    pub async fn get_all_documents(&self, library_id: Uuid) -> AppResult<Vec<DocumentSummary>> {
        let cell = self.library(library_id)?;
        let lib = cell.lock().await;
        Ok(lib.documents.iter().map(DocumentSummary::from).collect())
    }

    /// Delete a document and cascade through its chunks: each one is removed
    /// from an update-capable index, and any index failure invalidates the
    /// index instead of failing the delete.
    pub async fn delete_document(&self, library_id: Uuid, document_id: Uuid) -> AppResult<IndexEffect> {
        let cell = self.library(library_id)?;
        let mut lib = cell.lock().await;

        let pos = lib
            .documents
            .iter()
            .position(|d| d.id == document_id)
            .ok_or(AppError::DocumentNotFound(document_id))?;

        let had_index = lib.index.is_some();
        let chunk_ids: Vec<Uuid> = lib.documents[pos].chunks.iter().map(|c| c.id).collect();

        // Take the index out while patching; it only goes back if every
        // removal succeeded. A non-updateable handle is simply cleared.
        if let Some(mut index) = lib.index.take() {
            if index.is_updateable() {
                let mut failed = false;
                for chunk_id in chunk_ids {
                    if let Err(e) = index.remove(chunk_id) {
                        error!(%chunk_id, error = %e, "failed to remove chunk from index, dropping index");
                        failed = true;
                        break;
                    }
                }
                if !failed {
                    lib.index = Some(index);
                }
            }
        }

        lib.documents.remove(pos);
        Ok(index_effect(&lib, had_index))
    }

    // -----------------------------------------------------------------------
    // Chunks
    // -----------------------------------------------------------------------

    pub async fn add_chunk(
        &self,
        library_id: Uuid,
        document_id: Uuid,
        req: ChunkCreate,
    ) -> AppResult<Chunk> {
        let cell = self.library(library_id)?;
        let mut lib = cell.lock().await;

        let doc_pos = lib
            .documents
            .iter()
            .position(|d| d.id == document_id)
            .ok_or(AppError::DocumentNotFound(document_id))?;

        if req.embedding.is_empty() {
            return Err(AppError::BadRequest("Embedding must not be empty".into()));
        }
        if req.embedding.iter().any(|v| !v.is_finite()) {
            return Err(AppError::BadRequest(
                "Embedding values must be finite".into(),
            ));
        }
        if let Some(expected) = lib.dimension() {
            if req.embedding.len() != expected {
                return Err(AppError::DimensionMismatch {
                    expected,
                    got: req.embedding.len(),
                });
            }
        }

        let chunk = Chunk::new(req.text, req.embedding, req.metadata);
        lib.documents[doc_pos].chunks.push(chunk.clone());

        if let Some(mut index) = lib.index.take() {
            if index.is_updateable() {
                match index.add(chunk.clone()) {
                    Ok(()) => lib.index = Some(index),
                    Err(e) => {
                        error!(chunk_id = %chunk.id, error = %e, "failed to add chunk to index, dropping index");
                    }
                }
            }
        }

        Ok(chunk)
    }

    pub async fn get_document_chunks(
        &self,
        library_id: Uuid,
        document_id: Uuid,
    ) -> AppResult<Vec<Chunk>> {
        let cell = self.library(library_id)?;
        let lib = cell.lock().await;
        let doc = lib
            .documents
            .iter()
            .find(|d| d.id == document_id)
            .ok_or(AppError::DocumentNotFound(document_id))?;
        Ok(doc.chunks.clone())
    }

    pub async fn delete_chunk(
        &self,
        library_id: Uuid,
        document_id: Uuid,
        chunk_id: Uuid,
    ) -> AppResult<IndexEffect> {
        let cell = self.library(library_id)?;
        let mut lib = cell.lock().await;

        let doc_pos = lib
            .documents
            .iter()
            .position(|d| d.id == document_id)
            .ok_or(AppError::DocumentNotFound(document_id))?;
        if !lib.documents[doc_pos].chunks.iter().any(|c| c.id == chunk_id) {
            return Err(AppError::ChunkNotFound(chunk_id));
        }

        let had_index = lib.index.is_some();
        if let Some(mut index) = lib.index.take() {
            if index.is_updateable() {
                match index.remove(chunk_id) {
                    Ok(()) => lib.index = Some(index),
                    Err(e) => {
                        error!(%chunk_id, error = %e, "failed to remove chunk from index, dropping index");
                    }
                }
            }
        }

        let doc = &mut lib.documents[doc_pos];
        let before = doc.chunks.len();
        doc.chunks.retain(|c| c.id != chunk_id);
        if doc.chunks.len() == before {
            return Err(AppError::ChunkNotFound(chunk_id));
        }

        Ok(index_effect(&lib, had_index))
    }

    // -----------------------------------------------------------------------
    // Index lifecycle
    // -----------------------------------------------------------------------

    /// Build or refresh the library's index.
    ///
    /// An update-capable index of the same algorithm is reused unless
    /// `force` is set: it is either rebuilt from the live chunk set (when
    /// the change ratio demands it) or merely acknowledged. Anything else
    /// gets a fresh build.
    pub async fn build_index(
        &self,
        library_id: Uuid,
        algorithm: Algorithm,
        force: bool,
    ) -> AppResult<BuildOutcome> {
        let cell = self.library(library_id)?;
        let mut lib = cell.lock().await;

        let reusable = matches!(
            &lib.index,
            Some(index) if index.is_updateable() && index.algorithm() == algorithm
        );

        if reusable && !force {
            let needs_rebuild = lib
                .index
                .as_ref()
                .is_some_and(|index| index.check_rebuild_needed());
            if needs_rebuild {
                info!(%library_id, %algorithm, "change ratio exceeded, performing full index rebuild");
                let chunks = lib.all_chunks();
                if let Some(index) = lib.index.as_mut() {
                    index.rebuild_if_needed(Some(chunks));
                }
                return Ok(BuildOutcome::Rebuilt);
            }
            if let Some(index) = lib.index.as_mut() {
                index.clear_pending_changes();
            }
            return Ok(BuildOutcome::Incremental);
        }

        let chunks = lib.all_chunks();
        lib.index = Some(VectorIndex::create(chunks, algorithm, &self.index_params));
        Ok(BuildOutcome::Built)
    }

    pub async fn get_index_status(&self, library_id: Uuid) -> AppResult<IndexStatusReport> {
        let cell = self.library(library_id)?;
        let lib = cell.lock().await;
        let chunk_count = lib.chunk_count();

        let report = match &lib.index {
            None => IndexStatusReport {
                status: IndexState::None,
                algorithm: None,
                stats: IndexStats {
                    chunk_count,
                    buffered_chunks: None,
                    deleted_chunks: None,
                },
            },
            Some(index) => {
                let status = if index.check_rebuild_needed() {
                    IndexState::NeedsRebuild
                } else if index.pending_changes() {
                    IndexState::Modified
                } else {
                    IndexState::Current
                };
                IndexStatusReport {
                    status,
                    algorithm: Some(index.algorithm()),
                    stats: IndexStats {
                        chunk_count,
                        buffered_chunks: index.buffered_chunks(),
                        deleted_chunks: index.deleted_chunks(),
                    },
                }
            }
        };
        Ok(report)
    }

    /// Fail (or, with `rebuild_if_needed`, repair) a library whose index is
    /// missing or stale, without running a query. The text-search flow calls
    /// this before paying for an embedding.
    pub async fn ensure_search_ready(
        &self,
        library_id: Uuid,
        rebuild_if_needed: bool,
    ) -> AppResult<()> {
        let cell = self.library(library_id)?;
        let mut lib = cell.lock().await;
        ensure_index_ready(&mut lib, rebuild_if_needed, &self.index_params)
    }

    /// k-NN over the library's index.
    pub async fn search(
        &self,
        library_id: Uuid,
        query: &[f32],
        k: usize,
        rebuild_if_needed: bool,
        filter: Option<&MetadataFilter>,
    ) -> AppResult<Vec<Chunk>> {
        let cell = self.library(library_id)?;
        let mut lib = cell.lock().await;
        ensure_index_ready(&mut lib, rebuild_if_needed, &self.index_params)?;

        let index = lib.index.as_mut().ok_or(AppError::IndexMissing)?;
        if let Some(expected) = index.dim() {
            if query.len() != expected {
                return Err(AppError::DimensionMismatch {
                    expected,
                    got: query.len(),
                });
            }
        }
        Ok(index.query(query, k, filter))
    }
}

/// Reject a missing index; rebuild a stale one from the live chunk set when
/// the caller opted in, reject it otherwise.
fn ensure_index_ready(
    lib: &mut Library,
    rebuild_if_needed: bool,
    params: &IndexParams,
) -> AppResult<()> {
    let Some(index) = lib.index.as_ref() else {
        return Err(AppError::IndexMissing);
    };
    if !index.check_rebuild_needed() {
        return Ok(());
    }
    if !rebuild_if_needed {
        return Err(AppError::IndexRebuildNeeded);
    }
    let algorithm = index.algorithm();
    info!(library_id = %lib.id, %algorithm, "rebuilding stale index before search");
    let chunks = lib.all_chunks();
    lib.index = Some(VectorIndex::create(chunks, algorithm, params));
    Ok(())
}

/// Classify how a completed mutation left the index.
fn index_effect(lib: &Library, had_index: bool) -> IndexEffect {
    if !had_index {
        return IndexEffect::Untouched;
    }
    match &lib.index {
        None => IndexEffect::Invalidated,
        Some(index) if index.check_rebuild_needed() => IndexEffect::NeedsRebuild,
        Some(_) => IndexEffect::Patched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, DocumentMetadata, LibraryMetadata};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn store() -> VectorStore {
        VectorStore::new(IndexParams::default())
    }

    fn library_create(name: &str) -> LibraryCreate {
        LibraryCreate {
            name: name.into(),
            metadata: LibraryMetadata {
                description: format!("{name} description"),
            },
        }
    }

    fn document_create(title: &str) -> DocumentCreate {
        DocumentCreate {
            metadata: DocumentMetadata {
                title: title.into(),
                author: "tester".into(),
            },
        }
    }

    fn chunk_create(name: &str, embedding: Vec<f32>) -> ChunkCreate {
        ChunkCreate {
            text: format!("text {name}"),
            embedding,
            metadata: ChunkMetadata::named(name),
        }
    }

    async fn seeded_library(
        store: &VectorStore,
        n: usize,
        dim: usize,
        seed: u64,
    ) -> (Uuid, Uuid, Vec<Chunk>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let lib = store.create_library(library_create("lib")).await;
        let doc = store.add_document(lib.id, document_create("doc")).await.unwrap();
        let mut chunks = Vec::new();
        for i in 0..n {
            let embedding: Vec<f32> = (0..dim).map(|_| rng.gen_range(0.0..1.0)).collect();
            let chunk = store
                .add_chunk(lib.id, doc.id, chunk_create(&format!("c{i}"), embedding))
                .await
                .unwrap();
            chunks.push(chunk);
        }
        (lib.id, doc.id, chunks)
    }

    #[tokio::test]
    async fn library_crud_round_trip() {
        let store = store();
        let created = store.create_library(library_create("alpha")).await;
        let fetched = store.get_library(created.id).await.unwrap();
        assert_eq!(fetched.name, "alpha");
        assert_eq!(fetched.document_count, 0);

        assert_eq!(store.get_all_libraries().await.len(), 1);
        store.delete_library(created.id).await.unwrap();
        assert!(matches!(
            store.get_library(created.id).await,
            Err(AppError::LibraryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn missing_entities_are_reported() {
        let store = store();
        let ghost = Uuid::new_v4();
        assert!(matches!(
            store.add_document(ghost, document_create("d")).await,
            Err(AppError::LibraryNotFound(_))
        ));

        let lib = store.create_library(library_create("lib")).await;
        assert!(matches!(
            store
                .add_chunk(lib.id, ghost, chunk_create("c", vec![0.1]))
                .await,
            Err(AppError::DocumentNotFound(_))
        ));
        let doc = store.add_document(lib.id, document_create("d")).await.unwrap();
        assert!(matches!(
            store.delete_chunk(lib.id, doc.id, ghost).await,
            Err(AppError::ChunkNotFound(_))
        ));
    }

    #[tokio::test]
    async fn chunk_validation_rules() {
        let store = store();
        let lib = store.create_library(library_create("lib")).await;
        let doc = store.add_document(lib.id, document_create("d")).await.unwrap();

        assert!(matches!(
            store.add_chunk(lib.id, doc.id, chunk_create("bad", vec![])).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            store
                .add_chunk(lib.id, doc.id, chunk_create("bad", vec![f32::NAN, 1.0]))
                .await,
            Err(AppError::BadRequest(_))
        ));

        store
            .add_chunk(lib.id, doc.id, chunk_create("ok", vec![0.1, 0.2, 0.3]))
            .await
            .unwrap();
        assert!(matches!(
            store
                .add_chunk(lib.id, doc.id, chunk_create("short", vec![0.1]))
                .await,
            Err(AppError::DimensionMismatch { expected: 3, got: 1 })
        ));
    }

    #[tokio::test]
    async fn build_and_search_each_algorithm() {
        let store = store();
        let (lib_id, _, chunks) = seeded_library(&store, 10, 4, 7).await;
        let target = &chunks[2];
        let query: Vec<f32> = target.embedding.iter().map(|x| x * 0.95).collect();

        for algorithm in [Algorithm::Linear, Algorithm::KdTree, Algorithm::Lsh] {
            let outcome = store.build_index(lib_id, algorithm, true).await.unwrap();
            assert_eq!(outcome, BuildOutcome::Built);

            let results = store.search(lib_id, &query, 3, false, None).await.unwrap();
            assert!(!results.is_empty());
            assert!(results.len() <= 3);
            let top3: Vec<Uuid> = results.iter().map(|c| c.id).collect();
            assert!(top3.contains(&target.id), "{algorithm} missed the target");
        }
    }

    #[tokio::test]
    async fn search_requires_an_index() {
        let store = store();
        let (lib_id, _, _) = seeded_library(&store, 3, 4, 9).await;
        assert!(matches!(
            store.search(lib_id, &[0.0; 4], 3, false, None).await,
            Err(AppError::IndexMissing)
        ));
    }

    #[tokio::test]
    async fn search_rejects_dimension_mismatch() {
        let store = store();
        let (lib_id, _, _) = seeded_library(&store, 5, 4, 11).await;
        store.build_index(lib_id, Algorithm::Linear, false).await.unwrap();
        assert!(matches!(
            store.search(lib_id, &[0.0; 7], 3, false, None).await,
            Err(AppError::DimensionMismatch { expected: 4, got: 7 })
        ));
    }

    #[tokio::test]
    async fn stale_index_is_rejected_or_rebuilt() {
        let store = store();
        let (lib_id, doc_id, _) = seeded_library(&store, 20, 4, 13).await;
        store.build_index(lib_id, Algorithm::KdTree, false).await.unwrap();

        // Enough inserts to push the change ratio past the threshold.
        let mut rng = StdRng::seed_from_u64(14);
        for i in 0..5 {
            let embedding: Vec<f32> = (0..4).map(|_| rng.gen_range(0.0..1.0)).collect();
            store
                .add_chunk(lib_id, doc_id, chunk_create(&format!("n{i}"), embedding))
                .await
                .unwrap();
        }
        let status = store.get_index_status(lib_id).await.unwrap();
        assert_eq!(status.status, IndexState::NeedsRebuild);

        assert!(matches!(
            store.search(lib_id, &[0.5; 4], 3, false, None).await,
            Err(AppError::IndexRebuildNeeded)
        ));

        let results = store.search(lib_id, &[0.5; 4], 3, true, None).await.unwrap();
        assert_eq!(results.len(), 3);
        let status = store.get_index_status(lib_id).await.unwrap();
        assert_eq!(status.status, IndexState::Current);
        assert_eq!(status.stats.chunk_count, 25);
    }

    #[tokio::test]
    async fn index_status_lifecycle() {
        let store = store();
        let (lib_id, doc_id, chunks) = seeded_library(&store, 30, 4, 17).await;

        let status = store.get_index_status(lib_id).await.unwrap();
        assert_eq!(status.status, IndexState::None);
        assert!(status.algorithm.is_none());
        assert_eq!(status.stats.chunk_count, 30);

        store.build_index(lib_id, Algorithm::KdTree, false).await.unwrap();
        let status = store.get_index_status(lib_id).await.unwrap();
        assert_eq!(status.status, IndexState::Current);
        assert_eq!(status.algorithm, Some(Algorithm::KdTree));
        assert_eq!(status.stats.buffered_chunks, Some(0));
        assert_eq!(status.stats.deleted_chunks, Some(0));

        // One deletion marks the index modified but stays under the ratio.
        let effect = store.delete_chunk(lib_id, doc_id, chunks[0].id).await.unwrap();
        assert_eq!(effect, IndexEffect::Patched);
        let status = store.get_index_status(lib_id).await.unwrap();
        assert_eq!(status.status, IndexState::Modified);
        assert_eq!(status.stats.deleted_chunks, Some(1));
        assert_eq!(status.stats.chunk_count, 29);
    }

    #[tokio::test]
    async fn incremental_build_acknowledges_pending_changes() {
        let store = store();
        let (lib_id, doc_id, chunks) = seeded_library(&store, 30, 4, 19).await;
        store.build_index(lib_id, Algorithm::KdTree, false).await.unwrap();
        store.delete_chunk(lib_id, doc_id, chunks[3].id).await.unwrap();

        let outcome = store.build_index(lib_id, Algorithm::KdTree, false).await.unwrap();
        assert_eq!(outcome, BuildOutcome::Incremental);
        let status = store.get_index_status(lib_id).await.unwrap();
        assert_eq!(status.status, IndexState::Current);
    }

    #[tokio::test]
    async fn stale_index_build_performs_full_rebuild() {
        let store = store();
        let (lib_id, doc_id, _) = seeded_library(&store, 20, 4, 23).await;
        store.build_index(lib_id, Algorithm::KdTree, false).await.unwrap();

        let mut rng = StdRng::seed_from_u64(24);
        for i in 0..5 {
            let embedding: Vec<f32> = (0..4).map(|_| rng.gen_range(0.0..1.0)).collect();
            store
                .add_chunk(lib_id, doc_id, chunk_create(&format!("n{i}"), embedding))
                .await
                .unwrap();
        }

        let outcome = store.build_index(lib_id, Algorithm::KdTree, false).await.unwrap();
        assert_eq!(outcome, BuildOutcome::Rebuilt);
        let status = store.get_index_status(lib_id).await.unwrap();
        assert_eq!(status.status, IndexState::Current);
        assert_eq!(status.stats.buffered_chunks, Some(0));
    }

    #[tokio::test]
    async fn switching_algorithms_builds_fresh() {
        let store = store();
        let (lib_id, _, _) = seeded_library(&store, 10, 4, 27).await;
        store.build_index(lib_id, Algorithm::Linear, false).await.unwrap();
        let outcome = store.build_index(lib_id, Algorithm::Lsh, false).await.unwrap();
        assert_eq!(outcome, BuildOutcome::Built);
        let status = store.get_index_status(lib_id).await.unwrap();
        assert_eq!(status.algorithm, Some(Algorithm::Lsh));
    }

    #[tokio::test]
    async fn document_delete_cascades_through_the_index() {
        let store = store();
        let lib = store.create_library(library_create("lib")).await;
        let keep = store.add_document(lib.id, document_create("keep")).await.unwrap();
        let doomed = store.add_document(lib.id, document_create("doomed")).await.unwrap();

        let mut rng = StdRng::seed_from_u64(31);
        let mut kept_chunk = None;
        for i in 0..6 {
            let embedding: Vec<f32> = (0..4).map(|_| rng.gen_range(0.0..1.0)).collect();
            let doc_id = if i % 2 == 0 { keep.id } else { doomed.id };
            let chunk = store
                .add_chunk(lib.id, doc_id, chunk_create(&format!("c{i}"), embedding))
                .await
                .unwrap();
            if i == 0 {
                kept_chunk = Some(chunk);
            }
        }
        store.build_index(lib.id, Algorithm::Linear, false).await.unwrap();

        let effect = store.delete_document(lib.id, doomed.id).await.unwrap();
        assert_eq!(effect, IndexEffect::Patched);

        let kept_chunk = kept_chunk.unwrap();
        let results = store
            .search(lib.id, &kept_chunk.embedding, 10, false, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, kept_chunk.id);
    }

    #[tokio::test]
    async fn chunk_add_after_build_is_visible_in_search() {
        let store = store();
        let (lib_id, doc_id, _) = seeded_library(&store, 50, 4, 37).await;
        store.build_index(lib_id, Algorithm::KdTree, false).await.unwrap();

        let chunk = store
            .add_chunk(lib_id, doc_id, chunk_create("late", vec![5.0, 5.0, 5.0, 5.0]))
            .await
            .unwrap();

        // Visible through the insert buffer without any rebuild.
        let results = store
            .search(lib_id, &chunk.embedding, 1, false, None)
            .await
            .unwrap();
        assert_eq!(results[0].id, chunk.id);
    }

    #[tokio::test]
    async fn filtered_search_respects_the_predicate() {
        let store = store();
        let lib = store.create_library(library_create("lib")).await;
        let doc = store.add_document(lib.id, document_create("doc")).await.unwrap();

        let mut rng = StdRng::seed_from_u64(41);
        for i in 0..10 {
            let name = if i < 5 { format!("report_{i}") } else { format!("memo_{i}") };
            let embedding: Vec<f32> = (0..4).map(|_| rng.gen_range(0.0..1.0)).collect();
            store
                .add_chunk(lib.id, doc.id, chunk_create(&name, embedding))
                .await
                .unwrap();
        }
        store.build_index(lib.id, Algorithm::Linear, false).await.unwrap();

        let filter = MetadataFilter::new([(
            "name_contains".to_string(),
            serde_json::Value::String("report".into()),
        )]);
        let results = store
            .search(lib.id, &[0.5; 4], 10, false, Some(&filter))
            .await
            .unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|c| c.metadata.name.starts_with("report")));
    }
}
