//! Domain entities and request/response DTOs.
//!
//! The hierarchy is library -> document -> chunk. A chunk carries its
//! embedding; every chunk in a library shares the same dimension. The
//! library's index handle lives on the entity but never leaves the process;
//! responses go through the summary/detail DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::index::VectorIndex;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub name: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Open-ended key/value fields, available to the metadata filter.
    #[serde(flatten, default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ChunkMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(text: String, embedding: Vec<f32>, metadata: ChunkMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            text,
            embedding,
            metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
}

impl Document {
    pub fn new(metadata: DocumentMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            metadata,
            chunks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryMetadata {
    pub description: String,
}

#[derive(Debug)]
pub struct Library {
    pub id: Uuid,
    pub name: String,
    pub metadata: LibraryMetadata,
    pub documents: Vec<Document>,
    /// Attached nearest-neighbor index; stays inside the process.
    pub index: Option<VectorIndex>,
}

impl Library {
    pub fn new(name: String, metadata: LibraryMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            metadata,
            documents: Vec::new(),
            index: None,
        }
    }

    /// Chunks across all documents, in document order. This is the live set
    /// an index is built from.
    pub fn all_chunks(&self) -> Vec<Chunk> {
        self.documents
            .iter()
            .flat_map(|d| d.chunks.iter().cloned())
            .collect()
    }

    pub fn chunk_count(&self) -> usize {
        self.documents.iter().map(|d| d.chunks.len()).sum()
    }

    /// Embedding dimension of the library, taken from the first stored chunk.
    pub fn dimension(&self) -> Option<usize> {
        self.documents
            .iter()
            .flat_map(|d| d.chunks.iter())
            .next()
            .map(|c| c.embedding.len())
    }
}

// ---------------------------------------------------------------------------
// Request DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LibraryCreate {
    pub name: String,
    pub metadata: LibraryMetadata,
}

#[derive(Debug, Deserialize)]
pub struct DocumentCreate {
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Deserialize)]
pub struct ChunkCreate {
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Batch of raw texts to embed via the provider and attach to a document.
#[derive(Debug, Deserialize)]
pub struct BatchTextInput {
    pub texts: Vec<String>,
    #[serde(default)]
    pub metadata: Vec<ChunkMetadata>,
    pub document_id: Uuid,
}

// ---------------------------------------------------------------------------
// Summary DTOs (no embedding payloads)
// ---------------------------------------------------------------------------

/// Full library payload for create/detail responses; the index handle is
/// process-internal and never serialized.
#[derive(Debug, Serialize)]
pub struct LibraryDetail {
    pub id: Uuid,
    pub name: String,
    pub metadata: LibraryMetadata,
    pub documents: Vec<Document>,
}

impl From<&Library> for LibraryDetail {
    fn from(lib: &Library) -> Self {
        Self {
            id: lib.id,
            name: lib.name.clone(),
            metadata: lib.metadata.clone(),
            documents: lib.documents.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LibrarySummary {
    pub id: Uuid,
    pub name: String,
    pub metadata: LibraryMetadata,
    pub document_count: usize,
}

impl From<&Library> for LibrarySummary {
    fn from(lib: &Library) -> Self {
        Self {
            id: lib.id,
            name: lib.name.clone(),
            metadata: lib.metadata.clone(),
            document_count: lib.documents.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub metadata: DocumentMetadata,
    pub chunk_count: usize,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            metadata: doc.metadata.clone(),
            chunk_count: doc.chunks.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChunkSummary {
    pub id: Uuid,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl From<&Chunk> for ChunkSummary {
    fn from(chunk: &Chunk) -> Self {
        Self {
            id: chunk.id,
            text: chunk.text.clone(),
            metadata: chunk.metadata.clone(),
        }
    }
}
