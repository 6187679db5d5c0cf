use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{BatchTextInput, Chunk, ChunkCreate, ChunkMetadata};
use crate::state::AppState;
use crate::store::IndexEffect;

pub async fn create_chunk(
    State(state): State<AppState>,
    Path((library_id, document_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ChunkCreate>,
) -> AppResult<(StatusCode, Json<Chunk>)> {
    let chunk = state.store.add_chunk(library_id, document_id, req).await?;
    Ok((StatusCode::CREATED, Json(chunk)))
}

pub async fn get_document_chunks(
    State(state): State<AppState>,
    Path((library_id, document_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Vec<Chunk>>> {
    let chunks = state
        .store
        .get_document_chunks(library_id, document_id)
        .await?;
    Ok(Json(chunks))
}

pub async fn delete_chunk(
    State(state): State<AppState>,
    Path((library_id, document_id, chunk_id)): Path<(Uuid, Uuid, Uuid)>,
) -> AppResult<Json<serde_json::Value>> {
    let effect = state
        .store
        .delete_chunk(library_id, document_id, chunk_id)
        .await?;

    let mut response = serde_json::json!({
        "status": "deleted",
        "message": format!("Chunk {chunk_id} has been deleted"),
    });
    index_effect_notes(&mut response, effect);
    Ok(Json(response))
}

/// Embed a batch of raw texts through the provider and attach the resulting
/// chunks to a document. Missing metadata entries get a positional name.
pub async fn create_batch_chunks(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
    Json(batch): Json<BatchTextInput>,
) -> AppResult<(StatusCode, Json<Vec<Chunk>>)> {
    // Resolve the library before paying for embeddings.
    state.store.get_library(library_id).await?;

    let embeddings = state.embedder.embed(&batch.texts).await?;

    let mut added = Vec::with_capacity(batch.texts.len());
    for (i, (text, embedding)) in batch.texts.iter().zip(embeddings).enumerate() {
        let metadata = batch
            .metadata
            .get(i)
            .cloned()
            .unwrap_or_else(|| ChunkMetadata::named(format!("chunk_{i}")));
        let chunk = state
            .store
            .add_chunk(
                library_id,
                batch.document_id,
                ChunkCreate {
                    text: text.clone(),
                    embedding,
                    metadata,
                },
            )
            .await?;
        added.push(chunk);
    }

    Ok((StatusCode::CREATED, Json(added)))
}

/// Attach the index-bookkeeping note the mutation earned: a warning when the
/// index was dropped or drifted past the rebuild ratio, an info when it was
/// patched in place.
pub fn index_effect_notes(response: &mut serde_json::Value, effect: IndexEffect) {
    let note = match effect {
        IndexEffect::Invalidated => Some((
            "warning",
            "The library index has been reset. You must rebuild the index before performing searches.",
        )),
        IndexEffect::NeedsRebuild => Some((
            "warning",
            "The index may need rebuilding due to significant changes. Searches will automatically rebuild if needed.",
        )),
        IndexEffect::Patched => Some((
            "info",
            "The index has been updated incrementally. You can perform searches without rebuilding.",
        )),
        IndexEffect::Untouched => None,
    };
    if let (Some((key, text)), Some(map)) = (note, response.as_object_mut()) {
        map.insert(key.to_string(), serde_json::Value::String(text.to_string()));
    }
}
