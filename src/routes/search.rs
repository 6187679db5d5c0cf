use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::index::Algorithm;
use crate::models::{Chunk, ChunkSummary};
use crate::state::AppState;
use crate::store::{BuildOutcome, IndexStatusReport};

#[derive(Debug, Deserialize)]
pub struct BuildIndexParams {
    #[serde(default = "default_algorithm")]
    algorithm: String,
    #[serde(default)]
    force: bool,
}

fn default_algorithm() -> String {
    "linear".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default = "default_k")]
    k: usize,
    #[serde(default)]
    rebuild_if_needed: bool,
}

fn default_k() -> usize {
    5
}

pub async fn build_index(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
    Query(params): Query<BuildIndexParams>,
) -> AppResult<Json<serde_json::Value>> {
    let algorithm: Algorithm = params
        .algorithm
        .parse()
        .map_err(AppError::UnknownAlgorithm)?;

    let outcome = state
        .store
        .build_index(library_id, algorithm, params.force)
        .await?;

    let message = match outcome {
        BuildOutcome::Built => format!("{algorithm} index built successfully"),
        BuildOutcome::Rebuilt => format!("{algorithm} index rebuilt successfully"),
        BuildOutcome::Incremental => format!("{algorithm} index updated incrementally"),
    };
    Ok(Json(serde_json::json!({ "message": message })))
}

pub async fn get_index_status(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
) -> AppResult<Json<IndexStatusReport>> {
    let status = state.store.get_index_status(library_id).await?;
    Ok(Json(status))
}

/// k-NN over a raw query vector; the body is a JSON array of floats.
pub async fn vector_search(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
    Query(params): Query<SearchParams>,
    Json(query): Json<Vec<f32>>,
) -> AppResult<Json<Vec<Chunk>>> {
    if query.is_empty() {
        return Err(AppError::BadRequest(
            "Query vector must not be empty".to_string(),
        ));
    }
    if query.iter().any(|v| !v.is_finite()) {
        return Err(AppError::BadRequest(
            "Query vector values must be finite".to_string(),
        ));
    }

    let results = state
        .store
        .search(library_id, &query, params.k, params.rebuild_if_needed, None)
        .await?;
    Ok(Json(results))
}

/// Embed a text query through the provider, then run the k-NN. The index
/// readiness check runs first so a stale index is rejected before paying for
/// an embedding.
pub async fn text_search(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
    Query(params): Query<SearchParams>,
    Json(body): Json<serde_json::Value>,
) -> AppResult<Json<serde_json::Value>> {
    let query_text = body
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    if query_text.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Request body must contain a non-empty 'text' field".to_string(),
        ));
    }

    state
        .store
        .ensure_search_ready(library_id, params.rebuild_if_needed)
        .await?;

    let embeddings = state.embedder.embed(std::slice::from_ref(&query_text)).await?;
    let query = embeddings
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Provider("embed response was empty".to_string()))?;

    let results = state
        .store
        .search(library_id, &query, params.k, params.rebuild_if_needed, None)
        .await?;
    let summaries: Vec<ChunkSummary> = results.iter().map(ChunkSummary::from).collect();

    Ok(Json(serde_json::json!({
        "query_text": query_text,
        "results_count": summaries.len(),
        "results": summaries,
    })))
}
