use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{LibraryCreate, LibraryDetail, LibrarySummary};
use crate::state::AppState;

pub async fn get_all_libraries(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<LibrarySummary>>> {
    Ok(Json(state.store.get_all_libraries().await))
}

pub async fn create_library(
    State(state): State<AppState>,
    Json(req): Json<LibraryCreate>,
) -> AppResult<(StatusCode, Json<LibraryDetail>)> {
    let library = state.store.create_library(req).await;
    tracing::info!(library_id = %library.id, name = %library.name, "library created");
    Ok((StatusCode::CREATED, Json(library)))
}

pub async fn get_library(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
) -> AppResult<Json<LibrarySummary>> {
    let summary = state.store.get_library(library_id).await?;
    Ok(Json(summary))
}

pub async fn delete_library(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    state.store.delete_library(library_id).await?;
    tracing::info!(%library_id, "library deleted");
    Ok(Json(serde_json::json!({
        "status": "deleted",
        "message": format!(
            "Library {library_id} and all its documents and chunks have been deleted"
        ),
    })))
}
