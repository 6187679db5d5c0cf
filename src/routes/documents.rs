use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Document, DocumentCreate, DocumentSummary};
use crate::routes::chunks::index_effect_notes;
use crate::state::AppState;

pub async fn get_all_documents(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
) -> AppResult<Json<Vec<DocumentSummary>>> {
    let documents = state.store.get_all_documents(library_id).await?;
    Ok(Json(documents))
}

pub async fn create_document(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
    Json(req): Json<DocumentCreate>,
) -> AppResult<(StatusCode, Json<Document>)> {
    let document = state.store.add_document(library_id, req).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path((library_id, document_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<serde_json::Value>> {
    let effect = state.store.delete_document(library_id, document_id).await?;

    let mut response = serde_json::json!({
        "status": "deleted",
        "message": format!("Document {document_id} and all its chunks have been deleted"),
    });
    index_effect_notes(&mut response, effect);
    Ok(Json(response))
}
