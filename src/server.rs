use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::routes;
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health_check))
        // Libraries
        .route("/libraries", get(routes::libraries::get_all_libraries))
        .route("/libraries", post(routes::libraries::create_library))
        .route("/libraries/{library_id}", get(routes::libraries::get_library))
        .route(
            "/libraries/{library_id}",
            delete(routes::libraries::delete_library),
        )
        // Index lifecycle & search
        .route(
            "/libraries/{library_id}/index",
            post(routes::search::build_index),
        )
        .route(
            "/libraries/{library_id}/index",
            get(routes::search::get_index_status),
        )
        .route(
            "/libraries/{library_id}/search",
            post(routes::search::vector_search),
        )
        .route(
            "/libraries/{library_id}/text-search",
            post(routes::search::text_search),
        )
        // Documents
        .route(
            "/libraries/{library_id}/documents",
            get(routes::documents::get_all_documents),
        )
        .route(
            "/libraries/{library_id}/documents",
            post(routes::documents::create_document),
        )
        .route(
            "/libraries/{library_id}/documents/{document_id}",
            delete(routes::documents::delete_document),
        )
        // Chunks
        .route(
            "/libraries/{library_id}/documents/{document_id}/chunks",
            post(routes::chunks::create_chunk),
        )
        .route(
            "/libraries/{library_id}/documents/{document_id}/chunks",
            get(routes::chunks::get_document_chunks),
        )
        .route(
            "/libraries/{library_id}/documents/{document_id}/chunks/{chunk_id}",
            delete(routes::chunks::delete_chunk),
        )
        .route(
            "/libraries/{library_id}/batch-chunks",
            post(routes::chunks::create_batch_chunks),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
