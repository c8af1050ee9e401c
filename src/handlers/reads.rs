use super::AppState;
use crate::{
    Error, Result,
    query::Cancellation,
    types::{SearchReadsRequest, SearchReadsResponse},
};
use axum::{Json, extract::State};
use std::sync::Arc;

/// Runs the search on a blocking worker. If the client goes away the request
/// future is dropped, the guard fires, and the scan stops at its next check.
pub async fn search_reads(
    State(state): State<AppState>,
    Json(request): Json<SearchReadsRequest>,
) -> Result<Json<SearchReadsResponse>> {
    let cancel = Cancellation::new();
    let _guard = cancel.cancel_on_drop();
    let catalog = Arc::clone(&state.catalog);

    let response = tokio::task::spawn_blocking(move || catalog.search_reads(&request, &cancel))
        .await
        .map_err(|e| Error::Internal(format!("search task failed: {}", e)))??;

    Ok(Json(response))
}
