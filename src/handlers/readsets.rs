use super::AppState;
use crate::{
    Error, Result,
    types::{Readset, SearchReadsetsRequest, SearchReadsetsResponse},
};
use axum::{
    Json,
    extract::{Path, State},
};

pub async fn get_readset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Readset>> {
    state.catalog.get_readset(&id).map(Json)
}

/// Readset search returns everything in one page and never issues tokens.
pub async fn search_readsets(
    State(state): State<AppState>,
    Json(request): Json<SearchReadsetsRequest>,
) -> Result<Json<SearchReadsetsResponse>> {
    if request.page_token.as_deref().is_some_and(|t| !t.is_empty()) {
        return Err(Error::InvalidPageToken(
            "readset search has no further pages".to_string(),
        ));
    }

    Ok(Json(SearchReadsetsResponse {
        readsets: state.catalog.search_readsets(&request.dataset_ids)?,
        next_page_token: None,
    }))
}
