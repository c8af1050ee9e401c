use super::AppState;
use crate::{
    Result,
    types::{Dataset, ListDatasetsQuery, ListDatasetsResponse},
};
use axum::{
    Json,
    extract::{Path, Query, State},
};

pub async fn list_datasets(
    State(state): State<AppState>,
    Query(query): Query<ListDatasetsQuery>,
) -> Json<ListDatasetsResponse> {
    Json(ListDatasetsResponse {
        datasets: state.catalog.list_datasets(query.project_id),
        next_page_token: None,
    })
}

pub async fn get_dataset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Dataset>> {
    state.catalog.get_dataset(&id).map(Json)
}
