mod datasets;
mod reads;
mod readsets;

pub use datasets::{get_dataset, list_datasets};
pub use reads::search_reads;
pub use readsets::{get_readset, search_readsets};

use crate::catalog::Catalog;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/datasets", get(list_datasets))
        .route("/datasets/{id}", get(get_dataset))
        .route("/readsets/search", post(search_readsets))
        .route("/readsets/{id}", get(get_readset))
        .route("/reads/search", post(search_reads))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
