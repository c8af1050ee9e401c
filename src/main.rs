use clap::Parser;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use readstore::{
    Catalog, Config,
    formats::BamSource,
    handlers::{AppState, create_router},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    for dataset in &config.datasets {
        tracing::info!("Dataset {}: {:?}", dataset.id, dataset.directory);
    }

    // Scan every dataset once; the catalog is read-only from here on
    let catalog = Catalog::build(&config.datasets, Arc::new(BamSource), config.page_size)?;

    let state = AppState {
        catalog: Arc::new(catalog),
    };

    let app = create_router(state);

    let app = if config.cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    };

    let addr = config.bind_address();
    tracing::info!("Starting readstore server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
