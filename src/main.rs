mod auth;
mod config;
mod db;
mod entities;
mod error;
mod films;
mod images;
mod models;
mod query;
mod rating;
mod reviews;
mod routes;
mod users;

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{config::Config, images::ImageStore};

pub struct AppState {
    pub config: Arc<Config>,
    pub db: DatabaseConnection,
    pub images: ImageStore,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,cinelog=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    let db = db::connect_and_migrate(&config.database_url).await?;
    let images = ImageStore::new(config.image_dir.clone());
    images.ensure_dir().await?;

    let state = Arc::new(AppState { config: config.clone(), db, images });

    let app = routes::router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, images = %config.image_dir.display(), "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
