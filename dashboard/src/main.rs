use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::api::AuditApi;
use crate::state::AppState;

mod api;
mod charts;
mod config;
mod events;
mod explorer_config;
mod query;
mod routes;
mod state;
mod styles;
mod views;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shared::init_tracing!()?;
    let config = shared::load_explorer_config!()?;

    let settings = explorer_config::load(&config.settings_path).with_context(|| {
        format!(
            "failed to read explorer settings from {}",
            config.settings_path.display()
        )
    })?;
    let api = AuditApi::new(config.api_url.as_str(), config.api_token.clone());
    let state = Arc::new(AppState::new(api, settings));

    // Fragment routes: /fragments/*
    let fragment_routes = Router::new()
        .route("/explorer", get(views::explorer::explorer_fragment))
        .route("/explorer/range", get(views::explorer::range_fragment))
        .route("/explorer/search", get(views::explorer::search_fragment));

    let app = Router::new()
        .route("/", get(views::index))
        .route("/chart.json", get(routes::chart_json))
        .route("/download/{format}", get(routes::download))
        .route("/styles.css", get(views::styles))
        .nest("/fragments", fragment_routes)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
    info!("explorer listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
