// =============================================================================
// ChainView Backend - API Server Entry Point
// =============================================================================
// Table of Contents:
// 1. Imports
// 2. Application State
// 3. Main Entry Point
// 4. Router Setup
// =============================================================================

mod auth;
mod config;
mod connections;
mod db;
mod error;
mod inventory;
mod nodes;
mod products;
mod shipments;

use axum::{
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;

// -----------------------------------------------------------------------------
// 2. Application State
// -----------------------------------------------------------------------------

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
}

// -----------------------------------------------------------------------------
// 3. Main Entry Point
// -----------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    let _ = dotenvy::dotenv();

    // Load configuration
    let config = Config::from_env()?;
    let bind_addr = config.bind_address.clone();

    // Ensure database directory exists for SQLite
    if config.database_url.starts_with("sqlite:") {
        let db_path = config.database_url.trim_start_matches("sqlite:");
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }
    }

    // Initialize database
    let db = Database::new(&config.database_url).await?;
    db.run_migrations().await?;

    // Create app state
    let state = AppState {
        config: Arc::new(config),
        db,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("ChainView API Server running on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

// -----------------------------------------------------------------------------
// 4. Router Setup
// -----------------------------------------------------------------------------

fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Nodes API
        .route("/api/nodes", get(nodes::get_nodes).post(nodes::create_node))
        .route(
            "/api/nodes/:id",
            get(nodes::get_node)
                .put(nodes::update_node)
                .delete(nodes::delete_node),
        )
        .route("/api/nodes/type/:type", get(nodes::get_nodes_by_type))
        .route("/api/nodes/status/:status", get(nodes::get_nodes_by_status))
        // Products API
        .route(
            "/api/products",
            get(products::get_products).post(products::create_product),
        )
        .route(
            "/api/products/:id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .route(
            "/api/products/status/:status",
            get(products::get_products_by_status),
        )
        .route("/api/products/sku/:sku", get(products::get_products_by_sku))
        // Connections API
        .route(
            "/api/connections",
            get(connections::get_connections).post(connections::create_connection),
        )
        .route(
            "/api/connections/:id",
            get(connections::get_connection)
                .put(connections::update_connection)
                .delete(connections::delete_connection),
        )
        .route(
            "/api/connections/source/:source_id",
            get(connections::get_connections_by_source),
        )
        .route(
            "/api/connections/target/:target_id",
            get(connections::get_connections_by_target),
        )
        .route(
            "/api/connections/nodes",
            get(connections::get_connections_by_nodes),
        )
        // Inventory API
        .route(
            "/api/inventory",
            get(inventory::get_inventory).post(inventory::create_or_update_inventory),
        )
        .route(
            "/api/inventory/:id",
            get(inventory::get_inventory_by_id).delete(inventory::delete_inventory),
        )
        .route(
            "/api/inventory/node/:node_id",
            get(inventory::get_inventory_by_node),
        )
        .route(
            "/api/inventory/product/:product_id",
            get(inventory::get_inventory_by_product),
        )
        .route("/api/inventory/low-stock", get(inventory::get_low_stock))
        // Shipments API
        .route(
            "/api/shipments",
            get(shipments::get_shipments).post(shipments::create_shipment),
        )
        .route(
            "/api/shipments/:id",
            get(shipments::get_shipment)
                .put(shipments::update_shipment)
                .delete(shipments::delete_shipment),
        )
        // PUT overwrites the status of shipment :id; GET lists by status value
        .route(
            "/api/shipments/status/:id",
            put(shipments::update_shipment_status).get(shipments::get_shipments_by_status),
        )
        .route(
            "/api/shipments/source/:source_id",
            get(shipments::get_shipments_by_source),
        )
        .route(
            "/api/shipments/destination/:destination_id",
            get(shipments::get_shipments_by_destination),
        )
        .route(
            "/api/shipments/date-range",
            get(shipments::get_shipments_by_date_range),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// -----------------------------------------------------------------------------
// Test Support
// -----------------------------------------------------------------------------

#[cfg(test)]
pub(crate) async fn test_state() -> AppState {
    AppState {
        config: Arc::new(Config {
            bind_address: "127.0.0.1:0".into(),
            database_url: "sqlite::memory:".into(),
            jwt_secret: "test-secret".into(),
        }),
        db: db::memory_db().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn router_builds_without_route_conflicts() {
        let state = test_state().await;
        let _app = create_router(state);
    }
}
