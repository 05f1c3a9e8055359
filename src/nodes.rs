// =============================================================================
// ChainView Backend - Nodes API
// =============================================================================
// Endpoints for supply chain locations (factories, warehouses, stores)
// =============================================================================

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::Node;
use crate::error::ApiError;
use crate::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub capacity: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResponse {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub capacity: Option<i64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Node> for NodeResponse {
    fn from(n: Node) -> Self {
        Self {
            id: n.id,
            name: n.name,
            node_type: n.node_type,
            latitude: n.latitude,
            longitude: n.longitude,
            capacity: n.capacity,
            status: n.status,
            created_at: n.created_at,
            updated_at: n.updated_at,
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// List all nodes.
pub async fn get_nodes(State(state): State<AppState>) -> Result<Json<Vec<NodeResponse>>, ApiError> {
    let nodes = state.db.get_all_nodes().await?;
    Ok(Json(nodes.into_iter().map(Into::into).collect()))
}

/// Get a single node by ID.
pub async fn get_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<NodeResponse>, ApiError> {
    let node = state.db.find_node_by_id(&id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(node.into()))
}

/// List nodes of a given type.
pub async fn get_nodes_by_type(
    State(state): State<AppState>,
    Path(node_type): Path<String>,
) -> Result<Json<Vec<NodeResponse>>, ApiError> {
    let nodes = state.db.get_nodes_by_type(&node_type).await?;
    Ok(Json(nodes.into_iter().map(Into::into).collect()))
}

/// List nodes with a given status.
pub async fn get_nodes_by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
) -> Result<Json<Vec<NodeResponse>>, ApiError> {
    let nodes = state.db.get_nodes_by_status(&status).await?;
    Ok(Json(nodes.into_iter().map(Into::into).collect()))
}

/// Create a node. The id is assigned here, never taken from the request.
pub async fn create_node(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<NodeRequest>,
) -> Result<Json<NodeResponse>, ApiError> {
    auth.require_any(&["USER", "ADMIN"])?;

    let now = Utc::now();
    let node = Node {
        id: uuid::Uuid::new_v4().to_string(),
        name: req.name,
        node_type: req.node_type,
        latitude: req.latitude,
        longitude: req.longitude,
        capacity: req.capacity,
        status: req.status.unwrap_or_else(|| "active".to_string()),
        created_at: now,
        updated_at: now,
    };
    state.db.insert_node(&node).await?;

    Ok(Json(node.into()))
}

/// Overwrite a node's mutable fields.
pub async fn update_node(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<NodeRequest>,
) -> Result<Json<NodeResponse>, ApiError> {
    auth.require_any(&["USER", "ADMIN"])?;

    let existing = state.db.find_node_by_id(&id).await?.ok_or(ApiError::NotFound)?;

    let node = Node {
        id: existing.id,
        name: req.name,
        node_type: req.node_type,
        latitude: req.latitude,
        longitude: req.longitude,
        capacity: req.capacity,
        status: req.status.unwrap_or(existing.status),
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };
    state.db.update_node(&node).await?;

    Ok(Json(node.into()))
}

/// Delete a node.
pub async fn delete_node(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    auth.require_any(&["USER", "ADMIN"])?;

    if state.db.delete_node(&id).await? == 0 {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::OK)
}

// =============================================================================
// Tests
// =============================================================================
