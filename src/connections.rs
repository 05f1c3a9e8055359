// =============================================================================
// ChainView Backend - Connections API
// =============================================================================
// Directed transport links between nodes. Duplicate edges between the same
// pair are allowed.
// =============================================================================

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::Connection;
use crate::error::ApiError;
use crate::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub source_id: String,
    pub target_id: String,
    pub transportation_type: Option<String>,
    pub distance: Option<f64>,
    pub travel_time: Option<i64>,
    pub cost_per_unit: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResponse {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub transportation_type: Option<String>,
    pub distance: Option<f64>,
    pub travel_time: Option<i64>,
    pub cost_per_unit: Option<f64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Connection> for ConnectionResponse {
    fn from(c: Connection) -> Self {
        Self {
            id: c.id,
            source_id: c.source_id,
            target_id: c.target_id,
            transportation_type: c.transportation_type,
            distance: c.distance,
            travel_time: c.travel_time,
            cost_per_unit: c.cost_per_unit,
            status: c.status,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePairQuery {
    pub source_id: String,
    pub target_id: String,
}

/// Both endpoints must resolve to existing nodes.
async fn check_endpoints(state: &AppState, source_id: &str, target_id: &str) -> Result<(), ApiError> {
    if state.db.find_node_by_id(source_id).await?.is_none() {
        return Err(ApiError::InvalidReference(format!(
            "Source node {} does not exist",
            source_id
        )));
    }
    if state.db.find_node_by_id(target_id).await?.is_none() {
        return Err(ApiError::InvalidReference(format!(
            "Target node {} does not exist",
            target_id
        )));
    }
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

/// List all connections.
pub async fn get_connections(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConnectionResponse>>, ApiError> {
    let connections = state.db.get_all_connections().await?;
    Ok(Json(connections.into_iter().map(Into::into).collect()))
}

/// Get a single connection by ID.
pub async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConnectionResponse>, ApiError> {
    let conn = state
        .db
        .find_connection_by_id(&id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(conn.into()))
}

/// List connections originating at a node.
pub async fn get_connections_by_source(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> Result<Json<Vec<ConnectionResponse>>, ApiError> {
    let connections = state.db.get_connections_by_source(&source_id).await?;
    Ok(Json(connections.into_iter().map(Into::into).collect()))
}

/// List connections terminating at a node.
pub async fn get_connections_by_target(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
) -> Result<Json<Vec<ConnectionResponse>>, ApiError> {
    let connections = state.db.get_connections_by_target(&target_id).await?;
    Ok(Json(connections.into_iter().map(Into::into).collect()))
}

/// List connections between a specific pair of nodes.
pub async fn get_connections_by_nodes(
    State(state): State<AppState>,
    Query(query): Query<NodePairQuery>,
) -> Result<Json<Vec<ConnectionResponse>>, ApiError> {
    let connections = state
        .db
        .get_connections_by_source_and_target(&query.source_id, &query.target_id)
        .await?;
    Ok(Json(connections.into_iter().map(Into::into).collect()))
}

/// Create a connection between two existing nodes.
pub async fn create_connection(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ConnectionRequest>,
) -> Result<Json<ConnectionResponse>, ApiError> {
    auth.require_any(&["USER", "ADMIN"])?;
    check_endpoints(&state, &req.source_id, &req.target_id).await?;

    let now = Utc::now();
    let conn = Connection {
        id: uuid::Uuid::new_v4().to_string(),
        source_id: req.source_id,
        target_id: req.target_id,
        transportation_type: req.transportation_type,
        distance: req.distance,
        travel_time: req.travel_time,
        cost_per_unit: req.cost_per_unit,
        status: req.status.unwrap_or_else(|| "active".to_string()),
        created_at: now,
        updated_at: now,
    };
    state.db.insert_connection(&conn).await?;

    Ok(Json(conn.into()))
}

/// Overwrite a connection's mutable fields.
pub async fn update_connection(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<ConnectionRequest>,
) -> Result<Json<ConnectionResponse>, ApiError> {
    auth.require_any(&["USER", "ADMIN"])?;

    let existing = state
        .db
        .find_connection_by_id(&id)
        .await?
        .ok_or(ApiError::NotFound)?;
    check_endpoints(&state, &req.source_id, &req.target_id).await?;

    let conn = Connection {
        id: existing.id,
        source_id: req.source_id,
        target_id: req.target_id,
        transportation_type: req.transportation_type,
        distance: req.distance,
        travel_time: req.travel_time,
        cost_per_unit: req.cost_per_unit,
        status: req.status.unwrap_or(existing.status),
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };
    state.db.update_connection(&conn).await?;

    Ok(Json(conn.into()))
}

/// Delete a connection.
pub async fn delete_connection(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    auth.require_any(&["USER", "ADMIN"])?;

    if state.db.delete_connection(&id).await? == 0 {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::OK)
}

// =============================================================================
// Tests
// =============================================================================
