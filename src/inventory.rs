// =============================================================================
// ChainView Backend - Inventory API
// =============================================================================
// Stock levels per (node, product) pair. Writes are an upsert keyed on the
// pair; the unique index closes the create/create race between writers.
// =============================================================================

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::{Inventory, InventoryView};
use crate::error::ApiError;
use crate::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRequest {
    pub node_id: String,
    pub product_id: String,
    #[serde(default)]
    pub quantity: i64,
    pub min_threshold: Option<i64>,
    pub max_threshold: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryResponse {
    pub id: String,
    pub node_id: String,
    pub node_name: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub min_threshold: Option<i64>,
    pub max_threshold: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<InventoryView> for InventoryResponse {
    fn from(i: InventoryView) -> Self {
        Self {
            id: i.id,
            node_id: i.node_id,
            node_name: i.node_name,
            product_id: i.product_id,
            product_name: i.product_name,
            quantity: i.quantity,
            min_threshold: i.min_threshold,
            max_threshold: i.max_threshold,
            created_at: i.created_at,
            updated_at: i.updated_at,
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// List all inventory rows.
pub async fn get_inventory(
    State(state): State<AppState>,
) -> Result<Json<Vec<InventoryResponse>>, ApiError> {
    let rows = state.db.get_all_inventory().await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Get a single inventory row by ID.
pub async fn get_inventory_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let row = state
        .db
        .find_inventory_by_id(&id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(row.into()))
}

/// List stock at a node. An unknown node yields an empty list.
pub async fn get_inventory_by_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<Json<Vec<InventoryResponse>>, ApiError> {
    let rows = state.db.get_inventory_by_node(&node_id).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// List stock of a product across nodes.
pub async fn get_inventory_by_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<Vec<InventoryResponse>>, ApiError> {
    let rows = state.db.get_inventory_by_product(&product_id).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// List rows at or below their minimum threshold.
pub async fn get_low_stock(
    State(state): State<AppState>,
) -> Result<Json<Vec<InventoryResponse>>, ApiError> {
    let rows = state.db.get_low_stock_inventory().await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Create or update the stock level for a (node, product) pair.
pub async fn create_or_update_inventory(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<InventoryRequest>,
) -> Result<Json<InventoryResponse>, ApiError> {
    auth.require_any(&["USER", "ADMIN"])?;

    if state.db.find_node_by_id(&req.node_id).await?.is_none() {
        return Err(ApiError::InvalidReference(format!(
            "Node {} does not exist",
            req.node_id
        )));
    }
    if state.db.find_product_by_id(&req.product_id).await?.is_none() {
        return Err(ApiError::InvalidReference(format!(
            "Product {} does not exist",
            req.product_id
        )));
    }

    let now = Utc::now();
    let inv = Inventory {
        id: uuid::Uuid::new_v4().to_string(),
        node_id: req.node_id,
        product_id: req.product_id,
        quantity: req.quantity,
        min_threshold: req.min_threshold,
        max_threshold: req.max_threshold,
        created_at: now,
        updated_at: now,
    };
    state.db.upsert_inventory(&inv).await?;

    // The stored row keeps its original id/created_at when the pair existed
    let row = state
        .db
        .find_inventory_by_pair(&inv.node_id, &inv.product_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(row.into()))
}

/// Delete an inventory row.
pub async fn delete_inventory(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    auth.require_any(&["USER", "ADMIN"])?;

    if state.db.delete_inventory(&id).await? == 0 {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::OK)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Node, Product};
    use crate::test_state;

    fn admin() -> AuthUser {
        AuthUser {
            user_id: "admin-1".into(),
            roles: vec!["ADMIN".into()],
        }
    }

    async fn seed(state: &AppState) -> (Node, Product) {
        let now = Utc::now();
        let node = Node {
            id: uuid::Uuid::new_v4().to_string(),
            name: "Node N".into(),
            node_type: "warehouse".into(),
            latitude: 0.0,
            longitude: 0.0,
            capacity: None,
            status: "active".into(),
            created_at: now,
            updated_at: now,
        };
        let product = Product {
            id: uuid::Uuid::new_v4().to_string(),
            name: "Product P".into(),
            description: None,
            unit_price: 1.0,
            weight: None,
            sku: Some("SKU-1".into()),
            status: "active".into(),
            created_at: now,
            updated_at: now,
        };
        state.db.insert_node(&node).await.unwrap();
        state.db.insert_product(&product).await.unwrap();
        (node, product)
    }

    fn request(node: &Node, product: &Product, quantity: i64, min: Option<i64>) -> InventoryRequest {
        InventoryRequest {
            node_id: node.id.clone(),
            product_id: product.id.clone(),
            quantity,
            min_threshold: min,
            max_threshold: None,
        }
    }

    #[tokio::test]
    async fn upsert_requires_resolvable_references() {
        let state = test_state().await;
        let (node, product) = seed(&state).await;

        let bad_node = InventoryRequest {
            node_id: "missing".into(),
            product_id: product.id.clone(),
            quantity: 1,
            min_threshold: None,
            max_threshold: None,
        };
        assert!(matches!(
            create_or_update_inventory(State(state.clone()), admin(), Json(bad_node)).await,
            Err(ApiError::InvalidReference(_))
        ));

        let bad_product = InventoryRequest {
            node_id: node.id.clone(),
            product_id: "missing".into(),
            quantity: 1,
            min_threshold: None,
            max_threshold: None,
        };
        assert!(matches!(
            create_or_update_inventory(State(state.clone()), admin(), Json(bad_product)).await,
            Err(ApiError::InvalidReference(_))
        ));

        // Nothing was written
        assert!(state.db.get_all_inventory().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn restock_moves_a_row_out_of_low_stock() {
        let state = test_state().await;
        let (node, product) = seed(&state).await;

        // Quantity 5 against a minimum of 10: low stock
        let Json(first) = create_or_update_inventory(
            State(state.clone()),
            admin(),
            Json(request(&node, &product, 5, Some(10))),
        )
        .await
        .unwrap();
        assert_eq!(first.node_name, "Node N");
        assert_eq!(first.product_name, "Product P");

        let Json(low) = get_low_stock(State(state.clone())).await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].id, first.id);

        // Restocking the same pair updates in place
        let Json(second) = create_or_update_inventory(
            State(state.clone()),
            admin(),
            Json(request(&node, &product, 20, Some(10))),
        )
        .await
        .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.quantity, 20);

        let Json(low) = get_low_stock(State(state.clone())).await.unwrap();
        assert!(low.is_empty());
        assert_eq!(state.db.get_all_inventory().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_node_lookup_is_an_empty_list() {
        let state = test_state().await;
        let Json(rows) = get_inventory_by_node(State(state), Path("missing".into()))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn delete_missing_row_is_not_found() {
        let state = test_state().await;
        assert!(matches!(
            delete_inventory(State(state), admin(), Path("missing".into())).await,
            Err(ApiError::NotFound)
        ));
    }
}
