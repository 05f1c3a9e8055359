// =============================================================================
// ChainView Backend - Products API
// =============================================================================

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::Product;
use crate::error::ApiError;
use crate::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub unit_price: f64,
    pub weight: Option<f64>,
    pub sku: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub unit_price: f64,
    pub weight: Option<f64>,
    pub sku: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            unit_price: p.unit_price,
            weight: p.weight,
            sku: p.sku,
            status: p.status,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Surface a duplicate-SKU unique violation as a conflict.
fn map_sku_conflict(e: sqlx::Error) -> ApiError {
    match e {
        sqlx::Error::Database(ref d) if d.is_unique_violation() => {
            ApiError::Conflict("SKU already in use".to_string())
        }
        other => other.into(),
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// List all products.
pub async fn get_products(State(state): State<AppState>) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.db.get_all_products().await?;
    Ok(Json(products.into_iter().map(Into::into).collect()))
}

/// Get a single product by ID.
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state.db.find_product_by_id(&id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(product.into()))
}

/// List products with a given status.
pub async fn get_products_by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.db.get_products_by_status(&status).await?;
    Ok(Json(products.into_iter().map(Into::into).collect()))
}

/// List products with a given SKU.
pub async fn get_products_by_sku(
    State(state): State<AppState>,
    Path(sku): Path<String>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.db.get_products_by_sku(&sku).await?;
    Ok(Json(products.into_iter().map(Into::into).collect()))
}

/// Create a product.
pub async fn create_product(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    auth.require_any(&["USER", "ADMIN"])?;

    let now = Utc::now();
    let product = Product {
        id: uuid::Uuid::new_v4().to_string(),
        name: req.name,
        description: req.description,
        unit_price: req.unit_price,
        weight: req.weight,
        sku: req.sku,
        status: req.status.unwrap_or_else(|| "active".to_string()),
        created_at: now,
        updated_at: now,
    };
    state.db.insert_product(&product).await.map_err(map_sku_conflict)?;

    Ok(Json(product.into()))
}

/// Overwrite a product's mutable fields.
pub async fn update_product(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<ProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    auth.require_any(&["USER", "ADMIN"])?;

    let existing = state.db.find_product_by_id(&id).await?.ok_or(ApiError::NotFound)?;

    let product = Product {
        id: existing.id,
        name: req.name,
        description: req.description,
        unit_price: req.unit_price,
        weight: req.weight,
        sku: req.sku,
        status: req.status.unwrap_or(existing.status),
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };
    state.db.update_product(&product).await.map_err(map_sku_conflict)?;

    Ok(Json(product.into()))
}

/// Delete a product.
pub async fn delete_product(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    auth.require_any(&["USER", "ADMIN"])?;

    if state.db.delete_product(&id).await? == 0 {
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
    use crate::test_state;

    fn admin() -> AuthUser {
        AuthUser {
            user_id: "admin-1".into(),
            roles: vec!["ADMIN".into()],
        }
    }

    fn request(name: &str, sku: Option<&str>) -> ProductRequest {
        ProductRequest {
            name: name.into(),
            description: None,
            unit_price: 4.5,
            weight: None,
            sku: sku.map(|s| s.to_string()),
            status: None,
        }
    }

    #[tokio::test]
    async fn sku_lookup_returns_exact_matches() {
        let state = test_state().await;
        create_product(State(state.clone()), admin(), Json(request("Bolt", Some("SKU-1"))))
            .await
            .unwrap();
        create_product(State(state.clone()), admin(), Json(request("Nut", Some("SKU-2"))))
            .await
            .unwrap();

        let Json(found) = get_products_by_sku(State(state.clone()), Path("SKU-1".into()))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Bolt");

        let Json(none) = get_products_by_sku(State(state), Path("SKU-9".into()))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn duplicate_sku_is_a_conflict() {
        let state = test_state().await;
        create_product(State(state.clone()), admin(), Json(request("Bolt", Some("SKU-1"))))
            .await
            .unwrap();
        assert!(matches!(
            create_product(State(state), admin(), Json(request("Copy", Some("SKU-1")))).await,
            Err(ApiError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn update_missing_product_is_not_found() {
        let state = test_state().await;
        assert!(matches!(
            update_product(State(state), admin(), Path("nope".into()), Json(request("X", None))).await,
            Err(ApiError::NotFound)
        ));
    }
}
