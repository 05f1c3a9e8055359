// =============================================================================
// ChainView Backend - Shipments API
// =============================================================================
// Shipment lifecycle together with its line items. Items live and die with
// their shipment and are never addressed by the API on their own. Within a
// shipment items are keyed by product: duplicates collapse, last write wins.
// =============================================================================

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::{Shipment, ShipmentItemView, ShipmentView};
use crate::error::ApiError;
use crate::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentItemRequest {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentRequest {
    pub source_id: String,
    pub destination_id: String,
    pub status: Option<String>,
    pub departure_date: Option<DateTime<Utc>>,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub actual_arrival: Option<DateTime<Utc>>,
    /// When present the shipment's item set is replaced wholesale;
    /// when absent existing items are left untouched.
    pub items: Option<Vec<ShipmentItemRequest>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentItemResponse {
    pub id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
}

impl From<ShipmentItemView> for ShipmentItemResponse {
    fn from(i: ShipmentItemView) -> Self {
        Self {
            id: i.id,
            product_id: i.product_id,
            product_name: i.product_name,
            quantity: i.quantity,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentResponse {
    pub id: String,
    pub source_id: String,
    pub source_name: String,
    pub destination_id: String,
    pub destination_name: String,
    pub status: String,
    pub departure_date: Option<DateTime<Utc>>,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub actual_arrival: Option<DateTime<Utc>>,
    pub items: Vec<ShipmentItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeQuery {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub date_type: Option<String>,
}

// =============================================================================
// Helpers
// =============================================================================

/// Attach the line items to a shipment read model.
async fn assemble(state: &AppState, view: ShipmentView) -> Result<ShipmentResponse, ApiError> {
    let items = state.db.get_shipment_items(&view.id).await?;
    Ok(ShipmentResponse {
        id: view.id,
        source_id: view.source_id,
        source_name: view.source_name,
        destination_id: view.destination_id,
        destination_name: view.destination_name,
        status: view.status,
        departure_date: view.departure_date,
        estimated_arrival: view.estimated_arrival,
        actual_arrival: view.actual_arrival,
        items: items.into_iter().map(Into::into).collect(),
        created_at: view.created_at,
        updated_at: view.updated_at,
    })
}

async fn assemble_all(
    state: &AppState,
    views: Vec<ShipmentView>,
) -> Result<Json<Vec<ShipmentResponse>>, ApiError> {
    let mut responses = Vec::with_capacity(views.len());
    for view in views {
        responses.push(assemble(state, view).await?);
    }
    Ok(Json(responses))
}

/// Both endpoints must resolve to existing nodes.
async fn check_endpoints(state: &AppState, source_id: &str, destination_id: &str) -> Result<(), ApiError> {
    if state.db.find_node_by_id(source_id).await?.is_none() {
        return Err(ApiError::InvalidReference(format!(
            "Source node {} does not exist",
            source_id
        )));
    }
    if state.db.find_node_by_id(destination_id).await?.is_none() {
        return Err(ApiError::InvalidReference(format!(
            "Destination node {} does not exist",
            destination_id
        )));
    }
    Ok(())
}

/// Every item's product must resolve. Checked before any write so a bad
/// item leaves the store untouched.
async fn check_items(state: &AppState, items: &[ShipmentItemRequest]) -> Result<(), ApiError> {
    for item in items {
        if state.db.find_product_by_id(&item.product_id).await?.is_none() {
            return Err(ApiError::InvalidReference(format!(
                "Product {} does not exist",
                item.product_id
            )));
        }
    }
    Ok(())
}

async fn write_items(
    state: &AppState,
    shipment_id: &str,
    items: &[ShipmentItemRequest],
) -> Result<(), ApiError> {
    for item in items {
        state
            .db
            .upsert_shipment_item(shipment_id, &item.product_id, item.quantity)
            .await?;
    }
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

/// List all shipments.
pub async fn get_shipments(
    State(state): State<AppState>,
) -> Result<Json<Vec<ShipmentResponse>>, ApiError> {
    let views = state.db.get_all_shipments().await?;
    assemble_all(&state, views).await
}

/// Get a single shipment by ID.
pub async fn get_shipment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ShipmentResponse>, ApiError> {
    let view = state
        .db
        .find_shipment_by_id(&id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(assemble(&state, view).await?))
}

/// List shipments originating at a node. An unknown node matches nothing.
pub async fn get_shipments_by_source(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> Result<Json<Vec<ShipmentResponse>>, ApiError> {
    let views = state.db.get_shipments_by_source(&source_id).await?;
    assemble_all(&state, views).await
}

/// List shipments bound for a node.
pub async fn get_shipments_by_destination(
    State(state): State<AppState>,
    Path(destination_id): Path<String>,
) -> Result<Json<Vec<ShipmentResponse>>, ApiError> {
    let views = state.db.get_shipments_by_destination(&destination_id).await?;
    assemble_all(&state, views).await
}

/// List shipments with a given status (exact match).
pub async fn get_shipments_by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
) -> Result<Json<Vec<ShipmentResponse>>, ApiError> {
    let views = state.db.get_shipments_by_status(&status).await?;
    assemble_all(&state, views).await
}

/// List shipments whose selected date field falls within the inclusive
/// [startDate, endDate] window. dateType defaults to "departure".
pub async fn get_shipments_by_date_range(
    State(state): State<AppState>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Vec<ShipmentResponse>>, ApiError> {
    let date_type = query.date_type.as_deref().unwrap_or("departure");
    let views = state
        .db
        .get_shipments_by_date_range(&query.start_date, &query.end_date, date_type)
        .await?;
    assemble_all(&state, views).await
}

/// Create a shipment with its line items. All references are resolved up
/// front; nothing is persisted when one fails.
pub async fn create_shipment(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ShipmentRequest>,
) -> Result<Json<ShipmentResponse>, ApiError> {
    auth.require_any(&["ADMIN", "MODERATOR"])?;

    check_endpoints(&state, &req.source_id, &req.destination_id).await?;
    if let Some(items) = &req.items {
        check_items(&state, items).await?;
    }

    let now = Utc::now();
    let shipment = Shipment {
        id: uuid::Uuid::new_v4().to_string(),
        source_id: req.source_id,
        destination_id: req.destination_id,
        status: req.status.unwrap_or_else(|| "pending".to_string()),
        departure_date: req.departure_date,
        estimated_arrival: req.estimated_arrival,
        actual_arrival: req.actual_arrival,
        created_at: now,
        updated_at: now,
    };
    state.db.insert_shipment(&shipment).await?;

    if let Some(items) = &req.items {
        write_items(&state, &shipment.id, items).await?;
    }

    let view = state
        .db
        .find_shipment_by_id(&shipment.id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(assemble(&state, view).await?))
}

/// Overwrite a shipment. When the request carries an item list the stored
/// items are replaced wholesale.
pub async fn update_shipment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<ShipmentRequest>,
) -> Result<Json<ShipmentResponse>, ApiError> {
    auth.require_any(&["ADMIN", "MODERATOR"])?;

    let existing = state
        .db
        .find_shipment_by_id(&id)
        .await?
        .ok_or(ApiError::NotFound)?;

    check_endpoints(&state, &req.source_id, &req.destination_id).await?;
    if let Some(items) = &req.items {
        check_items(&state, items).await?;
    }

    let shipment = Shipment {
        id: existing.id.clone(),
        source_id: req.source_id,
        destination_id: req.destination_id,
        status: req.status.unwrap_or(existing.status),
        departure_date: req.departure_date,
        estimated_arrival: req.estimated_arrival,
        actual_arrival: req.actual_arrival,
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };
    state.db.update_shipment(&shipment).await?;

    if let Some(items) = &req.items {
        state.db.clear_shipment_items(&shipment.id).await?;
        write_items(&state, &shipment.id, items).await?;
    }

    let view = state
        .db
        .find_shipment_by_id(&shipment.id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(assemble(&state, view).await?))
}

/// Overwrite a shipment's status. The value is not validated; pending,
/// in_transit, delivered and delayed are conventional.
pub async fn update_shipment_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ShipmentResponse>, ApiError> {
    auth.require_any(&["ADMIN", "MODERATOR"])?;

    if state.db.set_shipment_status(&id, &query.status).await? == 0 {
        return Err(ApiError::NotFound);
    }

    let view = state
        .db
        .find_shipment_by_id(&id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(assemble(&state, view).await?))
}

/// Delete a shipment and its items.
pub async fn delete_shipment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    auth.require_any(&["ADMIN"])?;

    if state.db.delete_shipment(&id).await? == 0 {
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
    use chrono::TimeZone;

    fn admin() -> AuthUser {
        AuthUser {
            user_id: "admin-1".into(),
            roles: vec!["ADMIN".into()],
        }
    }

    fn moderator() -> AuthUser {
        AuthUser {
            user_id: "mod-1".into(),
            roles: vec!["MODERATOR".into()],
        }
    }

    async fn seed_node(state: &AppState, name: &str) -> Node {
        let now = Utc::now();
        let node = Node {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            node_type: "warehouse".into(),
            latitude: 0.0,
            longitude: 0.0,
            capacity: None,
            status: "active".into(),
            created_at: now,
            updated_at: now,
        };
        state.db.insert_node(&node).await.unwrap();
        node
    }

    async fn seed_product(state: &AppState, name: &str) -> Product {
        let now = Utc::now();
        let product = Product {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            unit_price: 1.0,
            weight: None,
            sku: None,
            status: "active".into(),
            created_at: now,
            updated_at: now,
        };
        state.db.insert_product(&product).await.unwrap();
        product
    }

    fn request(source: &Node, destination: &Node) -> ShipmentRequest {
        ShipmentRequest {
            source_id: source.id.clone(),
            destination_id: destination.id.clone(),
            status: None,
            departure_date: None,
            estimated_arrival: None,
            actual_arrival: None,
            items: None,
        }
    }

    #[tokio::test]
    async fn create_defaults_status_and_inlines_names() {
        let state = test_state().await;
        let a = seed_node(&state, "Hamburg").await;
        let b = seed_node(&state, "Munich").await;
        let p = seed_product(&state, "Pallet").await;

        let mut req = request(&a, &b);
        req.items = Some(vec![ShipmentItemRequest {
            product_id: p.id.clone(),
            quantity: 4,
        }]);

        let Json(created) = create_shipment(State(state.clone()), moderator(), Json(req))
            .await
            .unwrap();
        assert_eq!(created.status, "pending");
        assert_eq!(created.source_name, "Hamburg");
        assert_eq!(created.destination_name, "Munich");
        assert_eq!(created.items.len(), 1);
        assert_eq!(created.items[0].product_name, "Pallet");
        assert_eq!(created.items[0].quantity, 4);
    }

    #[tokio::test]
    async fn unresolved_source_persists_nothing() {
        let state = test_state().await;
        let b = seed_node(&state, "Dest").await;

        let req = ShipmentRequest {
            source_id: "missing".into(),
            destination_id: b.id.clone(),
            status: None,
            departure_date: None,
            estimated_arrival: None,
            actual_arrival: None,
            items: None,
        };
        assert!(matches!(
            create_shipment(State(state.clone()), moderator(), Json(req)).await,
            Err(ApiError::InvalidReference(_))
        ));
        assert!(state.db.get_all_shipments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_item_product_fails_the_whole_create() {
        let state = test_state().await;
        let a = seed_node(&state, "A").await;
        let b = seed_node(&state, "B").await;

        let mut req = request(&a, &b);
        req.items = Some(vec![ShipmentItemRequest {
            product_id: "missing".into(),
            quantity: 1,
        }]);
        assert!(matches!(
            create_shipment(State(state.clone()), moderator(), Json(req)).await,
            Err(ApiError::InvalidReference(_))
        ));
        assert!(state.db.get_all_shipments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_items_collapse_to_the_last_quantity() {
        let state = test_state().await;
        let a = seed_node(&state, "A").await;
        let b = seed_node(&state, "B").await;
        let p = seed_product(&state, "Crate").await;

        let mut req = request(&a, &b);
        req.items = Some(vec![
            ShipmentItemRequest {
                product_id: p.id.clone(),
                quantity: 2,
            },
            ShipmentItemRequest {
                product_id: p.id.clone(),
                quantity: 9,
            },
        ]);
        let Json(created) = create_shipment(State(state), moderator(), Json(req))
            .await
            .unwrap();
        assert_eq!(created.items.len(), 1);
        assert_eq!(created.items[0].quantity, 9);
    }

    #[tokio::test]
    async fn update_replaces_items_when_present_keeps_them_when_absent() {
        let state = test_state().await;
        let a = seed_node(&state, "A").await;
        let b = seed_node(&state, "B").await;
        let p1 = seed_product(&state, "P1").await;
        let p2 = seed_product(&state, "P2").await;

        let mut req = request(&a, &b);
        req.items = Some(vec![ShipmentItemRequest {
            product_id: p1.id.clone(),
            quantity: 1,
        }]);
        let Json(created) = create_shipment(State(state.clone()), moderator(), Json(req))
            .await
            .unwrap();

        // Items absent: untouched
        let Json(kept) = update_shipment(
            State(state.clone()),
            moderator(),
            Path(created.id.clone()),
            Json(request(&a, &b)),
        )
        .await
        .unwrap();
        assert_eq!(kept.items.len(), 1);
        assert_eq!(kept.items[0].product_id, p1.id);

        // Items present: replaced wholesale
        let mut replace = request(&a, &b);
        replace.items = Some(vec![ShipmentItemRequest {
            product_id: p2.id.clone(),
            quantity: 5,
        }]);
        let Json(replaced) = update_shipment(
            State(state),
            moderator(),
            Path(created.id.clone()),
            Json(replace),
        )
        .await
        .unwrap();
        assert_eq!(replaced.items.len(), 1);
        assert_eq!(replaced.items[0].product_id, p2.id);
    }

    #[tokio::test]
    async fn status_update_on_missing_shipment_is_not_found() {
        let state = test_state().await;
        assert!(matches!(
            update_shipment_status(
                State(state.clone()),
                moderator(),
                Path("missing".into()),
                Query(StatusQuery {
                    status: "delivered".into()
                }),
            )
            .await,
            Err(ApiError::NotFound)
        ));
        assert!(state.db.get_all_shipments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn status_update_overwrites_without_validation() {
        let state = test_state().await;
        let a = seed_node(&state, "A").await;
        let b = seed_node(&state, "B").await;
        let Json(created) = create_shipment(State(state.clone()), moderator(), Json(request(&a, &b)))
            .await
            .unwrap();

        let Json(updated) = update_shipment_status(
            State(state),
            moderator(),
            Path(created.id.clone()),
            Query(StatusQuery {
                status: "lost_at_sea".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.status, "lost_at_sea");
    }

    #[tokio::test]
    async fn delete_is_admin_only_and_cascades() {
        let state = test_state().await;
        let a = seed_node(&state, "A").await;
        let b = seed_node(&state, "B").await;
        let p = seed_product(&state, "P").await;

        let mut req = request(&a, &b);
        req.items = Some(vec![ShipmentItemRequest {
            product_id: p.id.clone(),
            quantity: 1,
        }]);
        let Json(created) = create_shipment(State(state.clone()), moderator(), Json(req))
            .await
            .unwrap();

        assert!(matches!(
            delete_shipment(State(state.clone()), moderator(), Path(created.id.clone())).await,
            Err(ApiError::Forbidden)
        ));

        delete_shipment(State(state.clone()), admin(), Path(created.id.clone()))
            .await
            .unwrap();
        assert!(state.db.get_shipment_items(&created.id).await.unwrap().is_empty());

        // Repeated delete reports not found
        assert!(matches!(
            delete_shipment(State(state), admin(), Path(created.id)).await,
            Err(ApiError::NotFound)
        ));
    }

    #[tokio::test]
    async fn date_range_uses_the_selected_field() {
        let state = test_state().await;
        let a = seed_node(&state, "A").await;
        let b = seed_node(&state, "B").await;

        let day = |d: u32| Utc.with_ymd_and_hms(2026, 5, d, 8, 0, 0).unwrap();
        let mut req = request(&a, &b);
        req.departure_date = Some(day(3));
        req.estimated_arrival = Some(day(9));
        create_shipment(State(state.clone()), moderator(), Json(req))
            .await
            .unwrap();

        let Json(by_departure) = get_shipments_by_date_range(
            State(state.clone()),
            Query(DateRangeQuery {
                start_date: day(1),
                end_date: day(5),
                date_type: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(by_departure.len(), 1);

        let Json(by_estimated) = get_shipments_by_date_range(
            State(state),
            Query(DateRangeQuery {
                start_date: day(1),
                end_date: day(5),
                date_type: Some("estimated".into()),
            }),
        )
        .await
        .unwrap();
        assert!(by_estimated.is_empty());
    }
}
