// =============================================================================
// ChainView Backend - Database Layer
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

/// Supply chain node (factory, warehouse, store, ...).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub node_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub capacity: Option<i64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product model.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
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

/// Directed transport link between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Connection {
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

/// Inventory write model. One row per (node, product) pair.
#[derive(Debug, Clone)]
pub struct Inventory {
    pub id: String,
    pub node_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub min_threshold: Option<i64>,
    pub max_threshold: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inventory read model with node/product names joined in.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InventoryView {
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

/// Shipment write model.
#[derive(Debug, Clone)]
pub struct Shipment {
    pub id: String,
    pub source_id: String,
    pub destination_id: String,
    pub status: String,
    pub departure_date: Option<DateTime<Utc>>,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub actual_arrival: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Shipment read model with endpoint names joined in.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ShipmentView {
    pub id: String,
    pub source_id: String,
    pub source_name: String,
    pub destination_id: String,
    pub destination_name: String,
    pub status: String,
    pub departure_date: Option<DateTime<Utc>>,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub actual_arrival: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Line item read model with the product name joined in.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ShipmentItemView {
    pub id: String,
    pub shipment_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
}

const SHIPMENT_VIEW_SQL: &str = r#"
    SELECT s.id, s.source_id, src.name AS source_name,
           s.destination_id, dst.name AS destination_name,
           s.status, s.departure_date, s.estimated_arrival, s.actual_arrival,
           s.created_at, s.updated_at
    FROM shipments s
    JOIN nodes src ON src.id = s.source_id
    JOIN nodes dst ON dst.id = s.destination_id
"#;

const INVENTORY_VIEW_SQL: &str = r#"
    SELECT i.id, i.node_id, n.name AS node_name,
           i.product_id, p.name AS product_name,
           i.quantity, i.min_threshold, i.max_threshold,
           i.created_at, i.updated_at
    FROM inventory i
    JOIN nodes n ON n.id = i.node_id
    JOIN products p ON p.id = i.product_id
"#;

impl Database {
    /// Create a new database connection pool.
    pub async fn new(url: &str) -> Result<Self, sqlx::Error> {
        // Add create_if_missing option for SQLite
        let url_with_options = if url.starts_with("sqlite:") && !url.contains("?") {
            format!("{}?mode=rwc", url)
        } else if url.starts_with("sqlite:") && !url.contains("mode=") {
            format!("{}&mode=rwc", url)
        } else {
            url.to_string()
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url_with_options)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        // Nodes table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                node_type TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                capacity INTEGER,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Products table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                unit_price REAL NOT NULL,
                weight REAL,
                sku TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Connections table (directed edges; duplicate edges are allowed)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS connections (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL REFERENCES nodes(id),
                target_id TEXT NOT NULL REFERENCES nodes(id),
                transportation_type TEXT,
                distance REAL,
                travel_time INTEGER,
                cost_per_unit REAL,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Inventory table. UNIQUE(node_id, product_id) backs the upsert.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS inventory (
                id TEXT PRIMARY KEY,
                node_id TEXT NOT NULL REFERENCES nodes(id),
                product_id TEXT NOT NULL REFERENCES products(id),
                quantity INTEGER NOT NULL DEFAULT 0,
                min_threshold INTEGER,
                max_threshold INTEGER,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(node_id, product_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Shipments table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shipments (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL REFERENCES nodes(id),
                destination_id TEXT NOT NULL REFERENCES nodes(id),
                status TEXT NOT NULL DEFAULT 'pending',
                departure_date TEXT,
                estimated_arrival TEXT,
                actual_arrival TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Shipment items. One row per product within a shipment, last write wins.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shipment_items (
                id TEXT PRIMARY KEY,
                shipment_id TEXT NOT NULL REFERENCES shipments(id) ON DELETE CASCADE,
                product_id TEXT NOT NULL REFERENCES products(id),
                quantity INTEGER NOT NULL,
                UNIQUE(shipment_id, product_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Unique SKU (SQLite allows multiple NULLs here)
        let _ = sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_products_sku ON products(sku)")
            .execute(&self.pool)
            .await;

        // Create indexes for performance
        let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_connections_source ON connections(source_id)")
            .execute(&self.pool)
            .await;
        let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_connections_target ON connections(target_id)")
            .execute(&self.pool)
            .await;
        let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_inventory_node ON inventory(node_id)")
            .execute(&self.pool)
            .await;
        let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_inventory_product ON inventory(product_id)")
            .execute(&self.pool)
            .await;
        let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_shipments_source ON shipments(source_id)")
            .execute(&self.pool)
            .await;
        let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_shipments_destination ON shipments(destination_id)")
            .execute(&self.pool)
            .await;
        let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_shipments_status ON shipments(status)")
            .execute(&self.pool)
            .await;
        let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_shipment_items_shipment ON shipment_items(shipment_id)")
            .execute(&self.pool)
            .await;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    // =========================================================================
    // Node Methods
    // =========================================================================

    /// Insert a new node.
    pub async fn insert_node(&self, node: &Node) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO nodes (id, name, node_type, latitude, longitude, capacity, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&node.id)
        .bind(&node.name)
        .bind(&node.node_type)
        .bind(node.latitude)
        .bind(node.longitude)
        .bind(node.capacity)
        .bind(&node.status)
        .bind(node.created_at.to_rfc3339())
        .bind(node.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Find node by ID.
    pub async fn find_node_by_id(&self, id: &str) -> Result<Option<Node>, sqlx::Error> {
        sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get all nodes.
    pub async fn get_all_nodes(&self) -> Result<Vec<Node>, sqlx::Error> {
        sqlx::query_as::<_, Node>("SELECT * FROM nodes ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
    }

    /// Get nodes by type (exact match).
    pub async fn get_nodes_by_type(&self, node_type: &str) -> Result<Vec<Node>, sqlx::Error> {
        sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE node_type = ? ORDER BY created_at")
            .bind(node_type)
            .fetch_all(&self.pool)
            .await
    }

    /// Get nodes by status (exact match).
    pub async fn get_nodes_by_status(&self, status: &str) -> Result<Vec<Node>, sqlx::Error> {
        sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE status = ? ORDER BY created_at")
            .bind(status)
            .fetch_all(&self.pool)
            .await
    }

    /// Overwrite a node's mutable fields. Id and created_at are preserved.
    pub async fn update_node(&self, node: &Node) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE nodes
            SET name = ?, node_type = ?, latitude = ?, longitude = ?, capacity = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&node.name)
        .bind(&node.node_type)
        .bind(node.latitude)
        .bind(node.longitude)
        .bind(node.capacity)
        .bind(&node.status)
        .bind(node.updated_at.to_rfc3339())
        .bind(&node.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete a node. Returns the number of rows removed.
    pub async fn delete_node(&self, id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM nodes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Product Methods
    // =========================================================================

    /// Insert a new product. Fails with a unique violation on duplicate SKU.
    pub async fn insert_product(&self, product: &Product) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, unit_price, weight, sku, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.unit_price)
        .bind(product.weight)
        .bind(&product.sku)
        .bind(&product.status)
        .bind(product.created_at.to_rfc3339())
        .bind(product.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Find product by ID.
    pub async fn find_product_by_id(&self, id: &str) -> Result<Option<Product>, sqlx::Error> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get all products.
    pub async fn get_all_products(&self) -> Result<Vec<Product>, sqlx::Error> {
        sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
    }

    /// Get products by status (exact match).
    pub async fn get_products_by_status(&self, status: &str) -> Result<Vec<Product>, sqlx::Error> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE status = ? ORDER BY created_at")
            .bind(status)
            .fetch_all(&self.pool)
            .await
    }

    /// Get products by SKU (exact match).
    pub async fn get_products_by_sku(&self, sku: &str) -> Result<Vec<Product>, sqlx::Error> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE sku = ? ORDER BY created_at")
            .bind(sku)
            .fetch_all(&self.pool)
            .await
    }

    /// Overwrite a product's mutable fields. Id and created_at are preserved.
    pub async fn update_product(&self, product: &Product) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = ?, description = ?, unit_price = ?, weight = ?, sku = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.unit_price)
        .bind(product.weight)
        .bind(&product.sku)
        .bind(&product.status)
        .bind(product.updated_at.to_rfc3339())
        .bind(&product.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete a product.
    pub async fn delete_product(&self, id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Connection Methods
    // =========================================================================

    /// Insert a new connection.
    pub async fn insert_connection(&self, conn: &Connection) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO connections (id, source_id, target_id, transportation_type, distance, travel_time, cost_per_unit, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&conn.id)
        .bind(&conn.source_id)
        .bind(&conn.target_id)
        .bind(&conn.transportation_type)
        .bind(conn.distance)
        .bind(conn.travel_time)
        .bind(conn.cost_per_unit)
        .bind(&conn.status)
        .bind(conn.created_at.to_rfc3339())
        .bind(conn.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Find connection by ID.
    pub async fn find_connection_by_id(&self, id: &str) -> Result<Option<Connection>, sqlx::Error> {
        sqlx::query_as::<_, Connection>("SELECT * FROM connections WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get all connections.
    pub async fn get_all_connections(&self) -> Result<Vec<Connection>, sqlx::Error> {
        sqlx::query_as::<_, Connection>("SELECT * FROM connections ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
    }

    /// Get connections originating at a node.
    pub async fn get_connections_by_source(&self, source_id: &str) -> Result<Vec<Connection>, sqlx::Error> {
        sqlx::query_as::<_, Connection>(
            "SELECT * FROM connections WHERE source_id = ? ORDER BY created_at",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Get connections terminating at a node.
    pub async fn get_connections_by_target(&self, target_id: &str) -> Result<Vec<Connection>, sqlx::Error> {
        sqlx::query_as::<_, Connection>(
            "SELECT * FROM connections WHERE target_id = ? ORDER BY created_at",
        )
        .bind(target_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Get connections between a specific pair of nodes.
    pub async fn get_connections_by_source_and_target(
        &self,
        source_id: &str,
        target_id: &str,
    ) -> Result<Vec<Connection>, sqlx::Error> {
        sqlx::query_as::<_, Connection>(
            "SELECT * FROM connections WHERE source_id = ? AND target_id = ? ORDER BY created_at",
        )
        .bind(source_id)
        .bind(target_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Overwrite a connection's mutable fields. Id and created_at are preserved.
    pub async fn update_connection(&self, conn: &Connection) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE connections
            SET source_id = ?, target_id = ?, transportation_type = ?, distance = ?, travel_time = ?, cost_per_unit = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&conn.source_id)
        .bind(&conn.target_id)
        .bind(&conn.transportation_type)
        .bind(conn.distance)
        .bind(conn.travel_time)
        .bind(conn.cost_per_unit)
        .bind(&conn.status)
        .bind(conn.updated_at.to_rfc3339())
        .bind(&conn.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete a connection.
    pub async fn delete_connection(&self, id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM connections WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Inventory Methods
    // =========================================================================

    /// Create or update the inventory row for a (node, product) pair.
    /// The unique index on the pair makes this safe under concurrent writers.
    pub async fn upsert_inventory(&self, inv: &Inventory) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO inventory (id, node_id, product_id, quantity, min_threshold, max_threshold, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(node_id, product_id) DO UPDATE SET
                quantity = excluded.quantity,
                min_threshold = excluded.min_threshold,
                max_threshold = excluded.max_threshold,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&inv.id)
        .bind(&inv.node_id)
        .bind(&inv.product_id)
        .bind(inv.quantity)
        .bind(inv.min_threshold)
        .bind(inv.max_threshold)
        .bind(inv.created_at.to_rfc3339())
        .bind(inv.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Find the inventory row for a (node, product) pair.
    pub async fn find_inventory_by_pair(
        &self,
        node_id: &str,
        product_id: &str,
    ) -> Result<Option<InventoryView>, sqlx::Error> {
        let sql = format!("{} WHERE i.node_id = ? AND i.product_id = ?", INVENTORY_VIEW_SQL);
        sqlx::query_as::<_, InventoryView>(&sql)
            .bind(node_id)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Find inventory row by ID.
    pub async fn find_inventory_by_id(&self, id: &str) -> Result<Option<InventoryView>, sqlx::Error> {
        let sql = format!("{} WHERE i.id = ?", INVENTORY_VIEW_SQL);
        sqlx::query_as::<_, InventoryView>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get all inventory rows.
    pub async fn get_all_inventory(&self) -> Result<Vec<InventoryView>, sqlx::Error> {
        let sql = format!("{} ORDER BY i.created_at", INVENTORY_VIEW_SQL);
        sqlx::query_as::<_, InventoryView>(&sql)
            .fetch_all(&self.pool)
            .await
    }

    /// Get inventory at a node. An unknown node id simply matches nothing.
    pub async fn get_inventory_by_node(&self, node_id: &str) -> Result<Vec<InventoryView>, sqlx::Error> {
        let sql = format!("{} WHERE i.node_id = ? ORDER BY i.created_at", INVENTORY_VIEW_SQL);
        sqlx::query_as::<_, InventoryView>(&sql)
            .bind(node_id)
            .fetch_all(&self.pool)
            .await
    }

    /// Get inventory of a product across nodes.
    pub async fn get_inventory_by_product(&self, product_id: &str) -> Result<Vec<InventoryView>, sqlx::Error> {
        let sql = format!("{} WHERE i.product_id = ? ORDER BY i.created_at", INVENTORY_VIEW_SQL);
        sqlx::query_as::<_, InventoryView>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await
    }

    /// Get rows at or below their minimum threshold. Rows without a
    /// threshold are never low stock.
    pub async fn get_low_stock_inventory(&self) -> Result<Vec<InventoryView>, sqlx::Error> {
        let sql = format!(
            "{} WHERE i.min_threshold IS NOT NULL AND i.quantity <= i.min_threshold ORDER BY i.created_at",
            INVENTORY_VIEW_SQL
        );
        sqlx::query_as::<_, InventoryView>(&sql)
            .fetch_all(&self.pool)
            .await
    }

    /// Delete an inventory row.
    pub async fn delete_inventory(&self, id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM inventory WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Shipment Methods
    // =========================================================================

    /// Insert a new shipment.
    pub async fn insert_shipment(&self, shipment: &Shipment) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO shipments (id, source_id, destination_id, status, departure_date, estimated_arrival, actual_arrival, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&shipment.id)
        .bind(&shipment.source_id)
        .bind(&shipment.destination_id)
        .bind(&shipment.status)
        .bind(shipment.departure_date.map(|d| d.to_rfc3339()))
        .bind(shipment.estimated_arrival.map(|d| d.to_rfc3339()))
        .bind(shipment.actual_arrival.map(|d| d.to_rfc3339()))
        .bind(shipment.created_at.to_rfc3339())
        .bind(shipment.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Find shipment by ID.
    pub async fn find_shipment_by_id(&self, id: &str) -> Result<Option<ShipmentView>, sqlx::Error> {
        let sql = format!("{} WHERE s.id = ?", SHIPMENT_VIEW_SQL);
        sqlx::query_as::<_, ShipmentView>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get all shipments.
    pub async fn get_all_shipments(&self) -> Result<Vec<ShipmentView>, sqlx::Error> {
        let sql = format!("{} ORDER BY s.created_at", SHIPMENT_VIEW_SQL);
        sqlx::query_as::<_, ShipmentView>(&sql)
            .fetch_all(&self.pool)
            .await
    }

    /// Get shipments originating at a node.
    pub async fn get_shipments_by_source(&self, source_id: &str) -> Result<Vec<ShipmentView>, sqlx::Error> {
        let sql = format!("{} WHERE s.source_id = ? ORDER BY s.created_at", SHIPMENT_VIEW_SQL);
        sqlx::query_as::<_, ShipmentView>(&sql)
            .bind(source_id)
            .fetch_all(&self.pool)
            .await
    }

    /// Get shipments bound for a node.
    pub async fn get_shipments_by_destination(
        &self,
        destination_id: &str,
    ) -> Result<Vec<ShipmentView>, sqlx::Error> {
        let sql = format!("{} WHERE s.destination_id = ? ORDER BY s.created_at", SHIPMENT_VIEW_SQL);
        sqlx::query_as::<_, ShipmentView>(&sql)
            .bind(destination_id)
            .fetch_all(&self.pool)
            .await
    }

    /// Get shipments by status (exact match).
    pub async fn get_shipments_by_status(&self, status: &str) -> Result<Vec<ShipmentView>, sqlx::Error> {
        let sql = format!("{} WHERE s.status = ? ORDER BY s.created_at", SHIPMENT_VIEW_SQL);
        sqlx::query_as::<_, ShipmentView>(&sql)
            .bind(status)
            .fetch_all(&self.pool)
            .await
    }

    /// Get shipments whose selected date field falls within [start, end].
    /// An unrecognized date_type matches nothing.
    pub async fn get_shipments_by_date_range(
        &self,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
        date_type: &str,
    ) -> Result<Vec<ShipmentView>, sqlx::Error> {
        let column = match date_type {
            "departure" => "departure_date",
            "estimated" => "estimated_arrival",
            "actual" => "actual_arrival",
            _ => return Ok(Vec::new()),
        };

        // RFC 3339 UTC timestamps compare correctly as text
        let sql = format!(
            "{} WHERE s.{col} IS NOT NULL AND s.{col} >= ? AND s.{col} <= ? ORDER BY s.{col}",
            SHIPMENT_VIEW_SQL,
            col = column
        );
        sqlx::query_as::<_, ShipmentView>(&sql)
            .bind(start.to_rfc3339())
            .bind(end.to_rfc3339())
            .fetch_all(&self.pool)
            .await
    }

    /// Overwrite a shipment's mutable fields. Id and created_at are preserved.
    pub async fn update_shipment(&self, shipment: &Shipment) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE shipments
            SET source_id = ?, destination_id = ?, status = ?, departure_date = ?, estimated_arrival = ?, actual_arrival = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&shipment.source_id)
        .bind(&shipment.destination_id)
        .bind(&shipment.status)
        .bind(shipment.departure_date.map(|d| d.to_rfc3339()))
        .bind(shipment.estimated_arrival.map(|d| d.to_rfc3339()))
        .bind(shipment.actual_arrival.map(|d| d.to_rfc3339()))
        .bind(shipment.updated_at.to_rfc3339())
        .bind(&shipment.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Overwrite a shipment's status without touching anything else.
    pub async fn set_shipment_status(&self, id: &str, status: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE shipments SET status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete a shipment and its line items.
    pub async fn delete_shipment(&self, id: &str) -> Result<u64, sqlx::Error> {
        sqlx::query("DELETE FROM shipment_items WHERE shipment_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let result = sqlx::query("DELETE FROM shipments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Shipment Item Methods
    // =========================================================================

    /// Insert or overwrite the line item for a product within a shipment.
    pub async fn upsert_shipment_item(
        &self,
        shipment_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> Result<(), sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO shipment_items (id, shipment_id, product_id, quantity)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(shipment_id, product_id) DO UPDATE SET
                quantity = excluded.quantity
            "#,
        )
        .bind(&id)
        .bind(shipment_id)
        .bind(product_id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove all line items of a shipment.
    pub async fn clear_shipment_items(&self, shipment_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM shipment_items WHERE shipment_id = ?")
            .bind(shipment_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Get the line items of a shipment with product names joined in.
    pub async fn get_shipment_items(&self, shipment_id: &str) -> Result<Vec<ShipmentItemView>, sqlx::Error> {
        sqlx::query_as::<_, ShipmentItemView>(
            r#"
            SELECT i.id, i.shipment_id, i.product_id, p.name AS product_name, i.quantity
            FROM shipment_items i
            JOIN products p ON p.id = i.product_id
            WHERE i.shipment_id = ?
            ORDER BY p.name
            "#,
        )
        .bind(shipment_id)
        .fetch_all(&self.pool)
        .await
    }
}

// -----------------------------------------------------------------------------
// Test Support
// -----------------------------------------------------------------------------

/// In-memory database for tests. Single connection so the :memory: store
/// is shared across queries.
#[cfg(test)]
pub(crate) async fn memory_db() -> Database {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    let db = Database { pool };
    db.run_migrations().await.expect("migrations");
    db
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn node(name: &str) -> Node {
        let now = Utc::now();
        Node {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            node_type: "warehouse".to_string(),
            latitude: 52.52,
            longitude: 13.405,
            capacity: Some(1000),
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn product(name: &str, sku: Option<&str>) -> Product {
        let now = Utc::now();
        Product {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: None,
            unit_price: 9.99,
            weight: None,
            sku: sku.map(|s| s.to_string()),
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn shipment(source: &Node, destination: &Node) -> Shipment {
        let now = Utc::now();
        Shipment {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: source.id.clone(),
            destination_id: destination.id.clone(),
            status: "pending".to_string(),
            departure_date: None,
            estimated_arrival: None,
            actual_arrival: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn inventory_upsert_is_idempotent_on_the_pair() {
        let db = memory_db().await;
        let n = node("Berlin DC");
        let p = product("Widget", Some("SKU-1"));
        db.insert_node(&n).await.unwrap();
        db.insert_product(&p).await.unwrap();

        let now = Utc::now();
        for quantity in [5, 20, 20] {
            let inv = Inventory {
                id: uuid::Uuid::new_v4().to_string(),
                node_id: n.id.clone(),
                product_id: p.id.clone(),
                quantity,
                min_threshold: Some(10),
                max_threshold: None,
                created_at: now,
                updated_at: now,
            };
            db.upsert_inventory(&inv).await.unwrap();
        }

        let all = db.get_all_inventory().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].quantity, 20);
        assert_eq!(all[0].node_name, "Berlin DC");
        assert_eq!(all[0].product_name, "Widget");
    }

    #[tokio::test]
    async fn low_stock_ignores_rows_without_threshold() {
        let db = memory_db().await;
        let n = node("Store");
        let low = product("Low", None);
        let unbounded = product("Unbounded", None);
        db.insert_node(&n).await.unwrap();
        db.insert_product(&low).await.unwrap();
        db.insert_product(&unbounded).await.unwrap();

        let now = Utc::now();
        let mk = |product_id: &str, quantity: i64, min: Option<i64>| Inventory {
            id: uuid::Uuid::new_v4().to_string(),
            node_id: n.id.clone(),
            product_id: product_id.to_string(),
            quantity,
            min_threshold: min,
            max_threshold: None,
            created_at: now,
            updated_at: now,
        };
        db.upsert_inventory(&mk(&low.id, 5, Some(10))).await.unwrap();
        // Zero quantity but no threshold: never low stock
        db.upsert_inventory(&mk(&unbounded.id, 0, None)).await.unwrap();

        let rows = db.get_low_stock_inventory().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_id, low.id);
    }

    #[tokio::test]
    async fn deleting_a_shipment_removes_its_items() {
        let db = memory_db().await;
        let a = node("A");
        let b = node("B");
        let p = product("Crate", None);
        db.insert_node(&a).await.unwrap();
        db.insert_node(&b).await.unwrap();
        db.insert_product(&p).await.unwrap();

        let s = shipment(&a, &b);
        db.insert_shipment(&s).await.unwrap();
        db.upsert_shipment_item(&s.id, &p.id, 3).await.unwrap();
        assert_eq!(db.get_shipment_items(&s.id).await.unwrap().len(), 1);

        assert_eq!(db.delete_shipment(&s.id).await.unwrap(), 1);
        assert!(db.get_shipment_items(&s.id).await.unwrap().is_empty());
        // Second delete affects nothing
        assert_eq!(db.delete_shipment(&s.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn shipment_items_merge_by_product_last_write_wins() {
        let db = memory_db().await;
        let a = node("A");
        let b = node("B");
        let p = product("Crate", None);
        db.insert_node(&a).await.unwrap();
        db.insert_node(&b).await.unwrap();
        db.insert_product(&p).await.unwrap();

        let s = shipment(&a, &b);
        db.insert_shipment(&s).await.unwrap();
        db.upsert_shipment_item(&s.id, &p.id, 3).await.unwrap();
        db.upsert_shipment_item(&s.id, &p.id, 7).await.unwrap();

        let items = db.get_shipment_items(&s.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 7);
        assert_eq!(items[0].product_name, "Crate");
    }

    #[tokio::test]
    async fn date_range_bounds_are_inclusive_and_field_selected() {
        let db = memory_db().await;
        let a = node("A");
        let b = node("B");
        db.insert_node(&a).await.unwrap();
        db.insert_node(&b).await.unwrap();

        let day = |d: u32| Utc.with_ymd_and_hms(2026, 3, d, 12, 0, 0).unwrap();
        let mut s = shipment(&a, &b);
        s.departure_date = Some(day(10));
        s.estimated_arrival = Some(day(20));
        db.insert_shipment(&s).await.unwrap();

        // Inclusive on both bounds
        let hits = db
            .get_shipments_by_date_range(&day(10), &day(10), "departure")
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        // Same window against the estimated field misses
        let misses = db
            .get_shipments_by_date_range(&day(10), &day(10), "estimated")
            .await
            .unwrap();
        assert!(misses.is_empty());

        // Unknown field name matches nothing
        let none = db
            .get_shipments_by_date_range(&day(1), &day(28), "arrival")
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn duplicate_sku_hits_the_unique_index() {
        let db = memory_db().await;
        db.insert_product(&product("One", Some("SKU-1"))).await.unwrap();
        let err = db
            .insert_product(&product("Two", Some("SKU-1")))
            .await
            .unwrap_err();
        match err {
            sqlx::Error::Database(e) => assert!(e.is_unique_violation()),
            other => panic!("expected unique violation, got {other:?}"),
        }
        // Multiple NULL SKUs are fine
        db.insert_product(&product("Three", None)).await.unwrap();
        db.insert_product(&product("Four", None)).await.unwrap();
    }
}
