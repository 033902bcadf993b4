//! Postgres-backed order repository.
//!
//! ## Tables
//!
//! - `delivery_orders`: one row per order. Package and addresses are `jsonb`.
//! - `order_status_history`: append-only status trail, cascades on hard delete.
//! - `order_qr_codes`: one QR payload per order, cascades on hard delete.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | RepositoryError |
//! |------------|----------------------|-----------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | Database (other) | Any other | `Storage` |
//! | RowNotFound | N/A | `NotFound` |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` |
//! | Other | N/A | `Storage` |
//!
//! Row changes and their history entries are written in one transaction.
//! `update_order` locks the row (`FOR UPDATE`) while the patch is applied.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use courier_core::{BranchId, CompanyId, OrderId, StatusHistoryId, UserId};
use courier_orders::{
    DeliveryAddress, Order, OrderDetails, OrderPage, OrderPatch, OrderQueryParams,
    OrderRepository, OrderStatus, PackageDetail, PickupAddress, QrCode, RepositoryError,
    RepositoryResult, StatusHistoryEntry, TrackingNumber,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS delivery_orders (
        id                  UUID PRIMARY KEY,
        tracking_number     TEXT NOT NULL UNIQUE,
        status              TEXT NOT NULL,
        company_id          UUID NOT NULL,
        branch_id           UUID NOT NULL,
        client_id           UUID NOT NULL,
        driver_id           UUID NULL,
        price               BIGINT NOT NULL CHECK (price >= 0),
        distance_meters     BIGINT NOT NULL CHECK (distance_meters >= 0),
        pickup_time         TIMESTAMPTZ NOT NULL,
        delivery_deadline   TIMESTAMPTZ NOT NULL,
        delivered_at        TIMESTAMPTZ NULL,
        requires_signature  BOOLEAN NOT NULL DEFAULT FALSE,
        delivery_notes      TEXT NULL,
        package             JSONB NOT NULL,
        pickup_address      JSONB NOT NULL,
        delivery_address    JSONB NOT NULL,
        created_at          TIMESTAMPTZ NOT NULL,
        updated_at          TIMESTAMPTZ NOT NULL,
        deleted_at          TIMESTAMPTZ NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS delivery_orders_company_idx
        ON delivery_orders (company_id, created_at DESC)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS delivery_orders_client_idx
        ON delivery_orders (client_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_status_history (
        id           UUID PRIMARY KEY,
        order_id     UUID NOT NULL REFERENCES delivery_orders (id) ON DELETE CASCADE,
        status       TEXT NOT NULL,
        recorded_at  TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS order_status_history_order_idx
        ON order_status_history (order_id, recorded_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_qr_codes (
        order_id  UUID PRIMARY KEY REFERENCES delivery_orders (id) ON DELETE CASCADE,
        qr_data   TEXT NOT NULL UNIQUE
    )
    "#,
];

const ORDER_COLUMNS: &str = r#"
    id, tracking_number, status, company_id, branch_id, client_id, driver_id,
    price, distance_meters, pickup_time, delivery_deadline, delivered_at,
    requires_signature, delivery_notes, package, pickup_address, delivery_address,
    created_at, updated_at, deleted_at
"#;

/// Single-order lookup key.
enum Lookup<'a> {
    Id(OrderId),
    TrackingNumber(&'a str),
    QrData(&'a str),
}

impl Lookup<'_> {
    fn predicate(&self) -> &'static str {
        match self {
            Lookup::Id(_) => "id = $1",
            Lookup::TrackingNumber(_) => "tracking_number = $1",
            Lookup::QrData(_) => "id = (SELECT order_id FROM order_qr_codes WHERE qr_data = $1)",
        }
    }
}

/// Postgres-backed order repository.
///
/// `Send + Sync`; cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct PostgresOrderRepository {
    pool: Arc<PgPool>,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> RepositoryResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    async fn begin(&self) -> RepositoryResult<Transaction<'_, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }

    async fn fetch_one(&self, operation: &str, lookup: Lookup<'_>) -> RepositoryResult<Order> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM delivery_orders WHERE {}",
            lookup.predicate()
        );
        let query = sqlx::query(&sql);
        let query = match lookup {
            Lookup::Id(id) => query.bind(*id.as_uuid()),
            Lookup::TrackingNumber(value) | Lookup::QrData(value) => query.bind(value),
        };
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?
            .ok_or(RepositoryError::NotFound)?;

        let mut orders = self.hydrate(operation, vec![row]).await?;
        orders.pop().ok_or(RepositoryError::NotFound)
    }

    /// Decode order rows and attach their status history.
    async fn hydrate(&self, operation: &str, rows: Vec<PgRow>) -> RepositoryResult<Vec<Order>> {
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let order_row = OrderRow::from_row(&row).map_err(|e| {
                RepositoryError::Storage(format!("failed to deserialize order row: {}", e))
            })?;
            orders.push(order_row.into_order()?);
        }
        if orders.is_empty() {
            return Ok(orders);
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| *o.id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, status, recorded_at
            FROM order_status_history
            WHERE order_id = ANY($1)
            ORDER BY recorded_at ASC, id ASC
            "#,
        )
        .bind(&ids[..])
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?;

        let mut history: HashMap<OrderId, Vec<StatusHistoryEntry>> = HashMap::new();
        for row in rows {
            let entry = HistoryRow::from_row(&row)
                .map_err(|e| {
                    RepositoryError::Storage(format!("failed to deserialize history row: {}", e))
                })?
                .into_entry()?;
            history.entry(entry.order_id).or_default().push(entry);
        }

        for order in &mut orders {
            order.status_history = history.remove(&order.id).unwrap_or_default();
        }
        Ok(orders)
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    #[instrument(
        skip_all,
        fields(order_id = %order.id, tracking_number = %order.tracking_number),
        err
    )]
    async fn create_order(&self, order: &Order) -> RepositoryResult<()> {
        let mut tx = self.begin().await?;

        let sql = format!(
            "INSERT INTO delivery_orders ({ORDER_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)"
        );
        sqlx::query(&sql)
            .bind(order.id.as_uuid())
            .bind(order.tracking_number.as_str())
            .bind(order.status.as_str())
            .bind(order.company_id.as_uuid())
            .bind(order.branch_id.as_uuid())
            .bind(order.client_id.as_uuid())
            .bind(order.driver_id.map(Uuid::from))
            .bind(to_db_int("price", order.details.price)?)
            .bind(to_db_int("distance_meters", order.details.distance_meters)?)
            .bind(order.details.pickup_time)
            .bind(order.details.delivery_deadline)
            .bind(order.details.delivered_at)
            .bind(order.details.requires_signature)
            .bind(order.details.delivery_notes.as_deref())
            .bind(Json(&order.package))
            .bind(Json(&order.pickup_address))
            .bind(Json(&order.delivery_address))
            .bind(order.created_at)
            .bind(order.updated_at)
            .bind(order.deleted_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order", e))?;

        for entry in &order.status_history {
            insert_history(&mut tx, entry).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip_all, fields(order_id = %qr.order_id), err)]
    async fn create_qr_data(&self, qr: &QrCode) -> RepositoryResult<()> {
        sqlx::query("INSERT INTO order_qr_codes (order_id, qr_data) VALUES ($1, $2)")
            .bind(qr.order_id.as_uuid())
            .bind(&qr.qr_data)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_qr_data", e))?;
        Ok(())
    }

    #[instrument(skip_all, fields(order_id = %id), err)]
    async fn get_order_by_id(&self, id: OrderId) -> RepositoryResult<Order> {
        self.fetch_one("get_order_by_id", Lookup::Id(id)).await
    }

    #[instrument(skip_all, fields(tracking_number = %tracking_number), err)]
    async fn get_order_by_tracking_number(
        &self,
        tracking_number: &TrackingNumber,
    ) -> RepositoryResult<Order> {
        self.fetch_one(
            "get_order_by_tracking_number",
            Lookup::TrackingNumber(tracking_number.as_str()),
        )
        .await
    }

    #[instrument(skip(self, qr_data), err)]
    async fn get_order_by_qr_data(&self, qr_data: &str) -> RepositoryResult<Order> {
        self.fetch_one("get_order_by_qr_data", Lookup::QrData(qr_data))
            .await
    }

    #[instrument(skip_all, fields(client_id = %user_id, order_count), err)]
    async fn get_orders_by_user_id(&self, user_id: UserId) -> RepositoryResult<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM delivery_orders \
             WHERE client_id = $1 AND deleted_at IS NULL \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_orders_by_user_id", e))?;

        let orders = self.hydrate("get_orders_by_user_id", rows).await?;
        Span::current().record("order_count", orders.len());
        Ok(orders)
    }

    #[instrument(skip_all, fields(order_count), err)]
    async fn get_orders(&self) -> RepositoryResult<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM delivery_orders \
             WHERE deleted_at IS NULL \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_orders", e))?;

        let orders = self.hydrate("get_orders", rows).await?;
        Span::current().record("order_count", orders.len());
        Ok(orders)
    }

    #[instrument(
        skip_all,
        fields(company_id = %company_id, page = params.page, page_size = params.page_size, total),
        err
    )]
    async fn get_orders_by_company(
        &self,
        company_id: CompanyId,
        params: &OrderQueryParams,
    ) -> RepositoryResult<OrderPage> {
        const FILTER: &str = "company_id = $1 \
             AND ($2::TEXT IS NULL OR status = $2) \
             AND ($3 OR deleted_at IS NULL)";

        let status = params.status.map(|s| s.as_str());

        let count_sql = format!("SELECT COUNT(*) AS total FROM delivery_orders WHERE {FILTER}");
        let total: i64 = sqlx::query(&count_sql)
            .bind(company_id.as_uuid())
            .bind(status)
            .bind(params.include_deleted)
            .fetch_one(&*self.pool)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(|e| map_sqlx_error("count_orders_by_company", e))?;

        let offset = i64::try_from(params.offset())
            .map_err(|_| RepositoryError::Storage("page offset out of range".to_string()))?;
        let page_sql = format!(
            "SELECT {ORDER_COLUMNS} FROM delivery_orders WHERE {FILTER} \
             ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5"
        );
        let rows = sqlx::query(&page_sql)
            .bind(company_id.as_uuid())
            .bind(status)
            .bind(params.include_deleted)
            .bind(i64::from(params.limit()))
            .bind(offset)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_orders_by_company", e))?;

        let orders = self.hydrate("get_orders_by_company", rows).await?;
        let total = from_db_int("total", total)?;
        Span::current().record("total", total);
        Ok(OrderPage { orders, total })
    }

    #[instrument(skip_all, fields(order_id = %id), err)]
    async fn update_order(
        &self,
        id: OrderId,
        patch: &OrderPatch,
        history: Option<&StatusHistoryEntry>,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let mut tx = self.begin().await?;

        let sql = format!("SELECT {ORDER_COLUMNS} FROM delivery_orders WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_order", e))?
            .ok_or(RepositoryError::NotFound)?;

        let mut order = OrderRow::from_row(&row)
            .map_err(|e| RepositoryError::Storage(format!("failed to deserialize order row: {}", e)))?
            .into_order()?;
        order.apply_patch(patch, at);

        sqlx::query(
            r#"
            UPDATE delivery_orders SET
                status = $2,
                price = $3,
                distance_meters = $4,
                pickup_time = $5,
                delivery_deadline = $6,
                delivered_at = $7,
                requires_signature = $8,
                delivery_notes = $9,
                package = $10,
                pickup_address = $11,
                delivery_address = $12,
                updated_at = $13
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(order.status.as_str())
        .bind(to_db_int("price", order.details.price)?)
        .bind(to_db_int("distance_meters", order.details.distance_meters)?)
        .bind(order.details.pickup_time)
        .bind(order.details.delivery_deadline)
        .bind(order.details.delivered_at)
        .bind(order.details.requires_signature)
        .bind(order.details.delivery_notes.as_deref())
        .bind(Json(&order.package))
        .bind(Json(&order.pickup_address))
        .bind(Json(&order.delivery_address))
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_order", e))?;

        if let Some(entry) = history {
            insert_history(&mut tx, entry).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip_all, fields(order_id = %id), err)]
    async fn soft_delete_order(&self, id: OrderId, at: DateTime<Utc>) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE delivery_orders SET deleted_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("soft_delete_order", e))?;
        expect_row(result.rows_affected())
    }

    #[instrument(skip_all, fields(order_id = %id), err)]
    async fn restore_order(&self, id: OrderId) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE delivery_orders SET deleted_at = NULL WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("restore_order", e))?;
        expect_row(result.rows_affected())
    }

    #[instrument(skip_all, fields(order_id = %id, status = %status), err)]
    async fn change_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        history: &StatusHistoryEntry,
    ) -> RepositoryResult<()> {
        let mut tx = self.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE delivery_orders SET
                status = $2,
                updated_at = $3,
                delivered_at = CASE WHEN $2 = 'DELIVERED' THEN $3 ELSE delivered_at END
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(history.recorded_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("change_status", e))?;
        expect_row(result.rows_affected())?;

        insert_history(&mut tx, history).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip_all, fields(order_id = %order_id, driver_id = %driver_id), err)]
    async fn assign_driver_to_order(
        &self,
        order_id: OrderId,
        driver_id: UserId,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE delivery_orders SET driver_id = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(order_id.as_uuid())
        .bind(driver_id.as_uuid())
        .bind(at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("assign_driver_to_order", e))?;
        expect_row(result.rows_affected())
    }

    #[instrument(skip_all, fields(order_id = %id), err)]
    async fn delete_order(&self, id: OrderId) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM delivery_orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_order", e))?;
        expect_row(result.rows_affected())
    }
}

async fn insert_history(
    tx: &mut Transaction<'_, Postgres>,
    entry: &StatusHistoryEntry,
) -> RepositoryResult<()> {
    sqlx::query(
        "INSERT INTO order_status_history (id, order_id, status, recorded_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(entry.id.as_uuid())
    .bind(entry.order_id.as_uuid())
    .bind(entry.status.as_str())
    .bind(entry.recorded_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_status_history", e))?;
    Ok(())
}

fn expect_row(rows_affected: u64) -> RepositoryResult<()> {
    if rows_affected == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

fn to_db_int(column: &str, value: u64) -> RepositoryResult<i64> {
    i64::try_from(value)
        .map_err(|_| RepositoryError::Storage(format!("{column} out of range: {value}")))
}

fn from_db_int(column: &str, value: i64) -> RepositoryResult<u64> {
    u64::try_from(value)
        .map_err(|_| RepositoryError::Storage(format!("negative {column} in storage: {value}")))
}

fn parse_status(value: &str) -> RepositoryResult<OrderStatus> {
    OrderStatus::from_str(value)
        .map_err(|e| RepositoryError::Storage(format!("unknown status in storage: {e}")))
}

/// Map SQLx errors to repository errors.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => RepositoryError::Conflict(msg),
                // Foreign key: the referenced order is gone.
                Some("23503") => RepositoryError::NotFound,
                _ => RepositoryError::Storage(msg),
            }
        }
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::PoolClosed => {
            RepositoryError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            RepositoryError::Unavailable(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::Io(e) => RepositoryError::Unavailable(format!("io error in {}: {}", operation, e)),
        _ => RepositoryError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[derive(Debug)]
struct OrderRow {
    id: Uuid,
    tracking_number: String,
    status: String,
    company_id: Uuid,
    branch_id: Uuid,
    client_id: Uuid,
    driver_id: Option<Uuid>,
    price: i64,
    distance_meters: i64,
    pickup_time: DateTime<Utc>,
    delivery_deadline: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
    requires_signature: bool,
    delivery_notes: Option<String>,
    package: Json<PackageDetail>,
    pickup_address: Json<PickupAddress>,
    delivery_address: Json<DeliveryAddress>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tracking_number: row.try_get("tracking_number")?,
            status: row.try_get("status")?,
            company_id: row.try_get("company_id")?,
            branch_id: row.try_get("branch_id")?,
            client_id: row.try_get("client_id")?,
            driver_id: row.try_get("driver_id")?,
            price: row.try_get("price")?,
            distance_meters: row.try_get("distance_meters")?,
            pickup_time: row.try_get("pickup_time")?,
            delivery_deadline: row.try_get("delivery_deadline")?,
            delivered_at: row.try_get("delivered_at")?,
            requires_signature: row.try_get("requires_signature")?,
            delivery_notes: row.try_get("delivery_notes")?,
            package: row.try_get("package")?,
            pickup_address: row.try_get("pickup_address")?,
            delivery_address: row.try_get("delivery_address")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

impl OrderRow {
    /// Status history is attached separately.
    fn into_order(self) -> RepositoryResult<Order> {
        let tracking_number = TrackingNumber::parse(self.tracking_number).map_err(|e| {
            RepositoryError::Storage(format!("malformed tracking number in storage: {e}"))
        })?;

        Ok(Order {
            id: OrderId::from_uuid(self.id),
            tracking_number,
            status: parse_status(&self.status)?,
            status_history: Vec::new(),
            company_id: CompanyId::from_uuid(self.company_id),
            branch_id: BranchId::from_uuid(self.branch_id),
            client_id: UserId::from_uuid(self.client_id),
            driver_id: self.driver_id.map(UserId::from_uuid),
            details: OrderDetails {
                price: from_db_int("price", self.price)?,
                distance_meters: from_db_int("distance_meters", self.distance_meters)?,
                pickup_time: self.pickup_time,
                delivery_deadline: self.delivery_deadline,
                delivered_at: self.delivered_at,
                requires_signature: self.requires_signature,
                delivery_notes: self.delivery_notes,
            },
            package: self.package.0,
            pickup_address: self.pickup_address.0,
            delivery_address: self.delivery_address.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

#[derive(Debug)]
struct HistoryRow {
    id: Uuid,
    order_id: Uuid,
    status: String,
    recorded_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for HistoryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            status: row.try_get("status")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

impl HistoryRow {
    fn into_entry(self) -> RepositoryResult<StatusHistoryEntry> {
        Ok(StatusHistoryEntry {
            id: StatusHistoryId::from_uuid(self.id),
            order_id: OrderId::from_uuid(self.order_id),
            status: parse_status(&self.status)?,
            recorded_at: self.recorded_at,
        })
    }
}

#[cfg(test)]
mod tests {
    //! These tests need a live database: set `DATABASE_URL` and run with
    //! `cargo test -- --ignored`.

    use super::*;
    use chrono::TimeZone;
    use courier_orders::{NewOrder, TrackingNumberGenerator, qr_payload};
    use sqlx::postgres::PgPoolOptions;

    async fn repository() -> PostgresOrderRepository {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("connect");
        let repo = PostgresOrderRepository::new(pool);
        repo.ensure_schema().await.expect("schema");
        repo
    }

    fn order() -> Order {
        let pickup = Utc.with_ymd_and_hms(2025, 5, 15, 14, 30, 0).unwrap();
        let validated = NewOrder {
            company_id: Some(CompanyId::new()),
            branch_id: Some(BranchId::new()),
            client_id: Some(UserId::new()),
            price: 1_200,
            distance_meters: 3_000,
            pickup_time: Some(pickup),
            delivery_deadline: Some(pickup + chrono::Duration::hours(1)),
            package: Some(PackageDetail::default()),
            pickup_address: Some(PickupAddress {
                contact_name: "Jane Smith".to_string(),
                contact_phone: "+15550100".to_string(),
                address_line1: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                state: "IL".to_string(),
                ..PickupAddress::default()
            }),
            delivery_address: Some(DeliveryAddress {
                recipient_name: "John Doe".to_string(),
                recipient_phone: "+15550101".to_string(),
                address_line1: "9 Elm St".to_string(),
                city: "Springfield".to_string(),
                state: "IL".to_string(),
                ..DeliveryAddress::default()
            }),
            ..NewOrder::default()
        }
        .validate()
        .expect("valid");

        let id = OrderId::new();
        let initial = StatusHistoryEntry {
            id: StatusHistoryId::new(),
            order_id: id,
            status: OrderStatus::Pending,
            recorded_at: pickup,
        };
        let tracking = TrackingNumberGenerator::default().generate(Utc::now());
        Order::create(id, tracking, initial, validated)
    }

    #[tokio::test]
    #[ignore]
    async fn create_then_read_back_by_every_key() {
        let repo = repository().await;
        let order = order();
        repo.create_order(&order).await.unwrap();
        let qr = qr_payload(&order);
        repo.create_qr_data(&qr).await.unwrap();

        assert_eq!(repo.get_order_by_id(order.id).await.unwrap(), order);
        assert_eq!(
            repo.get_order_by_tracking_number(&order.tracking_number)
                .await
                .unwrap()
                .id,
            order.id
        );
        assert_eq!(repo.get_order_by_qr_data(&qr.qr_data).await.unwrap().id, order.id);

        repo.delete_order(order.id).await.unwrap();
        assert_eq!(
            repo.get_order_by_id(order.id).await.unwrap_err(),
            RepositoryError::NotFound
        );
    }

    #[tokio::test]
    #[ignore]
    async fn change_status_appends_history_in_one_transaction() {
        let repo = repository().await;
        let order = order();
        repo.create_order(&order).await.unwrap();

        let entry = StatusHistoryEntry {
            id: StatusHistoryId::new(),
            order_id: order.id,
            status: OrderStatus::Accepted,
            recorded_at: order.created_at + chrono::Duration::minutes(5),
        };
        repo.change_status(order.id, OrderStatus::Accepted, &entry)
            .await
            .unwrap();

        let stored = repo.get_order_by_id(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Accepted);
        assert_eq!(stored.status_history.len(), 2);
        assert_eq!(stored.status_history[1], entry);

        repo.delete_order(order.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn mutations_on_missing_order_report_not_found() {
        let repo = repository().await;
        let missing = OrderId::new();

        assert_eq!(
            repo.soft_delete_order(missing, Utc::now()).await.unwrap_err(),
            RepositoryError::NotFound
        );
        assert_eq!(
            repo.assign_driver_to_order(missing, UserId::new(), Utc::now())
                .await
                .unwrap_err(),
            RepositoryError::NotFound
        );
        assert_eq!(
            repo.create_qr_data(&QrCode {
                order_id: missing,
                qr_data: "DEL-250515-0001".to_string(),
            })
            .await
            .unwrap_err(),
            RepositoryError::NotFound
        );
    }
}
