//! Persistence port consumed by the order lifecycle engine.
//!
//! The engine depends on this trait and never implements it. Adapters live in
//! `courier-infra` (in-memory for tests/dev, Postgres for production).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use courier_core::{CompanyId, OrderId, UserId};

use crate::identifier::TrackingNumber;
use crate::order::{Order, OrderPage, OrderPatch, OrderQueryParams, QrCode, StatusHistoryEntry};
use crate::status::OrderStatus;

/// Repository operation error.
///
/// `NotFound` must be distinguishable from every other failure so the engine
/// can report it as such instead of as a storage failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("no matching row")]
    NotFound,

    /// Unique/natural-key violation (e.g. duplicate tracking number).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage unreachable, pool closed, or the call timed out.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Order persistence port.
///
/// ## Contract
///
/// - Single-order reads return soft-deleted rows too; callers inspect
///   `deleted_at`.
/// - List reads exclude soft-deleted rows (company listing honours
///   `OrderQueryParams::include_deleted`).
/// - Mutations on a missing id return `RepositoryError::NotFound`.
/// - `change_status` and `update_order` persist the row change and the history
///   entry together.
/// - Every mutation stamps `updated_at` with the `at` it is given (or the
///   history entry's `recorded_at`); adapters never read their own clock.
/// - Concurrency control per row (locking or versioning) is the adapter's
///   concern; the engine performs plain read-then-write.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create_order(&self, order: &Order) -> RepositoryResult<()>;

    async fn create_qr_data(&self, qr: &QrCode) -> RepositoryResult<()>;

    async fn get_order_by_id(&self, id: OrderId) -> RepositoryResult<Order>;

    async fn get_order_by_tracking_number(
        &self,
        tracking_number: &TrackingNumber,
    ) -> RepositoryResult<Order>;

    async fn get_order_by_qr_data(&self, qr_data: &str) -> RepositoryResult<Order>;

    /// Orders placed by a client.
    async fn get_orders_by_user_id(&self, user_id: UserId) -> RepositoryResult<Vec<Order>>;

    async fn get_orders(&self) -> RepositoryResult<Vec<Order>>;

    async fn get_orders_by_company(
        &self,
        company_id: CompanyId,
        params: &OrderQueryParams,
    ) -> RepositoryResult<OrderPage>;

    /// Apply `patch` to the stored order at `at`. `history` is set when the
    /// patch changes the status.
    async fn update_order(
        &self,
        id: OrderId,
        patch: &OrderPatch,
        history: Option<&StatusHistoryEntry>,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    async fn soft_delete_order(&self, id: OrderId, at: DateTime<Utc>) -> RepositoryResult<()>;

    async fn restore_order(&self, id: OrderId) -> RepositoryResult<()>;

    async fn change_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        history: &StatusHistoryEntry,
    ) -> RepositoryResult<()>;

    async fn assign_driver_to_order(
        &self,
        order_id: OrderId,
        driver_id: UserId,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    /// Hard delete (administrative). Removes the order, its history and its QR row.
    async fn delete_order(&self, id: OrderId) -> RepositoryResult<()>;
}

#[async_trait]
impl<R> OrderRepository for Arc<R>
where
    R: OrderRepository + ?Sized,
{
    async fn create_order(&self, order: &Order) -> RepositoryResult<()> {
        (**self).create_order(order).await
    }

    async fn create_qr_data(&self, qr: &QrCode) -> RepositoryResult<()> {
        (**self).create_qr_data(qr).await
    }

    async fn get_order_by_id(&self, id: OrderId) -> RepositoryResult<Order> {
        (**self).get_order_by_id(id).await
    }

    async fn get_order_by_tracking_number(
        &self,
        tracking_number: &TrackingNumber,
    ) -> RepositoryResult<Order> {
        (**self).get_order_by_tracking_number(tracking_number).await
    }

    async fn get_order_by_qr_data(&self, qr_data: &str) -> RepositoryResult<Order> {
        (**self).get_order_by_qr_data(qr_data).await
    }

    async fn get_orders_by_user_id(&self, user_id: UserId) -> RepositoryResult<Vec<Order>> {
        (**self).get_orders_by_user_id(user_id).await
    }

    async fn get_orders(&self) -> RepositoryResult<Vec<Order>> {
        (**self).get_orders().await
    }

    async fn get_orders_by_company(
        &self,
        company_id: CompanyId,
        params: &OrderQueryParams,
    ) -> RepositoryResult<OrderPage> {
        (**self).get_orders_by_company(company_id, params).await
    }

    async fn update_order(
        &self,
        id: OrderId,
        patch: &OrderPatch,
        history: Option<&StatusHistoryEntry>,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        (**self).update_order(id, patch, history, at).await
    }

    async fn soft_delete_order(&self, id: OrderId, at: DateTime<Utc>) -> RepositoryResult<()> {
        (**self).soft_delete_order(id, at).await
    }

    async fn restore_order(&self, id: OrderId) -> RepositoryResult<()> {
        (**self).restore_order(id).await
    }

    async fn change_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        history: &StatusHistoryEntry,
    ) -> RepositoryResult<()> {
        (**self).change_status(id, status, history).await
    }

    async fn assign_driver_to_order(
        &self,
        order_id: OrderId,
        driver_id: UserId,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        (**self).assign_driver_to_order(order_id, driver_id, at).await
    }

    async fn delete_order(&self, id: OrderId) -> RepositoryResult<()> {
        (**self).delete_order(id).await
    }
}
