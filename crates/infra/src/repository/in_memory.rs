use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use courier_core::{CompanyId, OrderId, UserId};
use courier_orders::{
    Order, OrderPage, OrderPatch, OrderQueryParams, OrderRepository, OrderStatus, QrCode,
    RepositoryError, RepositoryResult, StatusHistoryEntry, TrackingNumber,
};

#[derive(Debug, Default)]
struct State {
    orders: HashMap<OrderId, Order>,
    qr_codes: HashMap<OrderId, QrCode>,
}

/// In-memory order repository.
///
/// Intended for tests/dev. Not optimized for performance. A single lock guards
/// every row, which makes each call trivially serialized per order.
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    state: RwLock<State>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// QR artifact stored for `order_id`, if any.
    pub fn qr_code(&self, order_id: OrderId) -> Option<QrCode> {
        self.read().ok()?.qr_codes.get(&order_id).cloned()
    }

    /// Number of stored orders, soft-deleted included.
    pub fn len(&self) -> usize {
        self.read().map(|s| s.orders.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RepositoryResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| RepositoryError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> RepositoryResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| RepositoryError::Storage("lock poisoned".to_string()))
    }

    fn sorted(mut orders: Vec<Order>) -> Vec<Order> {
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        orders
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_order(&self, order: &Order) -> RepositoryResult<()> {
        let mut state = self.write()?;

        if state.orders.contains_key(&order.id) {
            return Err(RepositoryError::Conflict(format!(
                "order {} already exists",
                order.id
            )));
        }
        if state
            .orders
            .values()
            .any(|o| o.tracking_number == order.tracking_number)
        {
            return Err(RepositoryError::Conflict(format!(
                "tracking number {} already in use",
                order.tracking_number
            )));
        }

        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn create_qr_data(&self, qr: &QrCode) -> RepositoryResult<()> {
        let mut state = self.write()?;

        if !state.orders.contains_key(&qr.order_id) {
            return Err(RepositoryError::NotFound);
        }
        if state.qr_codes.contains_key(&qr.order_id) {
            return Err(RepositoryError::Conflict(format!(
                "order {} already has a QR code",
                qr.order_id
            )));
        }

        state.qr_codes.insert(qr.order_id, qr.clone());
        Ok(())
    }

    async fn get_order_by_id(&self, id: OrderId) -> RepositoryResult<Order> {
        self.read()?
            .orders
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_order_by_tracking_number(
        &self,
        tracking_number: &TrackingNumber,
    ) -> RepositoryResult<Order> {
        self.read()?
            .orders
            .values()
            .find(|o| &o.tracking_number == tracking_number)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_order_by_qr_data(&self, qr_data: &str) -> RepositoryResult<Order> {
        let state = self.read()?;
        state
            .qr_codes
            .values()
            .find(|qr| qr.qr_data == qr_data)
            .and_then(|qr| state.orders.get(&qr.order_id))
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_orders_by_user_id(&self, user_id: UserId) -> RepositoryResult<Vec<Order>> {
        let state = self.read()?;
        let orders = state
            .orders
            .values()
            .filter(|o| o.client_id == user_id && !o.is_deleted())
            .cloned()
            .collect();
        Ok(Self::sorted(orders))
    }

    async fn get_orders(&self) -> RepositoryResult<Vec<Order>> {
        let state = self.read()?;
        let orders = state
            .orders
            .values()
            .filter(|o| !o.is_deleted())
            .cloned()
            .collect();
        Ok(Self::sorted(orders))
    }

    async fn get_orders_by_company(
        &self,
        company_id: CompanyId,
        params: &OrderQueryParams,
    ) -> RepositoryResult<OrderPage> {
        let state = self.read()?;
        let matching = Self::sorted(
            state
                .orders
                .values()
                .filter(|o| o.company_id == company_id && params.matches(o))
                .cloned()
                .collect(),
        );

        let total = matching.len() as u64;
        let orders = matching
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.limit() as usize)
            .collect();

        Ok(OrderPage { orders, total })
    }

    async fn update_order(
        &self,
        id: OrderId,
        patch: &OrderPatch,
        history: Option<&StatusHistoryEntry>,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let mut state = self.write()?;
        let order = state.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;

        order.apply_patch(patch, at);
        if let Some(entry) = history {
            order.status_history.push(entry.clone());
        }
        Ok(())
    }

    async fn soft_delete_order(&self, id: OrderId, at: DateTime<Utc>) -> RepositoryResult<()> {
        let mut state = self.write()?;
        let order = state.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        order.deleted_at = Some(at);
        Ok(())
    }

    async fn restore_order(&self, id: OrderId) -> RepositoryResult<()> {
        let mut state = self.write()?;
        let order = state.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        order.deleted_at = None;
        Ok(())
    }

    async fn change_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        history: &StatusHistoryEntry,
    ) -> RepositoryResult<()> {
        if history.status != status || history.order_id != id {
            return Err(RepositoryError::Storage(
                "history entry does not match the status change".to_string(),
            ));
        }

        let mut state = self.write()?;
        let order = state.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        order.record_status(history.clone());
        Ok(())
    }

    async fn assign_driver_to_order(
        &self,
        order_id: OrderId,
        driver_id: UserId,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let mut state = self.write()?;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(RepositoryError::NotFound)?;
        order.driver_id = Some(driver_id);
        order.updated_at = at;
        Ok(())
    }

    async fn delete_order(&self, id: OrderId) -> RepositoryResult<()> {
        let mut state = self.write()?;
        state.orders.remove(&id).ok_or(RepositoryError::NotFound)?;
        state.qr_codes.remove(&id);
        Ok(())
    }
}
