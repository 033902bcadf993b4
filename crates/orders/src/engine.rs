//! Order lifecycle engine (application-level orchestration).
//!
//! The engine is the only place where order lifecycle rules are enforced:
//!
//! ```text
//! caller (HTTP / CLI)
//!   ↓
//! OrderLifecycleEngine  ── StatusGraph (legal transitions, update/delete sets)
//!   ↓                   ── TrackingNumberGenerator, Clock, IdGenerator
//! OrderRepository (port)
//! ```
//!
//! ## Guard ordering
//!
//! Each mutating operation loads the order once and then checks, in order:
//! soft-deletion, status validity, existence, rule tables. A caller always
//! receives the most specific applicable error.
//!
//! ## Concurrency
//!
//! The engine holds no mutable state and performs plain read-then-write against
//! the repository. Two concurrent `change_status` calls on the same order are
//! serialized (or not) by the adapter. Dropping an operation's future cancels
//! the in-flight repository call; nothing is spawned and nothing is retried.
//!
//! ## Partial failure
//!
//! `create_order` writes the order and then its QR artifact. If the second
//! write fails the first is not rolled back; the error is surfaced as a
//! `create_order` persistence failure and the caller should re-check by
//! tracking number.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{Span, error, info, instrument, warn};

use courier_core::{
    Clock, CompanyId, DomainResult, IdGenerator, OrderId, StatusHistoryId, SystemClock, UserId,
    UuidV7Generator,
};

use crate::error::{ErrorKind, Operation, OrderError, OrderResult};
use crate::identifier::{DEFAULT_TRACKING_PREFIX, TrackingNumber, TrackingNumberGenerator, qr_payload};
use crate::order::{NewOrder, Order, OrderPage, OrderPatch, OrderQueryParams, StatusHistoryEntry};
use crate::repository::{OrderRepository, RepositoryError, RepositoryResult};
use crate::status::{OrderStatus, StatusGraph};

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tracking-number prefix (2–8 upper-case letters).
    pub tracking_prefix: String,
    /// Per repository call deadline. `None` waits indefinitely.
    pub storage_timeout_ms: Option<u64>,
    /// Enforce the transition graph when `update_order` changes the status.
    pub guard_update_transitions: bool,
    /// Reject driver assignment on deleted or terminal orders.
    pub guard_driver_assignment: bool,
}

impl EngineConfig {
    pub fn storage_timeout(&self) -> Option<Duration> {
        self.storage_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tracking_prefix: DEFAULT_TRACKING_PREFIX.to_string(),
            storage_timeout_ms: None,
            guard_update_transitions: true,
            guard_driver_assignment: false,
        }
    }
}

/// Creates orders, enforces status-transition legality and guards
/// update/delete against the order's lifecycle state.
#[derive(Debug)]
pub struct OrderLifecycleEngine<R, C = SystemClock, G = UuidV7Generator> {
    repo: R,
    graph: StatusGraph,
    tracking: TrackingNumberGenerator,
    clock: C,
    ids: G,
    config: EngineConfig,
}

impl<R> OrderLifecycleEngine<R>
where
    R: OrderRepository,
{
    /// Engine on the wall clock and UUIDv7 ids.
    pub fn new(repo: R, config: EngineConfig) -> DomainResult<Self> {
        Self::with_parts(repo, SystemClock, UuidV7Generator, config)
    }
}

impl<R, C, G> OrderLifecycleEngine<R, C, G>
where
    R: OrderRepository,
    C: Clock,
    G: IdGenerator,
{
    pub fn with_parts(repo: R, clock: C, ids: G, config: EngineConfig) -> DomainResult<Self> {
        let tracking = TrackingNumberGenerator::new(config.tracking_prefix.clone())?;
        Ok(Self {
            repo,
            graph: StatusGraph::standard().clone(),
            tracking,
            clock,
            ids,
            config,
        })
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate, stamp and persist a new order together with its QR artifact.
    ///
    /// The returned order is `PENDING` with exactly one history entry.
    #[instrument(
        skip(self, new_order),
        fields(order_id = tracing::field::Empty, tracking_number = tracing::field::Empty)
    )]
    pub async fn create_order(&self, new_order: NewOrder) -> OrderResult<Order> {
        let op = Operation::CreateOrder;

        let validated = new_order.validate().map_err(|err| {
            warn!(error = %err, "rejecting order creation");
            OrderError::from_domain(op, err)
        })?;

        let now = self.clock.now();
        let id = OrderId::from_uuid(self.ids.next_uuid());
        let initial = self.history_entry(id, OrderStatus::Pending);
        let tracking_number = self.tracking.generate(now);
        let order = Order::create(id, tracking_number, initial, validated);

        let span = Span::current();
        span.record("order_id", tracing::field::display(order.id));
        span.record("tracking_number", order.tracking_number.as_str());

        self.call(self.repo.create_order(&order))
            .await
            .map_err(|err| {
                error!(error = %err, "failed to persist order");
                OrderError::from_repository(op, &order.tracking_number, err)
            })?;

        let qr = qr_payload(&order);
        self.call(self.repo.create_qr_data(&qr))
            .await
            .map_err(|err| {
                error!(error = %err, "order row committed but QR persistence failed");
                OrderError::from_repository(op, &order.tracking_number, err)
            })?;

        info!(company_id = %order.company_id, "order created");
        Ok(order)
    }

    #[instrument(skip_all, fields(order_id = %id))]
    pub async fn get_order_by_id(&self, id: OrderId) -> OrderResult<Order> {
        self.load(Operation::GetOrderById, id).await
    }

    #[instrument(skip_all, fields(tracking_number = %tracking_number))]
    pub async fn get_order_by_tracking_number(
        &self,
        tracking_number: &TrackingNumber,
    ) -> OrderResult<Order> {
        self.call(self.repo.get_order_by_tracking_number(tracking_number))
            .await
            .map_err(|err| self.read_failure(Operation::GetOrderByTrackingNumber, tracking_number, err))
    }

    #[instrument(skip(self))]
    pub async fn get_order_by_qr_data(&self, qr_data: &str) -> OrderResult<Order> {
        self.call(self.repo.get_order_by_qr_data(qr_data))
            .await
            .map_err(|err| self.read_failure(Operation::GetOrderByQrData, qr_data, err))
    }

    #[instrument(skip(self))]
    pub async fn get_orders(&self) -> OrderResult<Vec<Order>> {
        self.call(self.repo.get_orders())
            .await
            .map_err(|err| self.read_failure(Operation::GetOrders, "all orders", err))
    }

    #[instrument(skip_all, fields(client_id = %client_id))]
    pub async fn get_orders_by_client_id(&self, client_id: UserId) -> OrderResult<Vec<Order>> {
        self.call(self.repo.get_orders_by_user_id(client_id))
            .await
            .map_err(|err| self.read_failure(Operation::GetOrdersByClientId, client_id, err))
    }

    /// One page of a company's orders plus the total match count.
    #[instrument(skip_all, fields(company_id = %company_id, page = params.page))]
    pub async fn get_orders_by_company(
        &self,
        company_id: CompanyId,
        params: &OrderQueryParams,
    ) -> OrderResult<OrderPage> {
        self.call(self.repo.get_orders_by_company(company_id, params))
            .await
            .map_err(|err| self.read_failure(Operation::GetOrdersByCompany, company_id, err))
    }

    /// Move an order along the workflow and record the new status.
    ///
    /// Fails, in order of precedence, with `OrderDeleted`, `InvalidStatus`,
    /// `NotFound`/`Persistence`, `IllegalTransition`.
    #[instrument(skip_all, fields(order_id = %id, to = new_status))]
    pub async fn change_status(
        &self,
        id: OrderId,
        new_status: &str,
    ) -> OrderResult<StatusHistoryEntry> {
        let op = Operation::ChangeStatus;
        let loaded = self.call(self.repo.get_order_by_id(id)).await;

        if matches!(&loaded, Ok(order) if order.is_deleted()) {
            warn!("refusing status change on deleted order");
            return Err(OrderError::new(op, ErrorKind::OrderDeleted(id)));
        }

        let target = match new_status.parse::<OrderStatus>() {
            Ok(status) if self.graph.is_known(status) => status,
            _ => {
                warn!("invalid order status");
                return Err(OrderError::new(
                    op,
                    ErrorKind::InvalidStatus(new_status.to_string()),
                ));
            }
        };

        let order = loaded.map_err(|err| self.read_failure(op, id, err))?;

        if !self.graph.can_transition(order.status, target) {
            warn!(from = %order.status, "illegal status transition");
            return Err(OrderError::new(
                op,
                ErrorKind::IllegalTransition {
                    from: order.status,
                    to: target,
                },
            ));
        }

        let entry = self.history_entry(id, target);
        self.call(self.repo.change_status(id, target, &entry))
            .await
            .map_err(|err| self.write_failure(op, id, err))?;

        info!(from = %order.status, "order status changed");
        Ok(entry)
    }

    /// Apply a field-level patch.
    ///
    /// A status in the patch requires both the current and the target status to
    /// belong to the updatable set. When it differs from the current status and
    /// `guard_update_transitions` is on, the transition graph applies as well;
    /// either way a history entry is recorded. The merged schedule must keep
    /// `delivery_deadline >= pickup_time`.
    #[instrument(skip_all, fields(order_id = %id, status = ?patch.status))]
    pub async fn update_order(&self, id: OrderId, patch: OrderPatch) -> OrderResult<()> {
        let op = Operation::UpdateOrder;
        let order = self.load(op, id).await?;

        if order.is_deleted() {
            warn!("refusing update on deleted order");
            return Err(OrderError::new(op, ErrorKind::OrderDeleted(id)));
        }

        let now = self.clock.now();
        let mut history = None;
        if let Some(status) = patch.status {
            if !self.graph.can_update(order.status) {
                warn!(current = %order.status, "order is closed to status updates");
                return Err(OrderError::new(
                    op,
                    ErrorKind::CannotUpdate {
                        id,
                        status: order.status,
                    },
                ));
            }

            if !self.graph.can_update(status) {
                warn!("status does not allow updates");
                return Err(OrderError::new(op, ErrorKind::CannotUpdate { id, status }));
            }

            if status != order.status {
                if self.config.guard_update_transitions
                    && !self.graph.can_transition(order.status, status)
                {
                    warn!(from = %order.status, "illegal status transition via update");
                    return Err(OrderError::new(
                        op,
                        ErrorKind::IllegalTransition {
                            from: order.status,
                            to: status,
                        },
                    ));
                }
                history = Some(self.history_entry_at(id, status, now));
            }
        }

        patch.validate(&order.details).map_err(|err| {
            warn!(error = %err, "rejecting malformed patch");
            OrderError::from_domain(op, err)
        })?;

        self.call(self.repo.update_order(id, &patch, history.as_ref(), now))
            .await
            .map_err(|err| self.write_failure(op, id, err))?;

        info!("order updated");
        Ok(())
    }

    #[instrument(skip_all, fields(order_id = %id))]
    pub async fn soft_delete_order(&self, id: OrderId) -> OrderResult<()> {
        let op = Operation::SoftDeleteOrder;
        let order = self.load(op, id).await?;

        if order.is_deleted() {
            warn!("order is already deleted");
            return Err(OrderError::new(op, ErrorKind::AlreadyDeleted(id)));
        }

        let now = self.clock.now();
        self.call(self.repo.soft_delete_order(id, now))
            .await
            .map_err(|err| self.write_failure(op, id, err))?;

        info!("order soft-deleted");
        Ok(())
    }

    #[instrument(skip_all, fields(order_id = %id))]
    pub async fn restore_order(&self, id: OrderId) -> OrderResult<()> {
        let op = Operation::RestoreOrder;
        let order = self.load(op, id).await?;

        if !order.is_deleted() {
            warn!("order is not deleted");
            return Err(OrderError::new(op, ErrorKind::NotDeleted(id)));
        }

        self.call(self.repo.restore_order(id))
            .await
            .map_err(|err| self.write_failure(op, id, err))?;

        info!("order restored");
        Ok(())
    }

    /// Precondition check for the administrative hard delete. Never mutates.
    #[instrument(skip_all, fields(order_id = %id))]
    pub async fn is_available_for_delete(&self, id: OrderId) -> OrderResult<()> {
        let op = Operation::IsAvailableForDelete;
        let order = self.load(op, id).await?;

        if order.is_deleted() {
            warn!(deleted_at = ?order.deleted_at, "order is already deleted");
            return Err(OrderError::new(op, ErrorKind::AlreadyDeleted(id)));
        }

        if !self.graph.can_delete(order.status) {
            warn!(status = %order.status, "status does not allow deletion");
            return Err(OrderError::new(
                op,
                ErrorKind::CannotDelete {
                    id,
                    status: order.status,
                },
            ));
        }

        Ok(())
    }

    /// Assign (or reassign) a driver. Unguarded unless `guard_driver_assignment`.
    #[instrument(skip_all, fields(order_id = %order_id, driver_id = %driver_id))]
    pub async fn assign_driver_to_order(
        &self,
        order_id: OrderId,
        driver_id: UserId,
    ) -> OrderResult<()> {
        let op = Operation::AssignDriverToOrder;

        if self.config.guard_driver_assignment {
            let order = self.load(op, order_id).await?;
            if order.is_deleted() {
                warn!("refusing driver assignment on deleted order");
                return Err(OrderError::new(op, ErrorKind::OrderDeleted(order_id)));
            }
            if order.status.is_terminal() {
                warn!(status = %order.status, "refusing driver assignment on closed order");
                return Err(OrderError::new(
                    op,
                    ErrorKind::CannotUpdate {
                        id: order_id,
                        status: order.status,
                    },
                ));
            }
        }

        let now = self.clock.now();
        self.call(self.repo.assign_driver_to_order(order_id, driver_id, now))
            .await
            .map_err(|err| self.write_failure(op, order_id, err))?;

        info!("driver assigned");
        Ok(())
    }

    async fn load(&self, op: Operation, id: OrderId) -> OrderResult<Order> {
        self.call(self.repo.get_order_by_id(id))
            .await
            .map_err(|err| self.read_failure(op, id, err))
    }

    fn history_entry(&self, order_id: OrderId, status: OrderStatus) -> StatusHistoryEntry {
        self.history_entry_at(order_id, status, self.clock.now())
    }

    fn history_entry_at(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> StatusHistoryEntry {
        StatusHistoryEntry {
            id: StatusHistoryId::from_uuid(self.ids.next_uuid()),
            order_id,
            status,
            recorded_at: at,
        }
    }

    /// Run one repository call under the configured deadline.
    async fn call<T, F>(&self, fut: F) -> RepositoryResult<T>
    where
        F: Future<Output = RepositoryResult<T>>,
    {
        match self.config.storage_timeout() {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                RepositoryError::Unavailable(format!("repository call timed out after {limit:?}"))
            })?,
            None => fut.await,
        }
    }

    fn read_failure(
        &self,
        op: Operation,
        subject: impl core::fmt::Display,
        err: RepositoryError,
    ) -> OrderError {
        match &err {
            RepositoryError::NotFound => warn!(subject = %subject, "order not found"),
            other => error!(subject = %subject, error = %other, "repository read failed"),
        }
        OrderError::from_repository(op, subject, err)
    }

    fn write_failure(&self, op: Operation, id: OrderId, err: RepositoryError) -> OrderError {
        match &err {
            RepositoryError::NotFound => warn!("order vanished before write"),
            other => error!(error = %other, "repository write failed"),
        }
        OrderError::from_repository(op, id, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_guards_updates_but_not_driver_assignment() {
        let config = EngineConfig::default();
        assert_eq!(config.tracking_prefix, "DEL");
        assert!(config.guard_update_transitions);
        assert!(!config.guard_driver_assignment);
        assert_eq!(config.storage_timeout(), None);
    }

    #[test]
    fn config_deserializes_with_defaults_for_missing_fields() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"storage_timeout_ms": 250, "guard_driver_assignment": true}"#)
                .unwrap();
        assert_eq!(config.storage_timeout(), Some(Duration::from_millis(250)));
        assert!(config.guard_driver_assignment);
        assert!(config.guard_update_transitions);
        assert_eq!(config.tracking_prefix, "DEL");
    }
}
