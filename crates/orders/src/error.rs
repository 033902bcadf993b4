//! Engine error model.
//!
//! Every failure carries the engine [`Operation`] it came from, a typed
//! [`ErrorKind`] with the offending ids/statuses, and, for storage failures,
//! the underlying [`RepositoryError`] as its source.

use thiserror::Error;

use courier_core::{DomainError, OrderId};

use crate::repository::RepositoryError;
use crate::status::OrderStatus;

/// Engine operation that produced an error.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateOrder,
    GetOrderById,
    GetOrderByTrackingNumber,
    GetOrderByQrData,
    GetOrders,
    GetOrdersByClientId,
    GetOrdersByCompany,
    ChangeStatus,
    UpdateOrder,
    SoftDeleteOrder,
    RestoreOrder,
    IsAvailableForDelete,
    AssignDriverToOrder,
    PurgeOrder,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateOrder => "create_order",
            Operation::GetOrderById => "get_order_by_id",
            Operation::GetOrderByTrackingNumber => "get_order_by_tracking_number",
            Operation::GetOrderByQrData => "get_order_by_qr_data",
            Operation::GetOrders => "get_orders",
            Operation::GetOrdersByClientId => "get_orders_by_client_id",
            Operation::GetOrdersByCompany => "get_orders_by_company",
            Operation::ChangeStatus => "change_status",
            Operation::UpdateOrder => "update_order",
            Operation::SoftDeleteOrder => "soft_delete_order",
            Operation::RestoreOrder => "restore_order",
            Operation::IsAvailableForDelete => "is_available_for_delete",
            Operation::AssignDriverToOrder => "assign_driver_to_order",
            Operation::PurgeOrder => "purge_order",
        }
    }
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("order not found: {0}")]
    NotFound(String),

    #[error("invalid order status '{0}'")]
    InvalidStatus(String),

    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error("order {0} is deleted")]
    OrderDeleted(OrderId),

    #[error("order {0} is already deleted")]
    AlreadyDeleted(OrderId),

    #[error("order {0} is not deleted")]
    NotDeleted(OrderId),

    #[error("order {id} cannot be updated to status {status}")]
    CannotUpdate { id: OrderId, status: OrderStatus },

    #[error("order {id} cannot be deleted in status {status}")]
    CannotDelete { id: OrderId, status: OrderStatus },

    #[error("persistence failure")]
    Persistence,
}

impl ErrorKind {
    /// Stable snake_case code for callers mapping errors to responses.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput(_) => "invalid_input",
            ErrorKind::NotFound(_) => "not_found",
            ErrorKind::InvalidStatus(_) => "invalid_status",
            ErrorKind::IllegalTransition { .. } => "illegal_transition",
            ErrorKind::OrderDeleted(_) => "order_deleted",
            ErrorKind::AlreadyDeleted(_) => "already_deleted",
            ErrorKind::NotDeleted(_) => "not_deleted",
            ErrorKind::CannotUpdate { .. } => "cannot_update",
            ErrorKind::CannotDelete { .. } => "cannot_delete",
            ErrorKind::Persistence => "persistence",
        }
    }
}

/// Engine error: operation + kind + optional storage cause.
#[derive(Debug, Error)]
#[error("{operation}: {kind}")]
pub struct OrderError {
    operation: Operation,
    kind: ErrorKind,
    #[source]
    cause: Option<RepositoryError>,
}

pub type OrderResult<T> = Result<T, OrderError>;

impl OrderError {
    pub fn new(operation: Operation, kind: ErrorKind) -> Self {
        Self {
            operation,
            kind,
            cause: None,
        }
    }

    /// Translate a repository failure. `NotFound` keeps its meaning; anything
    /// else becomes `Persistence` with the original error as source.
    pub fn from_repository(
        operation: Operation,
        subject: impl core::fmt::Display,
        err: RepositoryError,
    ) -> Self {
        match err {
            RepositoryError::NotFound => {
                Self::new(operation, ErrorKind::NotFound(subject.to_string()))
            }
            other => Self {
                operation,
                kind: ErrorKind::Persistence,
                cause: Some(other),
            },
        }
    }

    pub fn from_domain(operation: Operation, err: DomainError) -> Self {
        let kind = match err {
            DomainError::NotFound => ErrorKind::NotFound(String::new()),
            DomainError::Validation(msg)
            | DomainError::InvariantViolation(msg)
            | DomainError::InvalidId(msg)
            | DomainError::Conflict(msg) => ErrorKind::InvalidInput(msg),
        };
        Self::new(operation, kind)
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn cause(&self) -> Option<&RepositoryError> {
        self.cause.as_ref()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn not_found_keeps_subject_and_has_no_cause() {
        let id = OrderId::new();
        let err = OrderError::from_repository(Operation::GetOrderById, id, RepositoryError::NotFound);
        assert!(err.is_not_found());
        assert_eq!(err.kind(), &ErrorKind::NotFound(id.to_string()));
        assert!(err.source().is_none());
    }

    #[test]
    fn storage_failures_become_persistence_with_source() {
        let err = OrderError::from_repository(
            Operation::CreateOrder,
            "DEL-250101-0001",
            RepositoryError::Storage("disk full".into()),
        );
        assert_eq!(err.kind(), &ErrorKind::Persistence);
        assert_eq!(err.kind().code(), "persistence");
        let source = err.source().expect("cause is chained");
        assert_eq!(source.to_string(), "storage failure: disk full");
    }

    #[test]
    fn display_names_operation_and_context() {
        let err = OrderError::new(
            Operation::ChangeStatus,
            ErrorKind::IllegalTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::InTransit,
            },
        );
        assert_eq!(
            err.to_string(),
            "change_status: illegal transition from PENDING to IN_TRANSIT"
        );
    }

    #[test]
    fn validation_errors_map_to_invalid_input() {
        let err = OrderError::from_domain(
            Operation::CreateOrder,
            DomainError::required("client_id"),
        );
        assert_eq!(
            err.kind(),
            &ErrorKind::InvalidInput("client_id is required".into())
        );
    }
}
