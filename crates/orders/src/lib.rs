//! Delivery order lifecycle.
//!
//! Creates orders, enforces the status workflow, generates tracking numbers
//! and QR payloads, and guards updates/deletes against the order's lifecycle
//! state. Persistence is reached only through the [`OrderRepository`] port.

pub mod engine;
pub mod error;
pub mod identifier;
pub mod order;
pub mod repository;
pub mod status;

pub use engine::{EngineConfig, OrderLifecycleEngine};
pub use error::{ErrorKind, Operation, OrderError, OrderResult};
pub use identifier::{
    DEFAULT_TRACKING_PREFIX, TrackingNumber, TrackingNumberGenerator, qr_payload, validate_prefix,
};
pub use order::{
    DeliveryAddress, NewOrder, Order, OrderDetails, OrderPage, OrderPatch, OrderQueryParams,
    PackageDetail, PickupAddress, QrCode, StatusHistoryEntry, ValidatedOrder,
};
pub use repository::{OrderRepository, RepositoryError, RepositoryResult};
pub use status::{OrderStatus, StatusGraph, StatusGraphBuilder};
