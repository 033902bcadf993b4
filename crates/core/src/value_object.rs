//! Value object trait: equality by value, not identity.
//!
//! Statuses, tracking numbers and QR payloads are value objects: two instances
//! holding the same data are interchangeable.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct TrackingNumber(String);
///
/// impl ValueObject for TrackingNumber {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
