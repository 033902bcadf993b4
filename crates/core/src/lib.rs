//! Domain foundation building blocks shared by the courier crates.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! errors, typed identifiers, the value-object marker and the clock /
//! id-generator ports injected into the order lifecycle engine.

pub mod clock;
pub mod error;
pub mod id;
pub mod value_object;

pub use clock::{Clock, FixedClock, IdGenerator, SequentialIdGenerator, SystemClock, UuidV7Generator};
pub use error::{DomainError, DomainResult};
pub use id::{BranchId, CompanyId, OrderId, StatusHistoryId, UserId};
pub use value_object::ValueObject;
