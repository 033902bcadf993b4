//! Infrastructure for the courier order engine.
//!
//! Repository adapters (in-memory and Postgres), environment configuration,
//! process bootstrap and administrative flows.

pub mod admin;
pub mod bootstrap;
pub mod config;
pub mod repository;

pub use bootstrap::{Engine, build_engine};
pub use config::{AppConfig, ConfigError, StorageBackend};
pub use repository::{InMemoryOrderRepository, PostgresOrderRepository};
