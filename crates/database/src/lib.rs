//! # Riftventory Database Crate
//!
//! The PostgreSQL backend for the settlement engine. It implements every
//! contract of the `store` crate on top of a pooled connection.
//!
//! ## Architectural Principles
//!
//! - **Adapter:** All SQL lives here. The engine only sees the store traits.
//! - **Single-row guarantees:** Holdings are changed with conditional
//!   `UPDATE ... WHERE quantity = $n AND locked_quantity = $m`, trades with a
//!   version check, and history inserts rely on the unique
//!   `(root_trade_id, sequence_number)` constraint. Nothing else is assumed.
//! - **Asynchronous & Pooled:** All operations are asynchronous and share one
//!   `PgPool`.
//!
//! ## Public API
//!
//! - `connect`: establishes the connection pool from configuration.
//! - `run_migrations`: applies the embedded schema migrations.
//! - `DbRepository`: the store implementation.
//! - `DbError`: the errors this crate can return.

pub mod connection;
pub mod error;
pub mod repository;

pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use repository::DbRepository;
