#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! TransactIQ Shared Types
//!
//! The subscriber record, the keyed-record store it lives in, and the
//! database plumbing shared by the API and billing crates.

pub mod db;
pub mod error;
pub mod models;
pub mod store;

pub use db::{create_pool, run_migrations};
pub use error::{StoreError, StoreResult};
pub use models::{Gateway, PlanUpdate, User, NO_PLAN};
pub use store::{InMemoryUserStore, PgUserStore, UserStore};
