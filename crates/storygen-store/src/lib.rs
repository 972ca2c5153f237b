//! Persistent job/stage repository.
//!
//! The worker consumes the `JobStore` trait; `PgJobStore` is the Postgres
//! implementation and `MemoryJobStore` backs tests and local development.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;
pub use store::{status_view, JobStatusView, JobStore};
