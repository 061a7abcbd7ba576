//! SQLite backend for the community tracker.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The `name_contains` index lives in
//! the same database and is rebuilt inside the transaction of whichever write
//! invalidates it.

mod encode;
mod index;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
