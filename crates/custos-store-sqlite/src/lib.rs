//! SQLite backend for the Custos catalog.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every write runs its policy guards and
//! the write itself inside one transaction on that thread.

mod encode;
mod loader;
mod schema;
mod store;
mod write;

pub mod error;

pub use error::{Error, Result};
pub use loader::TxLoader;
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
