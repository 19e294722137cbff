//! Core types and trait definitions for the Custos catalog policy layer.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! The policy engine, the storage backend and the API all depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod entity;
pub mod error;
pub mod license;
pub mod party;
pub mod payload;
pub mod principal;
pub mod state;
pub mod store;

pub use error::{Classify, Error, ErrorKind, Result};
