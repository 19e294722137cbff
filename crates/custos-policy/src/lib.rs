//! Ownership and licensing policy engine for the Custos catalog.
//!
//! Every guard is a synchronous function of the acting principal, the
//! proposed payload and, where needed, the current persisted state fetched
//! through an [`EntityLoader`](custos_core::state::EntityLoader). Guards hold
//! no state of their own; callers run them inside the transaction of the
//! write they gate.
//!
//! | Module | Concern |
//! |--------|---------|
//! | [`identity`] | principal → canonical Party id, admin detection |
//! | [`compat`] | the fixed licence-compatibility relation |
//! | [`ownership`] | the single-owner state machine |
//! | [`licensing`] | stream ⇄ group/campaign licence checks |
//! | [`reserved`] | immutability of the predefined licences |
//! | [`registry`] | `(kind, lifecycle point) → guards` table and the engine |

pub mod compat;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod licensing;
pub mod ownership;
pub mod party;
pub mod registry;
pub mod reserved;

#[cfg(test)]
mod testing;

pub use config::PolicyConfig;
pub use context::GuardContext;
pub use error::{PolicyError, Result};
pub use registry::{GuardFn, GuardRegistry, LifecyclePoint, Mutation, PolicyEngine};
