//! Core types and the identity-reconciliation engine.
//!
//! This crate has no HTTP or database dependencies. Storage
//! backends implement [`reconcile::ContactTransaction`] and
//! [`store::ContactStore`]; the HTTP layer depends only on the latter.

pub mod contact;
pub mod error;
pub mod identity;
pub mod reconcile;
pub mod store;

pub use error::{Error, ErrorKind, Result};
