//! The `ContactStore` trait.
//!
//! Implemented by storage backends (e.g. `ident-store-sqlite`). The HTTP layer
//! depends on this abstraction, not on any concrete backend.

use std::future::Future;

use crate::{
  ErrorKind,
  contact::{Contact, ContactId},
  identity::{ConsolidatedContact, IdentifyRequest},
};

/// A backend error that can say which [`ErrorKind`] it belongs to.
///
/// Backends translate driver-specific codes here, at their own boundary, so
/// callers never inspect driver errors.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn kind(&self) -> ErrorKind;

  fn is_transient(&self) -> bool { self.kind() == ErrorKind::Transient }
}

/// Abstraction over a contact store backend.
///
/// The store holds all state; implementations keep nothing between calls
/// beyond their connection handle. All methods return `Send` futures so the
/// trait can be used from a multi-threaded runtime.
pub trait ContactStore: Send + Sync {
  type Error: StoreError;

  /// Resolve `request` to its consolidated identity, creating, linking and
  /// merging contacts as needed.
  ///
  /// Runs [`crate::reconcile::reconcile`] inside one isolated transaction.
  /// Either every write commits or none does. Transient failures are retried
  /// with a fresh read before being surfaced.
  fn identify(
    &self,
    request: IdentifyRequest,
  ) -> impl Future<Output = Result<ConsolidatedContact, Self::Error>> + Send + '_;

  /// Retrieve a live (not soft-deleted) contact. Returns `None` if not found.
  fn get_contact(
    &self,
    id: ContactId,
  ) -> impl Future<Output = Result<Option<Contact>, Self::Error>> + Send + '_;

  /// Set the tombstone on a contact. Returns `false` if there was no live
  /// contact with that id.
  fn soft_delete(
    &self,
    id: ContactId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Cheap round-trip used by health checks.
  fn ping(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
