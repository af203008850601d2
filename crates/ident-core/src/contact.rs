//! Contact, the sole persisted entity.
//!
//! Every live contact belongs to exactly one identity group: one `primary`
//! plus any number of `secondary` rows whose `linked_id` points straight at
//! that primary. Chains (secondary → secondary) never exist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Store-assigned row id. Increases in creation order and is never reused.
pub type ContactId = i64;

// ─── Precedence ──────────────────────────────────────────────────────────────

/// The role a contact plays inside its identity group.
///
/// The string forms double as the persisted column values.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LinkPrecedence {
  Primary,
  Secondary,
}

// ─── Contact ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
  pub id:              ContactId,
  pub email:           Option<String>,
  pub phone_number:    Option<String>,
  /// Present iff `link_precedence` is `Secondary`; always names a primary.
  pub linked_id:       Option<ContactId>,
  pub link_precedence: LinkPrecedence,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
  /// Tombstone. Deleted rows are invisible to every query in this crate.
  pub deleted_at:      Option<DateTime<Utc>>,
}

impl Contact {
  pub fn is_primary(&self) -> bool {
    self.link_precedence == LinkPrecedence::Primary
  }

  /// Ordering key for "oldest": creation time, then id.
  ///
  /// Timestamps can tie at the store's resolution; ids never do.
  pub fn age_key(&self) -> (DateTime<Utc>, ContactId) {
    (self.created_at, self.id)
  }

  /// Literal `(email, phone)` equality. `None` only matches `None`.
  pub fn has_pair(&self, email: Option<&str>, phone_number: Option<&str>) -> bool {
    self.email.as_deref() == email && self.phone_number.as_deref() == phone_number
  }
}

// ─── NewContact ──────────────────────────────────────────────────────────────

/// Input to [`crate::reconcile::ContactTransaction::insert`].
///
/// Only constructible as a primary or as a secondary linked to a primary, so
/// `linked_id` and `link_precedence` can never disagree. `id` and the
/// timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
  email:        Option<String>,
  phone_number: Option<String>,
  linked_id:    Option<ContactId>,
}

impl NewContact {
  pub fn primary(email: Option<String>, phone_number: Option<String>) -> Self {
    Self { email, phone_number, linked_id: None }
  }

  pub fn secondary(
    email: Option<String>,
    phone_number: Option<String>,
    primary_id: ContactId,
  ) -> Self {
    Self { email, phone_number, linked_id: Some(primary_id) }
  }

  pub fn email(&self) -> Option<&str> { self.email.as_deref() }

  pub fn phone_number(&self) -> Option<&str> { self.phone_number.as_deref() }

  pub fn linked_id(&self) -> Option<ContactId> { self.linked_id }

  pub fn link_precedence(&self) -> LinkPrecedence {
    match self.linked_id {
      Some(_) => LinkPrecedence::Secondary,
      None => LinkPrecedence::Primary,
    }
  }

  /// Materialise the row the store just wrote.
  pub fn into_contact(self, id: ContactId, created_at: DateTime<Utc>) -> Contact {
    let link_precedence = self.link_precedence();
    Contact {
      id,
      email: self.email,
      phone_number: self.phone_number,
      linked_id: self.linked_id,
      link_precedence,
      created_at,
      updated_at: created_at,
      deleted_at: None,
    }
  }
}
