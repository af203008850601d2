//! Request and response types for identity resolution.

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  contact::{Contact, ContactId},
};

// ─── Request ─────────────────────────────────────────────────────────────────

/// A lookup key: an email, a phone number, or both.
///
/// Syntax checks are the HTTP layer's job; this type only guarantees that at
/// least one half is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyRequest {
  email:        Option<String>,
  phone_number: Option<String>,
}

impl IdentifyRequest {
  pub fn new(email: Option<String>, phone_number: Option<String>) -> Result<Self> {
    if email.is_none() && phone_number.is_none() {
      return Err(Error::InvalidInput(
        "at least one of email or phoneNumber must be provided".into(),
      ));
    }
    Ok(Self { email, phone_number })
  }

  pub fn email(&self) -> Option<&str> { self.email.as_deref() }

  pub fn phone_number(&self) -> Option<&str> { self.phone_number.as_deref() }
}

// ─── Consolidated view ───────────────────────────────────────────────────────

/// The merged view of one identity group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedContact {
  /// Existing consumers read this exact (misspelled) key.
  #[serde(rename = "primaryContatctId")]
  pub primary_contact_id:    ContactId,
  /// Primary's email first, then first-seen order through the secondaries.
  pub emails:                Vec<String>,
  pub phone_numbers:         Vec<String>,
  /// In creation order.
  pub secondary_contact_ids: Vec<ContactId>,
}

impl ConsolidatedContact {
  /// Build the view from every live member of a group, in any order.
  ///
  /// Members are arranged primary first, then secondaries by
  /// `(created_at, id)`.
  pub fn from_group(group: &[Contact]) -> Result<Self> {
    let primary = group.iter().find(|c| c.is_primary()).ok_or_else(|| {
      match group.first() {
        Some(c) => Error::MissingPrimary(c.linked_id.unwrap_or(c.id)),
        None => Error::EmptyGroup,
      }
    })?;

    let mut secondaries: Vec<&Contact> =
      group.iter().filter(|c| !c.is_primary()).collect();
    secondaries.sort_by_key(|c| c.age_key());

    let mut emails: Vec<String> = Vec::new();
    let mut phone_numbers: Vec<String> = Vec::new();

    for contact in std::iter::once(primary).chain(secondaries.iter().copied()) {
      push_unique(&mut emails, contact.email.as_deref());
      push_unique(&mut phone_numbers, contact.phone_number.as_deref());
    }

    Ok(Self {
      primary_contact_id: primary.id,
      emails,
      phone_numbers,
      secondary_contact_ids: secondaries.iter().map(|c| c.id).collect(),
    })
  }
}

fn push_unique(values: &mut Vec<String>, value: Option<&str>) {
  if let Some(v) = value
    && !values.iter().any(|seen| seen == v)
  {
    values.push(v.to_owned());
  }
}

/// Wire envelope: `{"contact": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
  pub contact: ConsolidatedContact,
}

impl From<ConsolidatedContact> for IdentifyResponse {
  fn from(contact: ConsolidatedContact) -> Self { Self { contact } }
}
