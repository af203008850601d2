//! The identity-reconciliation algorithm.
//!
//! [`reconcile`] is written once against [`ContactTransaction`], a small set of
//! primitives that a backend executes inside a single open transaction. The
//! backend owns isolation, commit and rollback; this module owns the rules:
//!
//! 1. load every live contact sharing the email or the phone number;
//! 2. with no match, insert a fresh primary and stop;
//! 3. otherwise collect the governing primary of each match;
//! 4. pick the oldest primary (`created_at`, then `id`) as master;
//! 5. demote every other primary under the master and re-point its
//!    secondaries, so no chain ever forms;
//! 6. insert a secondary if the exact `(email, phone)` pair is new to the group;
//! 7. reload the group and build the consolidated view.

use std::collections::BTreeMap;

use crate::{
  Error,
  contact::{Contact, ContactId, NewContact},
  identity::{ConsolidatedContact, IdentifyRequest},
};

// ─── Transaction primitives ──────────────────────────────────────────────────

/// Operations a backend must provide inside one atomic, isolated transaction.
///
/// Every read ignores soft-deleted rows.
pub trait ContactTransaction {
  type Error: From<Error>;

  /// Live contacts whose email equals `email` or whose phone equals
  /// `phone_number`. An absent argument contributes no clause.
  fn find_matching(
    &mut self,
    email: Option<&str>,
    phone_number: Option<&str>,
  ) -> Result<Vec<Contact>, Self::Error>;

  /// A single live contact.
  fn find_active(&mut self, id: ContactId) -> Result<Option<Contact>, Self::Error>;

  /// Persist a new row and return it with its assigned id and timestamps.
  fn insert(&mut self, contact: NewContact) -> Result<Contact, Self::Error>;

  /// Turn a primary into a secondary of `master_id`.
  fn demote(&mut self, id: ContactId, master_id: ContactId) -> Result<(), Self::Error>;

  /// Move every row linked to `from` over to `to`. Returns the row count.
  fn repoint_secondaries(
    &mut self,
    from: ContactId,
    to: ContactId,
  ) -> Result<usize, Self::Error>;

  /// The primary `primary_id` plus every live contact linked to it.
  fn load_group(&mut self, primary_id: ContactId) -> Result<Vec<Contact>, Self::Error>;
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// Why a matched contact could not be traced to a live primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanReason {
  /// Secondary with no `linked_id` at all.
  Unlinked,
  /// `linked_id` names a row that is missing or soft-deleted.
  MissingPrimary(ContactId),
  /// `linked_id` names a row that is itself a secondary.
  LinkedToSecondary(ContactId),
}

/// A matched contact excluded from the merge for lack of a valid primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrphanedLink {
  pub contact_id: ContactId,
  pub reason:     OrphanReason,
}

/// Everything one [`reconcile`] run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
  pub contact:  ConsolidatedContact,
  /// Id of the row inserted by this run, if any.
  pub created:  Option<ContactId>,
  /// Primaries demoted under the master by this run.
  pub demoted:  Vec<ContactId>,
  /// Matches skipped because their primary could not be found. Callers should
  /// report these for offline repair.
  pub orphans:  Vec<OrphanedLink>,
}

impl Resolution {
  pub fn is_new_identity(&self) -> bool {
    self.created == Some(self.contact.primary_contact_id)
  }

  pub fn is_noop(&self) -> bool { self.created.is_none() && self.demoted.is_empty() }
}

// ─── Algorithm ───────────────────────────────────────────────────────────────

/// Resolve `request` to a single identity group, linking and merging as needed.
///
/// Must run inside one transaction: a failure part-way leaves writes the
/// caller has to roll back.
pub fn reconcile<T>(
  tx: &mut T,
  request: &IdentifyRequest,
) -> Result<Resolution, T::Error>
where
  T: ContactTransaction + ?Sized,
{
  let email = request.email();
  let phone_number = request.phone_number();

  let matches = tx.find_matching(email, phone_number)?;
  let (primaries, orphans) = governing_primaries(tx, &matches)?;

  let Some(master) = select_master(&primaries).cloned() else {
    let contact = tx.insert(NewContact::primary(
      email.map(str::to_owned),
      phone_number.map(str::to_owned),
    ))?;
    return Ok(Resolution {
      contact: ConsolidatedContact::from_group(std::slice::from_ref(&contact))?,
      created: Some(contact.id),
      demoted: Vec::new(),
      orphans,
    });
  };

  let mut demoted = Vec::new();
  for primary in primaries.iter().filter(|p| p.id != master.id) {
    tx.demote(primary.id, master.id)?;
    tx.repoint_secondaries(primary.id, master.id)?;
    demoted.push(primary.id);
  }

  let group = tx.load_group(master.id)?;
  let created = if group.iter().any(|c| c.has_pair(email, phone_number)) {
    None
  } else {
    let contact = tx.insert(NewContact::secondary(
      email.map(str::to_owned),
      phone_number.map(str::to_owned),
      master.id,
    ))?;
    Some(contact.id)
  };

  let group = tx.load_group(master.id)?;
  Ok(Resolution {
    contact: ConsolidatedContact::from_group(&group)?,
    created,
    demoted,
    orphans,
  })
}

/// The distinct live primaries governing `matches`, keyed and ordered by id,
/// plus every match whose primary could not be resolved.
fn governing_primaries<T>(
  tx: &mut T,
  matches: &[Contact],
) -> Result<(Vec<Contact>, Vec<OrphanedLink>), T::Error>
where
  T: ContactTransaction + ?Sized,
{
  let mut primaries: BTreeMap<ContactId, Contact> = BTreeMap::new();
  let mut orphans = Vec::new();

  for contact in matches {
    if contact.is_primary() {
      primaries.insert(contact.id, contact.clone());
      continue;
    }

    let Some(linked_id) = contact.linked_id else {
      orphans.push(OrphanedLink {
        contact_id: contact.id,
        reason:     OrphanReason::Unlinked,
      });
      continue;
    };

    if primaries.contains_key(&linked_id) {
      continue;
    }

    match tx.find_active(linked_id)? {
      Some(primary) if primary.is_primary() => {
        primaries.insert(primary.id, primary);
      }
      Some(_) => orphans.push(OrphanedLink {
        contact_id: contact.id,
        reason:     OrphanReason::LinkedToSecondary(linked_id),
      }),
      None => orphans.push(OrphanedLink {
        contact_id: contact.id,
        reason:     OrphanReason::MissingPrimary(linked_id),
      }),
    }
  }

  Ok((primaries.into_values().collect(), orphans))
}

/// The oldest primary. Ties on `created_at` go to the smaller id.
pub fn select_master(primaries: &[Contact]) -> Option<&Contact> {
  primaries.iter().min_by_key(|c| c.age_key())
}
