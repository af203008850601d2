//! [`SqliteTx`]: [`ContactTransaction`] over an open rusqlite transaction.

use ident_core::{
  contact::{Contact, ContactId, LinkPrecedence, NewContact},
  reconcile::ContactTransaction,
};

use crate::{
  Error, Result,
  encode::{CONTACT_COLUMNS, RawContact, encode_dt, encode_precedence, now},
};

/// Borrowed view of a connection that is already inside a transaction.
///
/// Holding a `&Connection` (rather than the `Transaction`) keeps commit and
/// rollback with the caller that opened it.
pub struct SqliteTx<'a> {
  conn: &'a rusqlite::Connection,
}

impl<'a> SqliteTx<'a> {
  pub fn new(conn: &'a rusqlite::Connection) -> Self { Self { conn } }

  fn query_contacts(
    &self,
    sql: &str,
    params: impl rusqlite::Params,
  ) -> Result<Vec<Contact>> {
    let mut stmt = self.conn.prepare(sql)?;
    let raws = stmt
      .query_map(params, RawContact::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawContact::into_contact).collect()
  }
}

impl ContactTransaction for SqliteTx<'_> {
  type Error = Error;

  fn find_matching(
    &mut self,
    email: Option<&str>,
    phone_number: Option<&str>,
  ) -> Result<Vec<Contact>> {
    // `col = NULL` never holds, so an absent input drops its clause.
    self.query_contacts(
      &format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts
         WHERE deleted_at IS NULL
           AND (email = ?1 OR phone_number = ?2)
         ORDER BY created_at, id"
      ),
      rusqlite::params![email, phone_number],
    )
  }

  fn find_active(&mut self, id: ContactId) -> Result<Option<Contact>> {
    let mut found = self.query_contacts(
      &format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts
         WHERE id = ?1 AND deleted_at IS NULL"
      ),
      rusqlite::params![id],
    )?;
    Ok(found.pop())
  }

  fn insert(&mut self, contact: NewContact) -> Result<Contact> {
    let created_at = now();
    let at_str     = encode_dt(created_at);

    self.conn.execute(
      "INSERT INTO contacts (
         email, phone_number, linked_id, link_precedence, created_at, updated_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
      rusqlite::params![
        contact.email(),
        contact.phone_number(),
        contact.linked_id(),
        encode_precedence(contact.link_precedence()),
        at_str,
      ],
    )?;

    let id = self.conn.last_insert_rowid();
    Ok(contact.into_contact(id, created_at))
  }

  fn demote(&mut self, id: ContactId, master_id: ContactId) -> Result<()> {
    self.conn.execute(
      "UPDATE contacts
       SET link_precedence = ?3, linked_id = ?2, updated_at = ?4
       WHERE id = ?1",
      rusqlite::params![
        id,
        master_id,
        encode_precedence(LinkPrecedence::Secondary),
        encode_dt(now()),
      ],
    )?;
    Ok(())
  }

  fn repoint_secondaries(&mut self, from: ContactId, to: ContactId) -> Result<usize> {
    // Tombstoned rows are re-pointed too so none is left referencing a
    // secondary.
    let n = self.conn.execute(
      "UPDATE contacts SET linked_id = ?2, updated_at = ?3 WHERE linked_id = ?1",
      rusqlite::params![from, to, encode_dt(now())],
    )?;
    Ok(n)
  }

  fn load_group(&mut self, primary_id: ContactId) -> Result<Vec<Contact>> {
    // 'primary' sorts before 'secondary'.
    self.query_contacts(
      &format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts
         WHERE deleted_at IS NULL
           AND (id = ?1 OR linked_id = ?1)
         ORDER BY link_precedence, created_at, id"
      ),
      rusqlite::params![primary_id],
    )
  }
}
