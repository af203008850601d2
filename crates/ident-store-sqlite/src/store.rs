//! [`SqliteStore`], the SQLite implementation of [`ContactStore`].

use std::{path::Path, time::Duration};

use rusqlite::{OptionalExtension as _, TransactionBehavior};

use ident_core::{
  contact::{Contact, ContactId},
  identity::{ConsolidatedContact, IdentifyRequest},
  reconcile::{Resolution, reconcile},
  store::{ContactStore, StoreError as _},
};

use crate::{
  Error, Result,
  encode::{CONTACT_COLUMNS, RawContact, encode_dt, now},
  schema::SCHEMA,
  tx::SqliteTx,
};

// ─── Options ─────────────────────────────────────────────────────────────────

/// Connection tuning for [`SqliteStore`].
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
  /// How many times `identify` re-runs a transaction that hit lock contention.
  pub transient_retries: usize,
  /// How long SQLite itself waits on a lock before reporting `BUSY`.
  pub busy_timeout:      Duration,
}

impl Default for StoreOptions {
  fn default() -> Self {
    Self { transient_retries: 1, busy_timeout: Duration::from_secs(5) }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An identity store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Separate
/// stores (or processes) may share one file; writers serialise on SQLite's
/// database lock.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  options:         StoreOptions,
}

impl SqliteStore {
  /// Open (or create) a store at `path` with default options.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with(path, StoreOptions::default()).await
  }

  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, options };
    store.init().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, options: StoreOptions::default() };
    store.init().await?;
    Ok(store)
  }

  pub fn options(&self) -> StoreOptions { self.options }

  async fn init(&self) -> Result<()> {
    let busy_timeout = self.options.busy_timeout;
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// One full attempt: open, reconcile, commit.
  async fn identify_once(&self, request: IdentifyRequest) -> Result<Resolution> {
    self
      .conn
      .call(move |conn| Ok(resolve_in_transaction(conn, &request)))
      .await?
  }
}

/// Run the reconciliation inside `BEGIN IMMEDIATE`.
///
/// The write lock is taken before the first read, so two resolvers can never
/// both observe "no match" for the same key. Any early return drops `tx`,
/// which rolls back.
fn resolve_in_transaction(
  conn: &mut rusqlite::Connection,
  request: &IdentifyRequest,
) -> Result<Resolution> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let resolution = reconcile(&mut SqliteTx::new(&tx), request)?;
  tx.commit()?;
  Ok(resolution)
}

fn log_resolution(resolution: &Resolution) {
  for orphan in &resolution.orphans {
    tracing::warn!(
      contact_id = orphan.contact_id,
      reason = ?orphan.reason,
      "contact is not linked to a live primary; excluded from merge"
    );
  }

  let primary_id = resolution.contact.primary_contact_id;
  if resolution.is_new_identity() {
    tracing::info!(primary_id, "created new identity");
  } else if !resolution.demoted.is_empty() {
    tracing::info!(
      primary_id,
      demoted = ?resolution.demoted,
      created = ?resolution.created,
      "merged identity groups"
    );
  } else if let Some(contact_id) = resolution.created {
    tracing::info!(primary_id, contact_id, "linked new contact information");
  } else {
    tracing::debug!(primary_id, "identity already known");
  }
}

// ─── ContactStore impl ───────────────────────────────────────────────────────

impl ContactStore for SqliteStore {
  type Error = Error;

  async fn identify(&self, request: IdentifyRequest) -> Result<ConsolidatedContact> {
    let mut attempt = 0;
    loop {
      match self.identify_once(request.clone()).await {
        Ok(resolution) => {
          log_resolution(&resolution);
          return Ok(resolution.contact);
        }
        Err(e) if e.is_transient() && attempt < self.options.transient_retries => {
          attempt += 1;
          tracing::warn!(attempt, error = %e, "transient store failure; retrying identify");
        }
        Err(e) => return Err(e),
      }
    }
  }

  async fn get_contact(&self, id: ContactId) -> Result<Option<Contact>> {
    let raw: Option<RawContact> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts
                 WHERE id = ?1 AND deleted_at IS NULL"
              ),
              rusqlite::params![id],
              RawContact::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawContact::into_contact).transpose()
  }

  async fn soft_delete(&self, id: ContactId) -> Result<bool> {
    let at_str = encode_dt(now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE contacts SET deleted_at = ?2, updated_at = ?2
           WHERE id = ?1 AND deleted_at IS NULL",
          rusqlite::params![id, at_str],
        )?)
      })
      .await?;

    if changed > 0 {
      tracing::info!(contact_id = id, "soft-deleted contact");
    }
    Ok(changed > 0)
  }

  async fn ping(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
