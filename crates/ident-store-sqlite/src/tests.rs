//! Integration tests for `SqliteStore`.

use std::time::Duration;

use chrono::{DateTime, TimeZone as _, Utc};
use ident_core::{
  ErrorKind,
  contact::{Contact, ContactId, LinkPrecedence},
  identity::IdentifyRequest,
  store::{ContactStore, StoreError as _},
};

use crate::{
  Error, SqliteStore, StoreOptions,
  encode::{CONTACT_COLUMNS, RawContact, encode_dt},
};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn req(email: Option<&str>, phone: Option<&str>) -> IdentifyRequest {
  IdentifyRequest::new(email.map(Into::into), phone.map(Into::into)).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
  Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

/// Every row, tombstones included, in id order.
async fn all_rows(s: &SqliteStore) -> Vec<Contact> {
  let raws = s
    .conn
    .call(|conn| {
      let mut stmt =
        conn.prepare(&format!("SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY id"))?;
      let rows = stmt
        .query_map([], RawContact::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows)
    })
    .await
    .unwrap();
  raws.into_iter().map(|r| r.into_contact().unwrap()).collect()
}

/// Insert a row with a chosen creation time, bypassing the resolver.
async fn insert_raw(
  s: &SqliteStore,
  email: Option<&str>,
  phone: Option<&str>,
  linked_id: Option<ContactId>,
  created_at: DateTime<Utc>,
) -> ContactId {
  let email = email.map(str::to_owned);
  let phone = phone.map(str::to_owned);
  let precedence = if linked_id.is_some() { "secondary" } else { "primary" };
  let at_str = encode_dt(created_at);
  s.conn
    .call(move |conn| {
      conn.execute(
        "INSERT INTO contacts (
           email, phone_number, linked_id, link_precedence, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        rusqlite::params![email, phone, linked_id, precedence, at_str],
      )?;
      Ok(conn.last_insert_rowid())
    })
    .await
    .unwrap()
}

// ─── New identities ──────────────────────────────────────────────────────────

#[tokio::test]
async fn first_request_creates_primary() {
  let s = store().await;

  let view = s.identify(req(Some("a@x.com"), None)).await.unwrap();
  assert!(view.secondary_contact_ids.is_empty());
  assert_eq!(view.emails, vec!["a@x.com"]);
  assert!(view.phone_numbers.is_empty());

  let rows = all_rows(&s).await;
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].id, view.primary_contact_id);
  assert_eq!(rows[0].link_precedence, LinkPrecedence::Primary);
  assert_eq!(rows[0].linked_id, None);
  assert_eq!(rows[0].phone_number, None);
}

#[tokio::test]
async fn get_contact_round_trips() {
  let s = store().await;
  let view = s.identify(req(Some("a@x.com"), Some("123"))).await.unwrap();

  let contact = s.get_contact(view.primary_contact_id).await.unwrap().unwrap();
  assert_eq!(contact.email.as_deref(), Some("a@x.com"));
  assert_eq!(contact.phone_number.as_deref(), Some("123"));
  assert_eq!(contact.created_at, contact.updated_at);
  assert!(contact.deleted_at.is_none());

  assert!(s.get_contact(9_999).await.unwrap().is_none());
}

// ─── Linking ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn new_phone_links_secondary() {
  let s = store().await;
  let first = s.identify(req(Some("a@x.com"), None)).await.unwrap();
  let before = s.get_contact(first.primary_contact_id).await.unwrap().unwrap();

  let view = s.identify(req(Some("a@x.com"), Some("123"))).await.unwrap();

  assert_eq!(view.primary_contact_id, first.primary_contact_id);
  assert_eq!(view.emails, vec!["a@x.com"]);
  assert_eq!(view.phone_numbers, vec!["123"]);
  assert_eq!(view.secondary_contact_ids.len(), 1);

  let secondary = s
    .get_contact(view.secondary_contact_ids[0])
    .await
    .unwrap()
    .unwrap();
  assert_eq!(secondary.link_precedence, LinkPrecedence::Secondary);
  assert_eq!(secondary.linked_id, Some(first.primary_contact_id));
  assert_eq!(secondary.phone_number.as_deref(), Some("123"));

  // The primary is untouched.
  let after = s.get_contact(first.primary_contact_id).await.unwrap().unwrap();
  assert_eq!(after, before);
}

#[tokio::test]
async fn exact_duplicate_writes_nothing() {
  let s = store().await;
  let first = s.identify(req(Some("a@x.com"), Some("123"))).await.unwrap();
  let second = s.identify(req(Some("a@x.com"), Some("123"))).await.unwrap();

  assert_eq!(first, second);
  assert_eq!(all_rows(&s).await.len(), 1);
}

#[tokio::test]
async fn lookup_by_phone_alone_returns_whole_group() {
  let s = store().await;
  s.identify(req(Some("lorraine@hillvalley.edu"), Some("123456")))
    .await
    .unwrap();
  s.identify(req(Some("mcfly@hillvalley.edu"), Some("123456")))
    .await
    .unwrap();

  let view = s.identify(req(None, Some("123456"))).await.unwrap();

  assert_eq!(view.emails, vec![
    "lorraine@hillvalley.edu",
    "mcfly@hillvalley.edu"
  ]);
  assert_eq!(view.phone_numbers, vec!["123456"]);
  // (None, 123456) was not present verbatim, so it was recorded.
  assert_eq!(view.secondary_contact_ids.len(), 2);
  assert_eq!(all_rows(&s).await.len(), 3);
}

// ─── Merging ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn bridging_request_merges_groups() {
  let s = store().await;
  let p1 = s.identify(req(Some("george@hillvalley.edu"), Some("919191"))).await.unwrap();
  let p2 = s.identify(req(Some("biffsucks@hillvalley.edu"), Some("717171"))).await.unwrap();
  assert_ne!(p1.primary_contact_id, p2.primary_contact_id);

  let view = s
    .identify(req(Some("george@hillvalley.edu"), Some("717171")))
    .await
    .unwrap();

  assert_eq!(view.primary_contact_id, p1.primary_contact_id);
  assert_eq!(view.emails, vec![
    "george@hillvalley.edu",
    "biffsucks@hillvalley.edu"
  ]);
  assert_eq!(view.phone_numbers, vec!["919191", "717171"]);
  assert_eq!(view.secondary_contact_ids[0], p2.primary_contact_id);

  let demoted = s.get_contact(p2.primary_contact_id).await.unwrap().unwrap();
  assert_eq!(demoted.link_precedence, LinkPrecedence::Secondary);
  assert_eq!(demoted.linked_id, Some(p1.primary_contact_id));
  assert!(demoted.updated_at >= demoted.created_at);

  let rows = all_rows(&s).await.len();
  let again = s
    .identify(req(Some("george@hillvalley.edu"), Some("717171")))
    .await
    .unwrap();
  assert_eq!(again, view);
  assert_eq!(all_rows(&s).await.len(), rows);
}

#[tokio::test]
async fn merge_repoints_existing_secondaries() {
  let s = store().await;
  let p1 = insert_raw(&s, Some("a@x.com"), None, None, at(0)).await;
  let p2 = insert_raw(&s, None, Some("999"), None, at(10)).await;
  let c = insert_raw(&s, Some("c@x.com"), Some("999"), Some(p2), at(20)).await;

  let view = s.identify(req(Some("a@x.com"), Some("999"))).await.unwrap();
  assert_eq!(view.primary_contact_id, p1);

  let c = s.get_contact(c).await.unwrap().unwrap();
  assert_eq!(c.linked_id, Some(p1));

  let rows = all_rows(&s).await;
  assert_eq!(rows.iter().filter(|r| r.is_primary()).count(), 1);
  assert!(rows.iter().filter(|r| !r.is_primary()).all(|r| r.linked_id == Some(p1)));
}

#[tokio::test]
async fn oldest_primary_wins_regardless_of_id() {
  let s = store().await;
  let newer = insert_raw(&s, Some("a@x.com"), None, None, at(100)).await;
  let older = insert_raw(&s, None, Some("999"), None, at(0)).await;

  let view = s.identify(req(Some("a@x.com"), Some("999"))).await.unwrap();

  assert_eq!(view.primary_contact_id, older);
  assert_eq!(view.emails, vec!["a@x.com"]);
  assert_eq!(view.secondary_contact_ids[0], newer);
}

#[tokio::test]
async fn equal_timestamps_prefer_lower_id() {
  let s = store().await;
  let first = insert_raw(&s, Some("a@x.com"), None, None, at(0)).await;
  let second = insert_raw(&s, None, Some("999"), None, at(0)).await;

  let view = s.identify(req(Some("a@x.com"), Some("999"))).await.unwrap();

  assert_eq!(view.primary_contact_id, first);
  let demoted = s.get_contact(second).await.unwrap().unwrap();
  assert_eq!(demoted.linked_id, Some(first));
}

// ─── Soft delete ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn soft_deleted_contact_is_invisible() {
  let s = store().await;
  let first = s.identify(req(Some("a@x.com"), None)).await.unwrap();

  assert!(s.soft_delete(first.primary_contact_id).await.unwrap());
  assert!(!s.soft_delete(first.primary_contact_id).await.unwrap());
  assert!(s.get_contact(first.primary_contact_id).await.unwrap().is_none());

  let view = s.identify(req(Some("a@x.com"), None)).await.unwrap();
  assert_ne!(view.primary_contact_id, first.primary_contact_id);

  let rows = all_rows(&s).await;
  assert_eq!(rows.len(), 2);
  assert!(rows[0].deleted_at.is_some());
}

#[tokio::test]
async fn orphaned_secondary_does_not_block_resolution() {
  let s = store().await;
  let gone = insert_raw(&s, Some("gone@x.com"), None, None, at(0)).await;
  let orphan = insert_raw(&s, Some("a@x.com"), None, Some(gone), at(10)).await;
  let live = insert_raw(&s, None, Some("555"), None, at(20)).await;
  assert!(s.soft_delete(gone).await.unwrap());

  let view = s.identify(req(Some("a@x.com"), Some("555"))).await.unwrap();

  assert_eq!(view.primary_contact_id, live);
  assert!(!view.secondary_contact_ids.contains(&orphan));
  // Not repaired.
  let orphan = s.get_contact(orphan).await.unwrap().unwrap();
  assert_eq!(orphan.linked_id, Some(gone));
}

// ─── Health ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ping_succeeds() {
  let s = store().await;
  s.ping().await.unwrap();
}

// ─── Errors & concurrency ────────────────────────────────────────────────────

#[test]
fn busy_errors_are_transient() {
  let busy = Error::Sqlite(rusqlite::Error::SqliteFailure(
    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
    None,
  ));
  assert_eq!(busy.kind(), ErrorKind::Transient);

  let constraint = Error::Sqlite(rusqlite::Error::SqliteFailure(
    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
    None,
  ));
  assert_eq!(constraint.kind(), ErrorKind::Internal);

  let invalid = Error::Core(ident_core::Error::InvalidInput("nope".into()));
  assert_eq!(invalid.kind(), ErrorKind::InvalidInput);

  // The background connection never reopens; retrying cannot help.
  let closed = Error::Database(tokio_rusqlite::Error::ConnectionClosed);
  assert_eq!(closed.kind(), ErrorKind::Internal);
  assert!(!closed.is_transient());
}

#[tokio::test]
async fn lock_contention_surfaces_as_transient_then_recovers() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("ident.db");
  let s = SqliteStore::open_with(&path, StoreOptions {
    transient_retries: 1,
    busy_timeout:      Duration::from_millis(20),
  })
  .await
  .unwrap();

  let blocker = rusqlite::Connection::open(&path).unwrap();
  blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

  let err = s.identify(req(Some("a@x.com"), None)).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Transient, "{err}");
  assert!(all_rows(&s).await.is_empty());

  blocker.execute_batch("ROLLBACK").unwrap();
  let view = s.identify(req(Some("a@x.com"), None)).await.unwrap();
  assert_eq!(view.emails, vec!["a@x.com"]);
}

/// Hold the database write lock from another thread for `hold`, returning
/// once the lock is taken.
fn hold_write_lock(path: &std::path::Path, hold: Duration) -> std::thread::JoinHandle<()> {
  let path = path.to_path_buf();
  let (locked_tx, locked_rx) = std::sync::mpsc::channel();
  let handle = std::thread::spawn(move || {
    let blocker = rusqlite::Connection::open(&path).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE").unwrap();
    locked_tx.send(()).unwrap();
    std::thread::sleep(hold);
    blocker.execute_batch("ROLLBACK").unwrap();
  });
  locked_rx.recv().unwrap();
  handle
}

async fn store_with_retries(path: &std::path::Path, transient_retries: usize) -> SqliteStore {
  SqliteStore::open_with(path, StoreOptions {
    transient_retries,
    busy_timeout: Duration::from_millis(250),
  })
  .await
  .unwrap()
}

#[tokio::test]
async fn retry_succeeds_once_lock_is_released() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("ident.db");
  let s = store_with_retries(&path, 1).await;

  // Outlives the first attempt's busy wait, released during the second.
  let blocker = hold_write_lock(&path, Duration::from_millis(400));
  let view = s.identify(req(Some("a@x.com"), None)).await.unwrap();
  blocker.join().unwrap();

  assert_eq!(view.emails, vec!["a@x.com"]);
  assert_eq!(all_rows(&s).await.len(), 1);
}

#[tokio::test]
async fn without_retries_contention_is_reported() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("ident.db");
  let s = store_with_retries(&path, 0).await;

  let blocker = hold_write_lock(&path, Duration::from_millis(400));
  let err = s.identify(req(Some("a@x.com"), None)).await.unwrap_err();
  blocker.join().unwrap();

  assert_eq!(err.kind(), ErrorKind::Transient, "{err}");
  assert!(all_rows(&s).await.is_empty());
}

#[tokio::test]
async fn concurrent_identical_requests_converge() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("ident.db");

  // Independent connections, so the file lock is what serialises them.
  let mut stores = Vec::new();
  for _ in 0..4 {
    stores.push(SqliteStore::open(&path).await.unwrap());
  }

  let mut handles = Vec::new();
  for i in 0..16 {
    let s = stores[i % stores.len()].clone();
    handles.push(tokio::spawn(async move {
      s.identify(req(Some("race@x.com"), Some("4242"))).await
    }));
  }

  let mut primaries = Vec::new();
  for h in handles {
    primaries.push(h.await.unwrap().unwrap().primary_contact_id);
  }
  primaries.dedup();
  assert_eq!(primaries.len(), 1);

  let rows = all_rows(&stores[0]).await;
  assert_eq!(rows.len(), 1);
  assert!(rows[0].is_primary());
}
