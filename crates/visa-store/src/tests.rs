//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::{
  Arc,
  atomic::{AtomicUsize, Ordering},
};

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use uuid::Uuid;
use visa_core::{
  Attachment, Error as CoreError, Status, TransitionOptions, TransitionProcessor,
  history::{Application, HistoryEntry},
  store::{ApplicationQuery, ApplicationStore, DEFAULT_LIST_LIMIT, PutOutcome, Versioned},
  timeline::reconstruct_timeline,
};

use crate::{Error, FsBlobStore, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn application(applicant: &str) -> Application {
  Application::open(
    Uuid::new_v4(),
    applicant,
    None,
    Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
  )
}

// ─── Insert / get ────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_get_application() {
  let s = store().await;
  let app = application("applicant-1");

  assert_eq!(s.insert(&app).await.unwrap(), 1);

  let fetched = s.get(app.id).await.unwrap().unwrap();
  assert_eq!(fetched.version, 1);
  assert_eq!(fetched.value, app);
}

#[tokio::test]
async fn get_missing_returns_none() {
  let s = store().await;
  assert!(s.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_insert_is_rejected() {
  let s = store().await;
  let app = application("applicant-1");
  s.insert(&app).await.unwrap();
  assert!(matches!(s.insert(&app).await, Err(Error::AlreadyExists(id)) if id == app.id));
}

// ─── Conditional writes ──────────────────────────────────────────────────────

#[tokio::test]
async fn put_with_current_version_bumps_version() {
  let s = store().await;
  let mut app = application("applicant-1");
  s.insert(&app).await.unwrap();

  app.assigned_handler = Some("handler-1".into());
  assert_eq!(s.put(&app, 1).await.unwrap(), PutOutcome::Written(2));

  let fetched = s.get(app.id).await.unwrap().unwrap();
  assert_eq!(fetched.version, 2);
  assert_eq!(fetched.value.assigned_handler.as_deref(), Some("handler-1"));
}

#[tokio::test]
async fn put_with_stale_version_conflicts() {
  let s = store().await;
  let app = application("applicant-1");
  s.insert(&app).await.unwrap();
  s.put(&app, 1).await.unwrap();

  assert_eq!(s.put(&app, 1).await.unwrap(), PutOutcome::Conflict);
  assert_eq!(s.get(app.id).await.unwrap().unwrap().version, 2);
}

#[tokio::test]
async fn put_for_missing_row_reports_missing() {
  let s = store().await;
  let app = application("applicant-1");
  assert_eq!(s.put(&app, 1).await.unwrap(), PutOutcome::Missing);
}

// ─── Listing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_filters_by_applicant_handler_and_status() {
  let s = store().await;
  let a = application("alice");
  let mut b = application("bob");
  b.assigned_handler = Some("handler-1".into());
  b.append(HistoryEntry::recorded(
    Status::VisaApproved,
    Utc.timestamp_opt(1_700_000_100, 0).unwrap(),
    None,
  ));
  s.insert(&a).await.unwrap();
  s.insert(&b).await.unwrap();

  let all = s.list(&ApplicationQuery::default()).await.unwrap();
  assert_eq!(all.len(), 2);

  let alice = s
    .list(&ApplicationQuery { applicant_id: Some("alice".into()), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(alice.len(), 1);
  assert_eq!(alice[0].id, a.id);

  let handled = s
    .list(&ApplicationQuery { assigned_handler: Some("handler-1".into()), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(handled.len(), 1);
  assert_eq!(handled[0].id, b.id);

  let approved = s
    .list(&ApplicationQuery { status: Some(Status::VisaApproved), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(approved.len(), 1);
  assert_eq!(approved[0].id, b.id);
}

#[tokio::test]
async fn list_respects_limit_and_offset() {
  let s = store().await;
  for i in 0..5 {
    s.insert(&application(&format!("applicant-{i}"))).await.unwrap();
  }
  let page = s
    .list(&ApplicationQuery { limit: Some(2), offset: Some(4), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(page.len(), 1);
}

#[tokio::test]
async fn list_pages_by_default_and_accepts_huge_bounds() {
  let s = store().await;
  for i in 0..(DEFAULT_LIST_LIMIT + 1) {
    s.insert(&application(&format!("applicant-{i}"))).await.unwrap();
  }

  let page = s.list(&ApplicationQuery::default()).await.unwrap();
  assert_eq!(page.len(), DEFAULT_LIST_LIMIT);

  let everything = s
    .list(&ApplicationQuery { limit: Some(usize::MAX), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(everything.len(), DEFAULT_LIST_LIMIT + 1);

  let past_the_end = s
    .list(&ApplicationQuery { offset: Some(usize::MAX), ..Default::default() })
    .await
    .unwrap();
  assert!(past_the_end.is_empty());
}

// ─── Legacy documents ────────────────────────────────────────────────────────

#[tokio::test]
async fn legacy_document_is_normalised_on_read() {
  let s = store().await;
  let id = Uuid::new_v4();
  let document = serde_json::json!({
    "id": id,
    "currentStatus": "Additional Documents Needed",
    "statusHistory": [
      { "status": "Document Submitted", "date": { "seconds": 1_700_000_000_i64, "nanoseconds": 0 },
        "note": "Status updated to Document Submitted" },
      { "status": "Additional Documents Needed", "date": "2023-11-20T09:00:00Z",
        "note": "need passport", "requiredDocument": "Passport", "tentativeDate": "" }
    ],
    "documents": [
      { "type": "passport", "url": "https://files.example/p.pdf" }
    ],
    "createdAt": "2023-11-14T22:13:20Z",
    "updatedAt": "2023-11-20T09:00:00Z"
  })
  .to_string();

  let id_str = id.to_string();
  s.conn
    .call(move |conn| {
      conn.execute(
        "INSERT INTO applications (application_id, version, current_status, applicant_id,
           assigned_handler, document, created_at, updated_at)
         VALUES (?1, 3, 'Additional Documents Needed', '', NULL, ?2,
           '2023-11-14T22:13:20Z', '2023-11-20T09:00:00Z')",
        rusqlite::params![id_str, document],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let fetched = s.get(id).await.unwrap().unwrap();
  assert_eq!(fetched.version, 3);
  let app = fetched.value;
  assert!(app.is_consistent());
  assert!(app.status_history[0].auto_note);
  assert_eq!(app.status_history[1].required_documents, vec!["Passport".to_string()]);
  assert_eq!(app.status_history[1].tentative_date, None);
  assert_eq!(app.documents[0].storage_path, "");

  let timeline = reconstruct_timeline(&app.status_history);
  assert_eq!(timeline[0].status, Status::AdditionalDocumentsNeeded);
  assert_eq!(timeline[0].required_documents, vec!["Passport".to_string()]);
  assert!(timeline[1].notes.is_empty());
}

// ─── End to end ──────────────────────────────────────────────────────────────

async fn processor() -> (TempDir, TransitionProcessor<SqliteStore, FsBlobStore>) {
  let dir = TempDir::new().unwrap();
  let blobs = FsBlobStore::new(dir.path(), "https://files.example");
  let p = TransitionProcessor::new(Arc::new(store().await), Arc::new(blobs));
  (dir, p)
}

#[tokio::test]
async fn transitions_persist_through_sqlite() {
  let (dir, p) = processor().await;
  let app = p.open_application("applicant-1", None).await.unwrap();

  p.apply_transition(app.id, "Additional Documents Needed", TransitionOptions {
    note: Some("need passport".into()),
    required_documents: Some(vec!["Passport".into(), "  ".into()]),
    ..Default::default()
  })
  .await
  .unwrap();

  let approved = p
    .apply_transition(app.id, "Visa Approved", TransitionOptions {
      attachment: Some(Attachment {
        data:     Bytes::from_static(b"%PDF offer"),
        filename: "offer.pdf".into(),
        doc_type: Some("offer_letter".into()),
      }),
      ..Default::default()
    })
    .await
    .unwrap();

  let reloaded = p.get(app.id).await.unwrap();
  assert_eq!(reloaded, approved);
  assert_eq!(reloaded.status_history.len(), 3);
  assert_eq!(reloaded.current_status, Status::VisaApproved);
  assert_eq!(reloaded.status_history[1].required_documents, vec!["Passport".to_string()]);

  let doc = &reloaded.documents[0];
  assert_eq!(doc.doc_type, "offer_letter");
  assert_eq!(doc.content_type, "application/pdf");
  assert!(dir.path().join(&doc.storage_path).exists());
}

#[tokio::test]
async fn invalid_status_is_rejected_before_touching_sqlite() {
  let (_dir, p) = processor().await;
  let app = p.open_application("applicant-1", None).await.unwrap();

  let err = p
    .apply_transition(app.id, "Bogus Status", TransitionOptions::default())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvalidStatus(_)));

  let reloaded = p.get(app.id).await.unwrap();
  assert_eq!(reloaded.status_history, app.status_history);
}

// A SqliteStore whose next `conflicts` writes lose a simulated race.
struct ContendedStore {
  inner:     SqliteStore,
  conflicts: AtomicUsize,
}

impl ApplicationStore for ContendedStore {
  type Error = Error;

  async fn insert(&self, application: &Application) -> Result<u64, Error> {
    self.inner.insert(application).await
  }

  async fn get(&self, id: Uuid) -> Result<Option<Versioned<Application>>, Error> {
    self.inner.get(id).await
  }

  async fn put(&self, application: &Application, expected: u64) -> Result<PutOutcome, Error> {
    if self
      .conflicts
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok()
    {
      return Ok(PutOutcome::Conflict);
    }
    self.inner.put(application, expected).await
  }

  async fn list(&self, query: &ApplicationQuery) -> Result<Vec<Application>, Error> {
    self.inner.list(query).await
  }
}

#[tokio::test]
async fn failed_resend_keeps_the_committed_blob() {
  let dir = TempDir::new().unwrap();
  let store = Arc::new(ContendedStore {
    inner:     store().await,
    conflicts: AtomicUsize::new(0),
  });
  let blobs = FsBlobStore::new(dir.path(), "https://files.example");
  let p = TransitionProcessor::new(Arc::clone(&store), Arc::new(blobs));
  let app = p.open_application("applicant-1", None).await.unwrap();

  let offer = || TransitionOptions {
    attachment: Some(Attachment {
      data:     Bytes::from_static(b"%PDF offer"),
      filename: "offer.pdf".into(),
      doc_type: None,
    }),
    ..Default::default()
  };

  let first = p.apply_transition(app.id, "Visa Approved", offer()).await.unwrap();
  let committed = first.documents[0].storage_path.clone();
  assert!(dir.path().join(&committed).exists());

  store.conflicts.store(2, Ordering::SeqCst);
  let err = p
    .apply_transition(app.id, "Visa Approved", offer())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::StoreWriteConflict(id) if id == app.id));

  let reloaded = p.get(app.id).await.unwrap();
  assert_eq!(reloaded.documents.len(), 1);
  assert_eq!(reloaded.documents[0].storage_path, committed);
  assert!(dir.path().join(&committed).exists());

  // Only the committed upload remains under the status directory.
  let status_dir = dir
    .path()
    .join(format!("applications/{}/visa_approved", app.id));
  let files: usize = std::fs::read_dir(status_dir)
    .unwrap()
    .map(|upload| std::fs::read_dir(upload.unwrap().path()).unwrap().count())
    .sum();
  assert_eq!(files, 1);
}
