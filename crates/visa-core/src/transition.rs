//! The Transition Processor: the only code path that mutates an
//! [`Application`].
//!
//! Every mutation is a read-modify-write of the whole aggregate, committed
//! with a compare-and-swap on the version the aggregate was read at. A lost
//! race is retried once against a fresh read; a second loss surfaces as
//! [`Error::StoreWriteConflict`].

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  error::StoreStep,
  history::{
    Application, AttachedDocument, DocumentRef, HistoryEntry,
    normalize_required_documents,
  },
  status::Status,
  store::{ApplicationQuery, ApplicationStore, BlobStore, PutOutcome, Versioned},
  timeline::{TimelineGroup, reconstruct_timeline},
};

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// A binary produced alongside a transition (e.g. an offer letter).
#[derive(Debug, Clone)]
pub struct Attachment {
  pub data:     Bytes,
  pub filename: String,
  /// Document type recorded in [`Application::documents`]. Defaults to the
  /// status slug.
  pub doc_type: Option<String>,
}

/// Optional settings for [`TransitionProcessor::apply_transition`]. Every
/// field defaults independently.
#[derive(Debug, Clone, Default)]
pub struct TransitionOptions {
  /// Operator note; synthesized from the status when absent or blank.
  pub note:               Option<String>,
  /// When the applicant should expect the next update.
  pub tentative_date:     Option<DateTime<Utc>>,
  /// Documents the applicant still has to supply. Blank names are dropped.
  pub required_documents: Option<Vec<String>>,
  pub attachment:         Option<Attachment>,
}

// ─── Processor ───────────────────────────────────────────────────────────────

/// Applies lifecycle changes to applications held in `S`, storing
/// attachments in `B`.
pub struct TransitionProcessor<S, B> {
  store: Arc<S>,
  blobs: Arc<B>,
}

impl<S, B> Clone for TransitionProcessor<S, B> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      blobs: Arc::clone(&self.blobs),
    }
  }
}

impl<S, B> TransitionProcessor<S, B>
where
  S: ApplicationStore,
  B: BlobStore,
{
  pub fn new(store: Arc<S>, blobs: Arc<B>) -> Self { Self { store, blobs } }

  // ── Intake ────────────────────────────────────────────────────────────

  /// Create an application seeded with the catalog's initial status.
  pub async fn open_application(
    &self,
    applicant_id: &str,
    assigned_handler: Option<String>,
  ) -> Result<Application> {
    let application =
      Application::open(Uuid::new_v4(), applicant_id, assigned_handler, Utc::now());
    self
      .store
      .insert(&application)
      .await
      .map_err(|e| Error::store(StoreStep::Insert, e))?;
    info!(application_id = %application.id, applicant_id, "application opened");
    Ok(application)
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  pub async fn get(&self, id: Uuid) -> Result<Application> {
    Ok(self.load(id).await?.value)
  }

  pub async fn list(&self, query: &ApplicationQuery) -> Result<Vec<Application>> {
    self
      .store
      .list(query)
      .await
      .map_err(|e| Error::store(StoreStep::List, e))
  }

  /// Load an application and reconstruct its display timeline.
  pub async fn timeline(&self, id: Uuid) -> Result<Vec<TimelineGroup>> {
    let application = self.get(id).await?;
    Ok(reconstruct_timeline(&application.status_history))
  }

  // ── Mutations ─────────────────────────────────────────────────────────

  /// Move application `id` to `status`, appending one history entry.
  ///
  /// Validation happens before any side effect. If an attachment is given it
  /// is uploaded before the aggregate is written; if the write then fails the
  /// upload is removed again, so a failed call never leaves a recorded
  /// document without its history entry.
  #[tracing::instrument(skip(self, options), fields(application_id = %id))]
  pub async fn apply_transition(
    &self,
    id: Uuid,
    status: &str,
    options: TransitionOptions,
  ) -> Result<Application> {
    let status: Status = status.parse()?;
    let current = self.load(id).await?;
    debug!(from = %current.value.current_status, to = %status, "transition validated");

    let TransitionOptions {
      note,
      tentative_date,
      required_documents,
      attachment,
    } = options;

    let uploaded = match attachment {
      Some(attachment) => Some(self.upload(id, status, attachment).await?),
      None => None,
    };

    let mut entry = HistoryEntry::recorded(status, Utc::now(), note);
    entry.tentative_date = tentative_date;
    entry.required_documents =
      normalize_required_documents(required_documents.unwrap_or_default());
    entry.attached_document = uploaded.as_ref().map(|doc| AttachedDocument {
      url:           doc.url.clone(),
      original_name: Some(doc.original_name.clone()),
      storage_path:  Some(doc.storage_path.clone()),
    });

    let committed = self
      .commit(current, |app| {
        let mut entry = entry.clone();
        // Dates never go backwards within a log.
        let floor = app.last_entry().map(HistoryEntry::sort_date);
        entry.date = Some(Utc::now().max(floor.unwrap_or(DateTime::UNIX_EPOCH)));
        app.append(entry);
        if let Some(doc) = &uploaded {
          app.documents.push(doc.clone());
        }
      })
      .await;

    match committed {
      Ok((application, version)) => {
        debug_assert!(application.is_consistent());
        info!(
          status = %status,
          history_len = application.status_history.len(),
          version,
          "transition applied"
        );
        Ok(application)
      }
      Err(e) => {
        if let Some(doc) = &uploaded {
          self.discard_upload(&doc.storage_path).await;
        }
        Err(e)
      }
    }
  }

  /// Set or clear the case handler assigned to application `id`.
  pub async fn assign_handler(
    &self,
    id: Uuid,
    handler: Option<String>,
  ) -> Result<Application> {
    let current = self.load(id).await?;
    let (application, _) = self
      .commit(current, |app| {
        app.assigned_handler = handler.clone();
        app.updated_at = Utc::now();
      })
      .await?;
    info!(application_id = %id, handler = ?application.assigned_handler, "handler assigned");
    Ok(application)
  }

  // ── Internals ─────────────────────────────────────────────────────────

  async fn load(&self, id: Uuid) -> Result<Versioned<Application>> {
    self
      .store
      .get(id)
      .await
      .map_err(|e| Error::store(StoreStep::Load, e))?
      .ok_or(Error::NotFound(id))
  }

  /// Apply `mutate` to `current` and write it back, retrying once against a
  /// fresh read if the version moved underneath us. Returns the written
  /// aggregate and its new version.
  async fn commit<F>(
    &self,
    mut current: Versioned<Application>,
    mutate: F,
  ) -> Result<(Application, u64)>
  where
    F: Fn(&mut Application) + Send,
  {
    let id = current.value.id;
    let mut retried = false;
    loop {
      let Versioned { value: mut application, version } = current;
      mutate(&mut application);

      let outcome = self
        .store
        .put(&application, version)
        .await
        .map_err(|e| Error::store(StoreStep::Write, e))?;

      match outcome {
        PutOutcome::Written(new_version) => {
          debug!(application_id = %id, version = new_version, "aggregate written");
          return Ok((application, new_version));
        }
        PutOutcome::Missing => return Err(Error::NotFound(id)),
        PutOutcome::Conflict if !retried => {
          warn!(application_id = %id, version, "write conflict, retrying against a fresh read");
          retried = true;
          current = self.load(id).await?;
        }
        PutOutcome::Conflict => return Err(Error::StoreWriteConflict(id)),
      }
    }
  }

  async fn upload(
    &self,
    id: Uuid,
    status: Status,
    attachment: Attachment,
  ) -> Result<DocumentRef> {
    let Attachment { data, filename, doc_type } = attachment;
    let digest = hex::encode(Sha256::digest(&data));
    // Each upload gets its own directory so discarding it can never touch a
    // blob an earlier transition committed.
    let path = format!(
      "applications/{id}/{}/{}/{}-{}",
      status.slug(),
      Uuid::new_v4().simple(),
      &digest[..16],
      sanitize_filename(&filename)
    );
    let size = data.len() as u64;

    let stored = self
      .blobs
      .store(data, &path)
      .await
      .map_err(|e| Error::UploadFailed(Box::new(e)))?;
    debug!(path = %stored.path, size, "attachment stored");

    Ok(DocumentRef {
      doc_type:      doc_type
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| status.slug().to_owned()),
      url:           stored.url,
      original_name: filename,
      size,
      content_type:  stored.content_type,
      upload_date:   Some(Utc::now()),
      storage_path:  stored.path,
    })
  }

  /// Best-effort removal of an upload whose transition did not commit. The
  /// caller still receives the error that aborted the transition.
  async fn discard_upload(&self, path: &str) {
    match self.blobs.remove(path).await {
      Ok(()) => warn!(path, "removed attachment of failed transition"),
      Err(e) => warn!(path, error = %e, "could not remove attachment of failed transition"),
    }
  }
}

/// Reduce a client-supplied filename to a safe single path segment.
pub fn sanitize_filename(name: &str) -> String {
  let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
  let cleaned: String = base
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
        c
      } else {
        '_'
      }
    })
    .collect();
  let cleaned = cleaned.trim_start_matches('.');
  if cleaned.is_empty() {
    "attachment".to_owned()
  } else {
    cleaned.to_owned()
  }
}
