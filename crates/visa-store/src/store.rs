//! [`SqliteStore`] is the SQLite implementation of [`ApplicationStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use visa_core::{
  history::Application,
  store::{
    ApplicationQuery, ApplicationStore, DEFAULT_LIST_LIMIT, PutOutcome, Versioned,
  },
};

use crate::{
  Error, Result,
  encode::{ApplicationColumns, RawApplication, encode_uuid, encode_version},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An application document store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mainly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── ApplicationStore impl ───────────────────────────────────────────────────

impl ApplicationStore for SqliteStore {
  type Error = Error;

  async fn insert(&self, application: &Application) -> Result<u64> {
    let id = application.id;
    let cols = ApplicationColumns::encode(application)?;

    let inserted = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "INSERT INTO applications (
             application_id, version, current_status, applicant_id,
             assigned_handler, document, created_at, updated_at
           ) VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT (application_id) DO NOTHING",
          rusqlite::params![
            cols.application_id,
            cols.current_status,
            cols.applicant_id,
            cols.assigned_handler,
            cols.document,
            cols.created_at,
            cols.updated_at,
          ],
        )?;
        Ok(changed == 1)
      })
      .await?;

    if !inserted {
      return Err(Error::AlreadyExists(id));
    }
    Ok(1)
  }

  async fn get(&self, id: Uuid) -> Result<Option<Versioned<Application>>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawApplication> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT application_id, version, document
               FROM applications WHERE application_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawApplication {
                  application_id: row.get(0)?,
                  version:        row.get(1)?,
                  document:       row.get(2)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawApplication::into_versioned).transpose()
  }

  async fn put(&self, application: &Application, expected: u64) -> Result<PutOutcome> {
    let cols = ApplicationColumns::encode(application)?;
    let expected_i64 = encode_version(expected)?;

    // `None` means the row is gone; `Some(false)` means the version moved.
    let written: Option<bool> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE applications
           SET version          = version + 1,
               current_status   = ?3,
               applicant_id     = ?4,
               assigned_handler = ?5,
               document         = ?6,
               updated_at       = ?7
           WHERE application_id = ?1 AND version = ?2",
          rusqlite::params![
            cols.application_id,
            expected_i64,
            cols.current_status,
            cols.applicant_id,
            cols.assigned_handler,
            cols.document,
            cols.updated_at,
          ],
        )?;
        if changed == 1 {
          return Ok(Some(true));
        }

        let exists = conn
          .query_row(
            "SELECT 1 FROM applications WHERE application_id = ?1",
            rusqlite::params![cols.application_id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        Ok(exists.then_some(false))
      })
      .await?;

    Ok(match written {
      Some(true) => PutOutcome::Written(expected + 1),
      Some(false) => {
        tracing::debug!(application_id = %application.id, expected, "stale write rejected");
        PutOutcome::Conflict
      }
      None => PutOutcome::Missing,
    })
  }

  async fn list(&self, query: &ApplicationQuery) -> Result<Vec<Application>> {
    let status     = query.status.map(|s| s.name().to_owned());
    let applicant  = query.applicant_id.clone();
    let handler    = query.assigned_handler.clone();
    let limit_val  = clamp_i64(query.limit.unwrap_or(DEFAULT_LIST_LIMIT));
    let offset_val = clamp_i64(query.offset.unwrap_or(0));

    let raws: Vec<RawApplication> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT application_id, version, document
           FROM applications
           WHERE (?1 IS NULL OR current_status   = ?1)
             AND (?2 IS NULL OR applicant_id     = ?2)
             AND (?3 IS NULL OR assigned_handler = ?3)
           ORDER BY created_at, application_id
           LIMIT ?4 OFFSET ?5",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![status, applicant, handler, limit_val, offset_val],
            |row| {
              Ok(RawApplication {
                application_id: row.get(0)?,
                version:        row.get(1)?,
                document:       row.get(2)?,
              })
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawApplication::into_application).collect()
  }
}

/// SQLite binds signed integers; anything past `i64::MAX` means "no bound".
fn clamp_i64(n: usize) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }
