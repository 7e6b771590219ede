//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase strings and
//! statuses their catalog display names. The aggregate itself is canonical
//! JSON; legacy shapes are normalised by `visa-core` when it is decoded.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use visa_core::{history::Application, store::Versioned};

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn encode_version(version: u64) -> Result<i64> {
  i64::try_from(version).map_err(|_| Error::Corrupt(format!("version {version} out of range")))
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// Column values written for one aggregate.
pub struct ApplicationColumns {
  pub application_id:   String,
  pub current_status:   String,
  pub applicant_id:     String,
  pub assigned_handler: Option<String>,
  pub document:         String,
  pub created_at:       String,
  pub updated_at:       String,
}

impl ApplicationColumns {
  pub fn encode(application: &Application) -> Result<Self> {
    Ok(Self {
      application_id:   encode_uuid(application.id),
      current_status:   application.current_status.name().to_owned(),
      applicant_id:     application.applicant_id.clone(),
      assigned_handler: application.assigned_handler.clone(),
      document:         serde_json::to_string(application)?,
      created_at:       encode_dt(application.created_at),
      updated_at:       encode_dt(application.updated_at),
    })
  }
}

/// Raw values read directly from an `applications` row.
pub struct RawApplication {
  pub application_id: String,
  pub version:        i64,
  pub document:       String,
}

impl RawApplication {
  pub fn into_versioned(self) -> Result<Versioned<Application>> {
    let id = decode_uuid(&self.application_id)?;
    let value: Application = serde_json::from_str(&self.document)?;
    if value.id != id {
      return Err(Error::Corrupt(format!(
        "row {id} holds document for {}",
        value.id
      )));
    }
    let version = u64::try_from(self.version)
      .map_err(|_| Error::Corrupt(format!("row {id} has negative version")))?;
    Ok(Versioned { value, version })
  }

  pub fn into_application(self) -> Result<Application> {
    Ok(self.into_versioned()?.value)
  }
}
