//! The Status Catalog: the fixed table of recognised application statuses.
//!
//! The catalog is the only place status names, their canonical ordering and
//! their display metadata are written down. Everything else refers to a
//! status through [`Status`] and looks its metadata up here, so extending the
//! flow means adding a variant and a row to [`CATALOG`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{EnumCount, EnumIter};

use crate::Error;

// ─── Status ──────────────────────────────────────────────────────────────────

/// A named stage in the canonical visa-application flow.
///
/// On the wire a status is its display name (e.g. `"Visa Approved"`); an
/// unrecognised name fails to parse with [`Error::InvalidStatus`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  EnumCount,
  EnumIter,
  Serialize,
  Deserialize,
)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Status {
  DocumentSubmitted,
  AdditionalDocumentsNeeded,
  AdditionalDocumentSubmitted,
  VisaApproved,
}

impl Status {
  /// The first stage of the flow; every application is seeded with it.
  pub fn initial() -> Self { CATALOG[0].status }

  /// The catalog row for this status.
  pub fn entry(self) -> &'static CatalogEntry { &CATALOG[self as usize] }

  pub fn name(self) -> &'static str { self.entry().name }

  pub fn slug(self) -> &'static str { self.entry().slug }

  /// Ordinal position in the canonical flow, starting at 1.
  pub fn step(self) -> u8 { self.entry().step }

  /// The note recorded when a transition is applied without one.
  pub fn default_note(self) -> String {
    format!("{DEFAULT_NOTE_PREFIX} {}", self.name())
  }
}

/// Leading phrase of every synthesized transition note.
pub(crate) const DEFAULT_NOTE_PREFIX: &str = "Status updated to";

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Status {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    CATALOG
      .iter()
      .find(|e| e.name == s)
      .map(|e| e.status)
      .ok_or_else(|| Error::InvalidStatus(s.to_owned()))
  }
}

impl TryFrom<String> for Status {
  type Error = Error;

  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<Status> for &'static str {
  fn from(s: Status) -> Self { s.name() }
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// One row of the Status Catalog.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
  pub status:              Status,
  #[serde(skip)]
  pub name:                &'static str,
  /// Path-safe identifier, used for storage paths and default document types.
  pub slug:                &'static str,
  pub step:                u8,
  pub default_message:     &'static str,
  /// Typical number of days until this stage completes. Informational only.
  pub default_offset_days: u32,
}

/// Display metadata returned by [`metadata_of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMetadata {
  pub step:            u8,
  pub default_message: &'static str,
}

/// The catalog, in canonical flow order. Row `i` describes the status whose
/// discriminant is `i`.
pub static CATALOG: [CatalogEntry; Status::COUNT] = [
  CatalogEntry {
    status:              Status::DocumentSubmitted,
    name:                "Document Submitted",
    slug:                "document_submitted",
    step:                1,
    default_message:     "Your documents have been received and are under review.",
    default_offset_days: 7,
  },
  CatalogEntry {
    status:              Status::AdditionalDocumentsNeeded,
    name:                "Additional Documents Needed",
    slug:                "additional_documents_needed",
    step:                2,
    default_message:     "Additional documents are required to continue processing your application.",
    default_offset_days: 14,
  },
  CatalogEntry {
    status:              Status::AdditionalDocumentSubmitted,
    name:                "Additional Document Submitted",
    slug:                "additional_document_submitted",
    step:                3,
    default_message:     "Your additional documents have been received and are under review.",
    default_offset_days: 7,
  },
  CatalogEntry {
    status:              Status::VisaApproved,
    name:                "Visa Approved",
    slug:                "visa_approved",
    step:                4,
    default_message:     "Congratulations, your visa has been approved.",
    default_offset_days: 0,
  },
];

/// The full catalog in canonical order.
pub fn catalog() -> &'static [CatalogEntry] { &CATALOG }

pub fn is_valid_status(name: &str) -> bool { name.parse::<Status>().is_ok() }

/// Canonical ordinal of the named status, or `None` if it is not catalogued.
pub fn ordinal_of(name: &str) -> Option<u8> {
  name.parse::<Status>().ok().map(Status::step)
}

pub fn metadata_of(status: Status) -> StatusMetadata {
  let entry = status.entry();
  StatusMetadata {
    step:            entry.step,
    default_message: entry.default_message,
  }
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator as _;

  use super::*;

  #[test]
  fn catalog_rows_line_up_with_discriminants() {
    for (i, status) in Status::iter().enumerate() {
      assert_eq!(CATALOG[i].status, status);
      assert_eq!(status.step() as usize, i + 1);
    }
  }

  #[test]
  fn names_round_trip_through_parsing() {
    for status in Status::iter() {
      assert_eq!(status.name().parse::<Status>().unwrap(), status);
      assert!(is_valid_status(status.name()));
    }
  }

  #[test]
  fn unknown_status_is_rejected() {
    assert!(!is_valid_status("Bogus Status"));
    assert_eq!(ordinal_of("Bogus Status"), None);
    assert!(matches!(
      "visa approved".parse::<Status>(),
      Err(Error::InvalidStatus(s)) if s == "visa approved"
    ));
  }

  #[test]
  fn ordinals_follow_the_canonical_flow() {
    assert_eq!(ordinal_of("Document Submitted"), Some(1));
    assert_eq!(ordinal_of("Additional Documents Needed"), Some(2));
    assert_eq!(ordinal_of("Additional Document Submitted"), Some(3));
    assert_eq!(ordinal_of("Visa Approved"), Some(4));
    assert_eq!(Status::initial(), Status::DocumentSubmitted);
  }

  #[test]
  fn metadata_comes_from_the_catalog() {
    let meta = metadata_of(Status::AdditionalDocumentsNeeded);
    assert_eq!(meta.step, 2);
    assert_eq!(
      meta.default_message,
      CATALOG[1].default_message
    );
  }

  #[test]
  fn serde_uses_display_names() {
    let json = serde_json::to_string(&Status::VisaApproved).unwrap();
    assert_eq!(json, "\"Visa Approved\"");
    let parsed: Status =
      serde_json::from_str("\"Additional Documents Needed\"").unwrap();
    assert_eq!(parsed, Status::AdditionalDocumentsNeeded);
    assert!(serde_json::from_str::<Status>("\"Bogus Status\"").is_err());
  }

  #[test]
  fn default_note_names_the_status() {
    assert_eq!(
      Status::VisaApproved.default_note(),
      "Status updated to Visa Approved"
    );
  }
}
