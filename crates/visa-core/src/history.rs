//! The History Log and the [`Application`] aggregate that owns it.
//!
//! History entries are immutable once appended. The persisted shape has
//! evolved over time, so every entry is decoded through a lenient stored
//! shape ([`StoredEntry`]) and normalised into the canonical
//! [`HistoryEntry`] at the read boundary. Writes always use the canonical
//! shape.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  Error,
  status::{DEFAULT_NOTE_PREFIX, Status},
};

// ─── Documents ───────────────────────────────────────────────────────────────

/// A document stored alongside an application (passport scan, offer letter,
/// ...). Opaque to the lifecycle engine apart from its bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
  #[serde(rename = "type")]
  pub doc_type:      String,
  pub url:           String,
  #[serde(default)]
  pub original_name: String,
  #[serde(default)]
  pub size:          u64,
  #[serde(default)]
  pub content_type:  String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub upload_date:   Option<DateTime<Utc>>,
  #[serde(default)]
  pub storage_path:  String,
}

/// The reference a history entry keeps to the document its transition
/// produced. The full record lives in [`Application::documents`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDocument {
  pub url:           String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub original_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub storage_path:  Option<String>,
}

// ─── HistoryEntry ────────────────────────────────────────────────────────────

/// One immutable record of a status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "StoredEntry")]
pub struct HistoryEntry {
  pub status:             Status,
  /// When the transition was recorded. `None` only for legacy entries whose
  /// date was missing or unreadable.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub date:               Option<DateTime<Utc>>,
  pub note:               String,
  /// Set when `note` was synthesized rather than written by an operator.
  pub auto_note:          bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tentative_date:     Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub required_documents: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub attached_document:  Option<AttachedDocument>,
}

impl HistoryEntry {
  /// A new entry recorded at `at`. A missing or blank `note` is replaced by
  /// the status's default note and flagged as auto-generated.
  pub fn recorded(status: Status, at: DateTime<Utc>, note: Option<String>) -> Self {
    let (note, auto_note) = match note {
      Some(n) if !n.trim().is_empty() => (n, false),
      _ => (status.default_note(), true),
    };
    Self {
      status,
      date: Some(at),
      note,
      auto_note,
      tentative_date: None,
      required_documents: Vec::new(),
      attached_document: None,
    }
  }

  /// Sort key for chronological ordering; undated entries sort as the epoch.
  pub fn sort_date(&self) -> DateTime<Utc> {
    self.date.unwrap_or(DateTime::UNIX_EPOCH)
  }

  /// Whether the note is genuine operator commentary worth displaying.
  pub fn has_display_note(&self) -> bool {
    !self.auto_note && !self.note.trim().is_empty()
  }
}

/// Drop blank and whitespace-only document names, keeping order.
pub fn normalize_required_documents<I>(docs: I) -> Vec<String>
where
  I: IntoIterator<Item = String>,
{
  docs.into_iter().filter(|d| !d.trim().is_empty()).collect()
}

// ─── Read-boundary normalisation ─────────────────────────────────────────────

/// Every shape a history entry has ever been persisted in.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
  status:             String,
  #[serde(default)]
  date:               Value,
  #[serde(default)]
  note:               Option<String>,
  #[serde(default)]
  auto_note:          Option<bool>,
  #[serde(default)]
  tentative_date:     Value,
  #[serde(default)]
  required_documents: Option<Vec<String>>,
  /// Legacy singular form, superseded by `required_documents`.
  #[serde(default)]
  required_document:  Option<String>,
  #[serde(default)]
  attached_document:  Value,
}

impl TryFrom<StoredEntry> for HistoryEntry {
  type Error = Error;

  fn try_from(raw: StoredEntry) -> Result<Self, Self::Error> {
    let status: Status = raw.status.parse()?;
    let note = raw.note.unwrap_or_default();
    let auto_note = raw
      .auto_note
      .unwrap_or_else(|| note.contains(DEFAULT_NOTE_PREFIX));

    let mut required_documents =
      normalize_required_documents(raw.required_documents.unwrap_or_default());
    if required_documents.is_empty() {
      required_documents =
        normalize_required_documents(raw.required_document);
    }

    Ok(Self {
      status,
      date: decode_date(raw.date, "date"),
      note,
      auto_note,
      tentative_date: decode_date(raw.tentative_date, "tentativeDate"),
      required_documents,
      attached_document: decode_attached(raw.attached_document),
    })
  }
}

/// Decode a persisted date. Accepts RFC 3339 strings, plain `YYYY-MM-DD`
/// dates, epoch milliseconds and `{seconds, nanoseconds}` timestamp objects.
/// Anything else decodes to `None`.
fn decode_date(value: Value, field: &str) -> Option<DateTime<Utc>> {
  let decoded = match &value {
    Value::Null => return None,
    Value::String(s) if s.trim().is_empty() => return None,
    Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
      .map(|dt| dt.with_timezone(&Utc))
      .ok()
      .or_else(|| {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
          .ok()
          .and_then(|d| d.and_hms_opt(0, 0, 0))
          .map(|dt| dt.and_utc())
      }),
    Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
    Value::Object(map) => {
      let seconds = map
        .get("seconds")
        .or_else(|| map.get("_seconds"))
        .and_then(Value::as_i64);
      let nanos = match map.get("nanoseconds").or_else(|| map.get("_nanoseconds")) {
        None | Some(Value::Null) => Some(0),
        Some(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
      };
      seconds
        .zip(nanos)
        .and_then(|(s, n)| DateTime::from_timestamp(s, n))
    }
    _ => None,
  };

  if decoded.is_none() {
    tracing::warn!(field, raw = %value, "unreadable history date, treating as undated");
  }
  decoded
}

/// Older entries stored the attachment as a bare URL, or as an empty string
/// when there was none.
fn decode_attached(value: Value) -> Option<AttachedDocument> {
  match value {
    Value::String(url) if !url.trim().is_empty() => Some(AttachedDocument {
      url,
      original_name: None,
      storage_path: None,
    }),
    Value::Object(_) => serde_json::from_value::<AttachedDocument>(value)
      .ok()
      .filter(|d| !d.url.trim().is_empty()),
    _ => None,
  }
}

// ─── Application ─────────────────────────────────────────────────────────────

/// One applicant's visa-application case record: the aggregate root.
///
/// `current_status` always mirrors the status of the last entry in
/// `status_history`; the history is only ever appended to, through
/// [`Application::append`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
  pub id:               Uuid,
  #[serde(default)]
  pub applicant_id:     String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assigned_handler: Option<String>,
  pub current_status:   Status,
  pub status_history:   Vec<HistoryEntry>,
  #[serde(default)]
  pub documents:        Vec<DocumentRef>,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

impl Application {
  /// A freshly opened application holding a single seed entry for the
  /// catalog's initial status.
  pub fn open(
    id: Uuid,
    applicant_id: impl Into<String>,
    assigned_handler: Option<String>,
    now: DateTime<Utc>,
  ) -> Self {
    let seed = HistoryEntry::recorded(Status::initial(), now, None);
    Self {
      id,
      applicant_id: applicant_id.into(),
      assigned_handler,
      current_status: seed.status,
      status_history: vec![seed],
      documents: Vec::new(),
      created_at: now,
      updated_at: now,
    }
  }

  /// Append `entry` and move `current_status` to its status.
  pub fn append(&mut self, entry: HistoryEntry) {
    self.current_status = entry.status;
    if let Some(at) = entry.date {
      self.updated_at = at;
    }
    self.status_history.push(entry);
  }

  pub fn last_entry(&self) -> Option<&HistoryEntry> { self.status_history.last() }

  /// `current_status` agrees with the last history entry.
  pub fn is_consistent(&self) -> bool {
    self
      .last_entry()
      .is_some_and(|e| e.status == self.current_status)
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;

  fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

  fn decode(v: Value) -> HistoryEntry { serde_json::from_value(v).unwrap() }

  #[test]
  fn recorded_entry_synthesizes_missing_note() {
    let e = HistoryEntry::recorded(Status::VisaApproved, at(10), None);
    assert_eq!(e.note, "Status updated to Visa Approved");
    assert!(e.auto_note);
    assert!(!e.has_display_note());

    let blank = HistoryEntry::recorded(Status::VisaApproved, at(10), Some("  ".into()));
    assert!(blank.auto_note);

    let real = HistoryEntry::recorded(Status::VisaApproved, at(10), Some("Collect at embassy".into()));
    assert!(!real.auto_note);
    assert!(real.has_display_note());
  }

  #[test]
  fn legacy_required_document_becomes_a_list() {
    let e = decode(json!({
      "status": "Additional Documents Needed",
      "date": "2024-03-01T10:00:00Z",
      "note": "need passport",
      "requiredDocument": "Passport",
    }));
    assert_eq!(e.required_documents, vec!["Passport".to_string()]);
  }

  #[test]
  fn canonical_list_wins_over_legacy_field() {
    let e = decode(json!({
      "status": "Additional Documents Needed",
      "date": "2024-03-01T10:00:00Z",
      "requiredDocuments": ["Bank Statement", " "],
      "requiredDocument": "Passport",
    }));
    assert_eq!(e.required_documents, vec!["Bank Statement".to_string()]);
  }

  #[test]
  fn legacy_auto_note_is_inferred_from_text() {
    let e = decode(json!({
      "status": "Visa Approved",
      "date": "2024-03-01T10:00:00Z",
      "note": "Status updated to Visa Approved",
    }));
    assert!(e.auto_note);

    let flagged = decode(json!({
      "status": "Visa Approved",
      "date": "2024-03-01T10:00:00Z",
      "note": "Status updated to Visa Approved",
      "autoNote": false,
    }));
    assert!(!flagged.auto_note);
  }

  #[test]
  fn dates_decode_from_every_persisted_form() {
    let expected = at(1_700_000_000);
    for raw in [
      json!("2023-11-14T22:13:20Z"),
      json!(1_700_000_000_000_i64),
      json!({ "seconds": 1_700_000_000_i64, "nanoseconds": 0 }),
      json!({ "_seconds": 1_700_000_000_i64, "_nanoseconds": 0 }),
    ] {
      let e = decode(json!({ "status": "Document Submitted", "date": raw }));
      assert_eq!(e.date, Some(expected));
    }

    let day = decode(json!({ "status": "Document Submitted", "date": "2024-01-02" }));
    assert_eq!(day.date, Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()));
  }

  #[test]
  fn missing_or_malformed_dates_decode_as_undated() {
    for raw in [json!(null), json!(""), json!("not a date"), json!(true)] {
      let e = decode(json!({ "status": "Document Submitted", "date": raw }));
      assert_eq!(e.date, None);
      assert_eq!(e.sort_date(), DateTime::UNIX_EPOCH);
    }
    let e = decode(json!({ "status": "Document Submitted" }));
    assert_eq!(e.date, None);
  }

  #[test]
  fn out_of_range_nanoseconds_decode_as_undated() {
    for nanos in [json!(4_294_967_296_u64 + 5), json!(-1), json!("soon")] {
      let e = decode(json!({
        "status": "Document Submitted",
        "date": { "_seconds": 1_700_000_000_i64, "_nanoseconds": nanos },
      }));
      assert_eq!(e.date, None);
    }
  }

  #[test]
  fn empty_string_placeholders_decode_as_absent() {
    let e = decode(json!({
      "status": "Visa Approved",
      "date": "2024-03-01T10:00:00Z",
      "tentativeDate": "",
      "attachedDocument": "",
    }));
    assert_eq!(e.tentative_date, None);
    assert_eq!(e.attached_document, None);
  }

  #[test]
  fn bare_url_attachment_is_upgraded() {
    let e = decode(json!({
      "status": "Visa Approved",
      "date": "2024-03-01T10:00:00Z",
      "attachedDocument": "https://files.example/offer.pdf",
    }));
    assert_eq!(e.attached_document.unwrap().url, "https://files.example/offer.pdf");
  }

  #[test]
  fn unknown_status_fails_to_decode() {
    let res = serde_json::from_value::<HistoryEntry>(json!({
      "status": "Bogus Status",
      "date": "2024-03-01T10:00:00Z",
    }));
    assert!(res.is_err());
  }

  #[test]
  fn canonical_shape_omits_absent_fields() {
    let e = HistoryEntry::recorded(Status::DocumentSubmitted, at(0), None);
    let v = serde_json::to_value(&e).unwrap();
    let obj = v.as_object().unwrap();
    assert!(!obj.contains_key("tentativeDate"));
    assert!(!obj.contains_key("requiredDocuments"));
    assert!(!obj.contains_key("requiredDocument"));
    assert!(!obj.contains_key("attachedDocument"));
    assert!(obj.values().all(|v| !v.is_null()));
    assert_eq!(obj["status"], "Document Submitted");
  }

  #[test]
  fn open_seeds_a_consistent_aggregate() {
    let app = Application::open(Uuid::new_v4(), "applicant-1", None, at(5));
    assert_eq!(app.status_history.len(), 1);
    assert_eq!(app.current_status, Status::DocumentSubmitted);
    assert!(app.is_consistent());
  }

  #[test]
  fn append_moves_current_status() {
    let mut app = Application::open(Uuid::new_v4(), "applicant-1", None, at(5));
    app.append(HistoryEntry::recorded(Status::AdditionalDocumentsNeeded, at(6), None));
    assert_eq!(app.current_status, Status::AdditionalDocumentsNeeded);
    assert_eq!(app.updated_at, at(6));
    assert!(app.is_consistent());
  }

  #[test]
  fn aggregate_survives_a_json_round_trip() {
    let mut app = Application::open(Uuid::new_v4(), "applicant-1", Some("handler-1".into()), at(5));
    let mut e = HistoryEntry::recorded(Status::AdditionalDocumentsNeeded, at(6), Some("need passport".into()));
    e.required_documents = vec!["Passport".into()];
    app.append(e);

    let json = serde_json::to_string(&app).unwrap();
    let back: Application = serde_json::from_str(&json).unwrap();
    assert_eq!(back, app);
  }
}
