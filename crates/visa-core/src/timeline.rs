//! Timeline reconstruction: turn a raw History Log into display groups.
//!
//! The log may visit the same status several times and its insertion order
//! need not match the embedded dates. Reconstruction folds every visit to a
//! status into one group, keeps each genuine operator note, and orders the
//! groups by their position in the canonical flow.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  history::{AttachedDocument, HistoryEntry},
  status::Status,
};

/// An operator note surfaced in a timeline group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineNote {
  pub note: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub date: Option<DateTime<Utc>>,
}

/// Every visit to one status, collapsed for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineGroup {
  pub status:             Status,
  pub step:               u8,
  /// Catalog default message for the status.
  pub message:            &'static str,
  /// Date of the most recent visit.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub date:               Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tentative_date:     Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub required_documents: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub attached_document:  Option<AttachedDocument>,
  /// Operator notes from every visit, oldest first. Synthesized notes are
  /// left out.
  pub notes:              Vec<TimelineNote>,
  /// Number of history entries folded into this group.
  pub visits:             usize,
}

impl TimelineGroup {
  /// A group whose representative values come from `entry`, the most recent
  /// visit to its status.
  fn seeded_by(entry: &HistoryEntry) -> Self {
    let catalog = entry.status.entry();
    Self {
      status:             entry.status,
      step:               catalog.step,
      message:            catalog.default_message,
      date:               entry.date,
      tentative_date:     entry.tentative_date,
      required_documents: entry.required_documents.clone(),
      attached_document:  entry.attached_document.clone(),
      notes:              Vec::new(),
      visits:             0,
    }
  }
}

/// Reconstruct the display timeline for `history`.
///
/// Groups come out most-advanced stage first. Statuses absent from the log
/// produce no group, and an empty log produces an empty timeline.
pub fn reconstruct_timeline(history: &[HistoryEntry]) -> Vec<TimelineGroup> {
  // Newest first. Undated entries sort as the epoch; among equal dates the
  // later-appended entry is the newer one.
  let mut order: Vec<usize> = (0..history.len()).collect();
  order.sort_by(|&a, &b| {
    history[b]
      .sort_date()
      .cmp(&history[a].sort_date())
      .then(b.cmp(&a))
  });

  let mut groups: Vec<TimelineGroup> = Vec::new();
  for idx in order {
    let entry = &history[idx];
    let pos = match groups.iter().position(|g| g.status == entry.status) {
      Some(pos) => pos,
      None => {
        groups.push(TimelineGroup::seeded_by(entry));
        groups.len() - 1
      }
    };

    let group = &mut groups[pos];
    group.visits += 1;
    if entry.has_display_note() {
      group.notes.push(TimelineNote {
        note: entry.note.clone(),
        date: entry.date,
      });
    }
  }

  for group in &mut groups {
    group.notes.reverse();
  }

  // Stable, so equal steps keep discovery order.
  groups.sort_by(|a, b| b.step.cmp(&a.step));
  groups
}
