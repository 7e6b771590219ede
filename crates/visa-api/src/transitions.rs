//! `POST /applications/:id/transitions`: move an application to a new
//! status.
//!
//! Body: [`TransitionBody`]. The optional attachment travels inline as
//! base64 and is capped at the configured size.

use axum::{Json, extract::State};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use visa_core::{
  Attachment, TransitionOptions,
  history::Application,
  store::{ApplicationStore, BlobStore},
};

use crate::{
  AppState,
  applications::load_visible,
  auth::Caller,
  error::ApiError,
  extract::{ApiJson, ApiPath},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionBody {
  pub status:             String,
  pub note:               Option<String>,
  pub tentative_date:     Option<DateTime<Utc>>,
  pub required_documents: Option<Vec<String>>,
  pub attachment:         Option<AttachmentBody>,
}

#[derive(Debug, Deserialize)]
pub struct AttachmentBody {
  /// Base64 (standard alphabet, padded).
  pub data:     String,
  pub filename: String,
  #[serde(rename = "type")]
  pub doc_type: Option<String>,
}

impl AttachmentBody {
  fn decode(self, limit: usize) -> Result<Attachment, ApiError> {
    // Reject on the encoded length first so oversized payloads are never
    // decoded.
    if self.data.len() / 4 * 3 > limit + 2 {
      return Err(ApiError::PayloadTooLarge { limit });
    }
    let data = B64
      .decode(self.data.trim())
      .map_err(|e| ApiError::BadRequest(format!("attachment is not valid base64: {e}")))?;
    if data.len() > limit {
      return Err(ApiError::PayloadTooLarge { limit });
    }
    if self.filename.trim().is_empty() {
      return Err(ApiError::BadRequest("attachment filename is required".into()));
    }
    Ok(Attachment {
      data:     Bytes::from(data),
      filename: self.filename,
      doc_type: self.doc_type,
    })
  }
}

/// `POST /applications/:id/transitions`
pub async fn apply<S, B>(
  State(state): State<AppState<S, B>>,
  caller: Caller,
  ApiPath(id): ApiPath<Uuid>,
  ApiJson(body): ApiJson<TransitionBody>,
) -> Result<Json<Application>, ApiError>
where
  S: ApplicationStore,
  B: BlobStore,
{
  let current = load_visible(&state, &caller, id).await?;
  if !caller.can_transition(&current) {
    return Err(ApiError::Forbidden);
  }

  let attachment = body
    .attachment
    .map(|a| a.decode(state.max_attachment_bytes))
    .transpose()?;

  let options = TransitionOptions {
    note: body.note,
    tentative_date: body.tentative_date,
    required_documents: body.required_documents,
    attachment,
  };
  tracing::debug!(application_id = %id, by = %caller.subject, status = %body.status, "transition requested");

  let updated = state
    .processor
    .apply_transition(id, &body.status, options)
    .await?;
  Ok(Json(updated))
}
