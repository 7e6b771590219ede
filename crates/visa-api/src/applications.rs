//! Handlers for `/applications` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/applications` | Body: [`OpenBody`]; returns 201 + the new application |
//! | `GET`  | `/applications` | Scoped to the caller; optional `status`, `limit` (default 100), `offset` |
//! | `GET`  | `/applications/:id` | Admin, assigned handler or owning applicant |
//! | `GET`  | `/applications/:id/timeline` | Same access as above |
//! | `PUT`  | `/applications/:id/handler` | Admin only. Body: `{"handler": "..."}` |

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;
use visa_core::{
  Status,
  history::Application,
  store::{ApplicationQuery, ApplicationStore, BlobStore},
  timeline::{TimelineGroup, reconstruct_timeline},
};

use crate::{
  AppState,
  auth::Caller,
  error::ApiError,
  extract::{ApiJson, ApiPath, ApiQuery},
};

/// Load application `id` and check that `caller` may see it.
pub(crate) async fn load_visible<S, B>(
  state: &AppState<S, B>,
  caller: &Caller,
  id: Uuid,
) -> Result<Application, ApiError>
where
  S: ApplicationStore,
  B: BlobStore,
{
  let application = state.processor.get(id).await?;
  if !caller.can_view(&application) {
    return Err(ApiError::Forbidden);
  }
  Ok(application)
}

// ─── Open ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenBody {
  /// Admin only; everyone else opens an application for themselves.
  pub applicant_id:     Option<String>,
  /// Admin only.
  pub assigned_handler: Option<String>,
}

/// `POST /applications`
pub async fn create<S, B>(
  State(state): State<AppState<S, B>>,
  caller: Caller,
  ApiJson(body): ApiJson<OpenBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ApplicationStore,
  B: BlobStore,
{
  let applicant_id = match body.applicant_id {
    Some(id) if id != caller.subject && !caller.is_admin() => return Err(ApiError::Forbidden),
    Some(id) if id.trim().is_empty() => {
      return Err(ApiError::BadRequest("applicantId must not be blank".into()));
    }
    Some(id) => id,
    None => caller.subject.clone(),
  };
  if body.assigned_handler.is_some() && !caller.is_admin() {
    return Err(ApiError::Forbidden);
  }

  let application = state
    .processor
    .open_application(&applicant_id, body.assigned_handler)
    .await?;
  Ok((StatusCode::CREATED, Json(application)))
}

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Display name of a catalogued status, e.g. `Visa Approved`.
  pub status: Option<String>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

/// `GET /applications[?status=...][&limit=..][&offset=..]`
pub async fn list<S, B>(
  State(state): State<AppState<S, B>>,
  caller: Caller,
  ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Vec<Application>>, ApiError>
where
  S: ApplicationStore,
  B: BlobStore,
{
  let mut query = ApplicationQuery {
    status: params.status.as_deref().map(str::parse::<Status>).transpose()?,
    limit: params.limit,
    offset: params.offset,
    ..Default::default()
  };
  caller.scope(&mut query);

  Ok(Json(state.processor.list(&query).await?))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /applications/:id`
pub async fn get_one<S, B>(
  State(state): State<AppState<S, B>>,
  caller: Caller,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Application>, ApiError>
where
  S: ApplicationStore,
  B: BlobStore,
{
  Ok(Json(load_visible(&state, &caller, id).await?))
}

// ─── Timeline ────────────────────────────────────────────────────────────────

/// `GET /applications/:id/timeline`
pub async fn timeline<S, B>(
  State(state): State<AppState<S, B>>,
  caller: Caller,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Vec<TimelineGroup>>, ApiError>
where
  S: ApplicationStore,
  B: BlobStore,
{
  let application = load_visible(&state, &caller, id).await?;
  Ok(Json(reconstruct_timeline(&application.status_history)))
}

// ─── Assign handler ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AssignBody {
  /// `null` unassigns.
  pub handler: Option<String>,
}

/// `PUT /applications/:id/handler`
pub async fn assign_handler<S, B>(
  State(state): State<AppState<S, B>>,
  caller: Caller,
  ApiPath(id): ApiPath<Uuid>,
  ApiJson(body): ApiJson<AssignBody>,
) -> Result<Json<Application>, ApiError>
where
  S: ApplicationStore,
  B: BlobStore,
{
  if !caller.is_admin() {
    return Err(ApiError::Forbidden);
  }
  let handler = body.handler.filter(|h| !h.trim().is_empty());
  Ok(Json(state.processor.assign_handler(id, handler).await?))
}
