//! `GET /statuses`: the Status Catalog, in canonical order.

use axum::Json;
use visa_core::status::{CatalogEntry, catalog};

/// Public: clients render progress bars and status pickers from this.
pub async fn list() -> Json<&'static [CatalogEntry]> { Json(catalog()) }
