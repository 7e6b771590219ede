//! [`FsBlobStore`]: attachments stored as files under a root directory.
//!
//! No binary data lives in the database; the aggregate keeps only the
//! relative path and the public URL the file is served from.

use std::{
  io::ErrorKind,
  path::{Component, Path, PathBuf},
};

use bytes::Bytes;
use visa_core::store::{BlobStore, StoredBlob};

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct FsBlobStore {
  root:     PathBuf,
  base_url: String,
}

impl FsBlobStore {
  /// Blobs are written below `root` and advertised under `base_url`.
  pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
    Self {
      root:     root.into(),
      base_url: base_url.into().trim_end_matches('/').to_owned(),
    }
  }

  /// Map a relative blob path onto the filesystem, refusing anything that
  /// could land outside `root`.
  fn resolve(&self, path: &str) -> Result<PathBuf> {
    let relative = Path::new(path);
    let well_formed = !path.is_empty()
      && !path.contains('\\')
      && relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !well_formed {
      return Err(Error::InvalidBlobPath(path.to_owned()));
    }
    Ok(self.root.join(relative))
  }
}

impl BlobStore for FsBlobStore {
  type Error = Error;

  async fn store(&self, bytes: Bytes, path: &str) -> Result<StoredBlob> {
    let full = self.resolve(path)?;
    if let Some(parent) = full.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }

    // Write beside the target and rename, so readers never see a partial file.
    let file_name = full
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    let partial = full.with_file_name(format!(".{file_name}.partial"));
    tokio::fs::write(&partial, &bytes).await?;
    tokio::fs::rename(&partial, &full).await?;

    tracing::debug!(path, size = bytes.len(), "blob written");
    Ok(StoredBlob {
      url:          format!("{}/{path}", self.base_url),
      path:         path.to_owned(),
      content_type: content_type_for(path).to_owned(),
    })
  }

  async fn remove(&self, path: &str) -> Result<()> {
    let full = self.resolve(path)?;
    match tokio::fs::remove_file(&full).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }
}

/// Media type inferred from the file extension.
pub fn content_type_for(path: &str) -> &'static str {
  let ext = Path::new(path)
    .extension()
    .map(|e| e.to_string_lossy().to_ascii_lowercase())
    .unwrap_or_default();
  match ext.as_str() {
    "pdf" => "application/pdf",
    "png" => "image/png",
    "jpg" | "jpeg" => "image/jpeg",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "heic" => "image/heic",
    "txt" => "text/plain",
    "doc" => "application/msword",
    "docx" => {
      "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    }
    _ => "application/octet-stream",
  }
}
