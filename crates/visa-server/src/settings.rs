//! Runtime configuration, layered from an optional TOML file and `VISA__*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use serde::Deserialize;

const MIB: usize = 1024 * 1024;

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                 String,
  #[serde(default = "default_port")]
  pub port:                 u16,
  #[serde(default = "default_store_path")]
  pub store_path:           PathBuf,
  /// Root directory attachments are written under.
  #[serde(default = "default_blob_dir")]
  pub blob_dir:             PathBuf,
  /// Public URL prefix the blob directory is served from.
  #[serde(default = "default_blob_base_url")]
  pub blob_base_url:        String,
  #[serde(default = "default_max_attachment_bytes")]
  pub max_attachment_bytes: usize,
  #[serde(default)]
  pub auth:                 AuthSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
  /// Trusted HMAC secrets, newest first. The first one signs new tokens.
  #[serde(default)]
  pub secrets:        Vec<String>,
  #[serde(default)]
  pub issuer:         Option<String>,
  #[serde(default = "default_token_ttl_secs")]
  pub token_ttl_secs: u64,
}

impl Default for AuthSettings {
  fn default() -> Self {
    Self {
      secrets:        Vec::new(),
      issuer:         None,
      token_ttl_secs: default_token_ttl_secs(),
    }
  }
}

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> PathBuf { PathBuf::from("visa.sqlite") }
fn default_blob_dir() -> PathBuf { PathBuf::from("blobs") }
fn default_blob_base_url() -> String { "http://localhost:8080/files".to_owned() }
fn default_max_attachment_bytes() -> usize { 10 * MIB }
fn default_token_ttl_secs() -> u64 { 3600 }

impl ServerConfig {
  /// Read `path` (if it exists) and overlay the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("VISA")
          .separator("__")
          .list_separator(",")
          .with_list_parse_key("auth.secrets")
          .try_parsing(true),
      )
      .build()
      .context("failed to read configuration")?;

    settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  /// Reject configurations the server cannot run with.
  pub fn validate(&self) -> anyhow::Result<()> {
    if self.auth.secrets.is_empty() {
      bail!("auth.secrets must list at least one signing secret");
    }
    if self.auth.secrets.iter().any(|s| s.trim().is_empty()) {
      bail!("auth.secrets must not contain blank entries");
    }
    if self.max_attachment_bytes == 0 {
      bail!("max_attachment_bytes must be positive");
    }
    Ok(())
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
