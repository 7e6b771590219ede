//! visa-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered under
//! `VISA__*` environment variables, opens the SQLite document store and the
//! attachment directory, and serves the JSON API over HTTP.
//!
//! # Issuing tokens
//!
//! To mint a bearer token signed with the first configured secret:
//!
//! ```text
//! cargo run -p visa-server --bin server -- --issue-token handler-7 --role case_handler
//! ```

mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use visa_api::{
  AppState, Authenticator, api_router,
  auth::{Role, issue_token},
};
use visa_core::TransitionProcessor;
use visa_store::{FsBlobStore, SqliteStore};

use settings::{ServerConfig, expand_tilde};

#[derive(Parser)]
#[command(author, version, about = "Visa application portal server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print a bearer token for SUBJECT and exit.
  #[arg(long, value_name = "SUBJECT")]
  issue_token: Option<String>,

  /// Role embedded in the token printed by `--issue-token`.
  #[arg(long, default_value = "applicant")]
  role: Role,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let server_cfg = ServerConfig::load(&cli.config)?;

  // Helper mode: sign a token and exit.
  if let Some(subject) = cli.issue_token {
    let secret = server_cfg
      .auth
      .secrets
      .first()
      .context("auth.secrets is empty, nothing to sign with")?;
    let token = issue_token(
      secret,
      server_cfg.auth.issuer.as_deref(),
      &subject,
      cli.role,
      server_cfg.auth.token_ttl_secs,
    )
    .context("failed to sign token")?;
    println!("{token}");
    return Ok(());
  }

  server_cfg.validate()?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let blob_dir = expand_tilde(&server_cfg.blob_dir);
  tokio::fs::create_dir_all(&blob_dir)
    .await
    .with_context(|| format!("failed to create blob directory {blob_dir:?}"))?;
  let blobs = FsBlobStore::new(blob_dir, server_cfg.blob_base_url.clone());

  let state = AppState {
    processor:            TransitionProcessor::new(Arc::new(store), Arc::new(blobs)),
    auth:                 Arc::new(Authenticator::from_secrets(
      &server_cfg.auth.secrets,
      server_cfg.auth.issuer.as_deref(),
    )),
    max_attachment_bytes: server_cfg.max_attachment_bytes,
  };
  tracing::info!(
    secrets = server_cfg.auth.secrets.len(),
    max_attachment_bytes = server_cfg.max_attachment_bytes,
    "token verifier chain ready"
  );

  let app = api_router(state).layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
