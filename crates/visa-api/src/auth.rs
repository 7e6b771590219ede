//! Bearer-token authentication and role-based access checks.
//!
//! Tokens are HS256 JWTs. Verification walks an ordered chain of
//! [`TokenVerifier`]s and accepts the first that succeeds, so a signing
//! secret can be rotated by listing the new secret first and keeping the old
//! one until its tokens expire.

use std::{fmt, str::FromStr, sync::Arc};

use axum::{
  extract::{FromRef, FromRequestParts},
  http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{
  Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
  get_current_timestamp,
};
use serde::{Deserialize, Serialize};
use visa_core::{history::Application, store::ApplicationQuery};

use crate::error::ApiError;

// ─── Roles and claims ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  Administrator,
  CaseHandler,
  Applicant,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Role::Administrator => "administrator",
      Role::CaseHandler => "case_handler",
      Role::Applicant => "applicant",
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "administrator" => Ok(Role::Administrator),
      "case_handler" => Ok(Role::CaseHandler),
      "applicant" => Ok(Role::Applicant),
      other => Err(format!("unknown role {other:?}")),
    }
  }
}

/// JWT claims carried by every bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
  pub sub:  String,
  pub role: Role,
  pub exp:  u64,
  pub iat:  u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub iss:  Option<String>,
}

/// Sign a token for `subject` with `secret`, valid for `ttl_secs`.
pub fn issue_token(
  secret: &str,
  issuer: Option<&str>,
  subject: &str,
  role: Role,
  ttl_secs: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
  let now = get_current_timestamp();
  let claims = Claims {
    sub: subject.to_owned(),
    role,
    exp: now + ttl_secs,
    iat: now,
    iss: issuer.map(str::to_owned),
  };
  encode(
    &Header::new(Algorithm::HS256),
    &claims,
    &EncodingKey::from_secret(secret.as_bytes()),
  )
}

// ─── Verification ────────────────────────────────────────────────────────────

/// One way of turning a bearer token into trusted claims.
pub trait TokenVerifier: Send + Sync {
  fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error>;
}

/// Verifies HS256 tokens signed with a single shared secret.
pub struct HmacVerifier {
  key:        DecodingKey,
  validation: Validation,
}

impl HmacVerifier {
  pub fn new(secret: &str, issuer: Option<&str>) -> Self {
    let mut validation = Validation::new(Algorithm::HS256);
    if let Some(iss) = issuer {
      validation.set_issuer(&[iss]);
    }
    Self {
      key: DecodingKey::from_secret(secret.as_bytes()),
      validation,
    }
  }
}

impl TokenVerifier for HmacVerifier {
  fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(token, &self.key, &self.validation).map(|data| data.claims)
  }
}

/// The ordered verifier chain consulted for every authenticated request.
pub struct Authenticator {
  verifiers: Vec<Box<dyn TokenVerifier>>,
}

impl Authenticator {
  pub fn new(verifiers: Vec<Box<dyn TokenVerifier>>) -> Self { Self { verifiers } }

  /// One [`HmacVerifier`] per secret, tried in the given order.
  pub fn from_secrets(secrets: &[String], issuer: Option<&str>) -> Self {
    Self::new(
      secrets
        .iter()
        .map(|s| Box::new(HmacVerifier::new(s, issuer)) as Box<dyn TokenVerifier>)
        .collect(),
    )
  }

  /// Claims from the first verifier that accepts `token`.
  pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
    let mut last_err = None;
    for verifier in &self.verifiers {
      match verifier.verify(token) {
        Ok(claims) => return Ok(claims),
        Err(e) => last_err = Some(e),
      }
    }
    if let Some(e) = last_err {
      tracing::debug!(error = %e, "bearer token rejected");
    }
    Err(ApiError::Unauthorized)
  }

  /// Authenticate the caller from an `Authorization: Bearer` header.
  pub fn authenticate(&self, headers: &HeaderMap) -> Result<Caller, ApiError> {
    let token = headers
      .get(header::AUTHORIZATION)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.strip_prefix("Bearer "))
      .map(str::trim)
      .filter(|t| !t.is_empty())
      .ok_or(ApiError::Unauthorized)?;

    let claims = self.verify(token)?;
    Ok(Caller {
      subject: claims.sub,
      role:    claims.role,
    })
  }
}

// ─── Caller ──────────────────────────────────────────────────────────────────

/// The authenticated principal behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
  pub subject: String,
  pub role:    Role,
}

impl Caller {
  pub fn is_admin(&self) -> bool { self.role == Role::Administrator }

  fn handles(&self, application: &Application) -> bool {
    self.role == Role::CaseHandler
      && application.assigned_handler.as_deref() == Some(self.subject.as_str())
  }

  /// Administrators see everything, handlers their assigned cases, applicants
  /// their own.
  pub fn can_view(&self, application: &Application) -> bool {
    match self.role {
      Role::Administrator => true,
      Role::CaseHandler => self.handles(application),
      Role::Applicant => application.applicant_id == self.subject,
    }
  }

  /// Only administrators and the assigned handler move an application.
  pub fn can_transition(&self, application: &Application) -> bool {
    self.is_admin() || self.handles(application)
  }

  /// Narrow `query` to the applications this caller may list.
  pub fn scope(&self, query: &mut ApplicationQuery) {
    match self.role {
      Role::Administrator => {}
      Role::CaseHandler => query.assigned_handler = Some(self.subject.clone()),
      Role::Applicant => query.applicant_id = Some(self.subject.clone()),
    }
  }
}

impl<S> FromRequestParts<S> for Caller
where
  Arc<Authenticator>: FromRef<S>,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &S,
  ) -> Result<Self, Self::Rejection> {
    let auth = Arc::<Authenticator>::from_ref(state);
    auth.authenticate(&parts.headers)
  }
}
