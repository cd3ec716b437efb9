// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Anonymous OAuth authorization server domain model (§3, §4.I).

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::workspace::WorkspaceId;

pub const AUTHORIZATION_CODE_TTL_SECONDS: i64 = 120;
pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 86_400;
pub const MAX_PENDING_CODES: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthClientId(pub String);

impl OAuthClientId {
    pub fn new() -> Self {
        Self(format!("anon_client_{}", Uuid::new_v4()))
    }
}

impl Default for OAuthClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OAuthClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum OAuthClientError {
    #[error("redirect_uris must be a non-empty array of parseable URIs")]
    InvalidRedirectUris,
}

/// RFC 7591 dynamically registered client (§4.I.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    pub client_id: OAuthClientId,
    pub client_name: Option<String>,
    pub redirect_uris: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl OAuthClient {
    pub fn register(client_name: Option<String>, redirect_uris: Vec<String>) -> Result<Self, OAuthClientError> {
        if redirect_uris.is_empty() {
            return Err(OAuthClientError::InvalidRedirectUris);
        }
        for uri in &redirect_uris {
            if url::Url::parse(uri).is_err() {
                return Err(OAuthClientError::InvalidRedirectUris);
            }
        }
        Ok(Self {
            client_id: OAuthClientId::new(),
            client_name,
            redirect_uris,
            created_at: Utc::now(),
        })
    }

    pub fn accepts_redirect(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == redirect_uri)
    }
}

/// `exp`/`iat`/`sub` etc. are minted fresh at token time; `token_claims`
/// carries only the workspace/session binding that must survive the code
/// exchange. Reserved JWT claim names may not be shadowed here (§4.I.5).
const RESERVED_CLAIM_NAMES: &[&str] = &["iss", "aud", "sub", "exp", "iat", "nbf", "jti", "provider"];

#[derive(Debug, Error)]
pub enum AuthorizationCodeError {
    #[error("too many pending authorization codes")]
    TooManyPending,
    #[error("token_claims may not shadow a reserved JWT claim name: {0}")]
    ReservedClaimName(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: OAuthClientId,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub actor_id: String,
    pub token_claims: Value,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn new(
        client_id: OAuthClientId,
        redirect_uri: String,
        code_challenge: String,
        actor_id: String,
        workspace_id: WorkspaceId,
        session_id: String,
    ) -> Result<Self, AuthorizationCodeError> {
        let token_claims = serde_json::json!({
            "workspace_id": workspace_id.to_string(),
            "session_id": session_id,
        });
        for key in token_claims.as_object().unwrap().keys() {
            if RESERVED_CLAIM_NAMES.contains(&key.as_str()) {
                return Err(AuthorizationCodeError::ReservedClaimName(key.clone()));
            }
        }
        let now = Utc::now();
        Ok(Self {
            code: Uuid::new_v4().to_string(),
            client_id,
            redirect_uri,
            code_challenge,
            code_challenge_method: "S256".to_string(),
            actor_id,
            token_claims,
            expires_at: now + Duration::seconds(AUTHORIZATION_CODE_TTL_SECONDS),
            created_at: now,
        })
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthSigningKey {
    pub key_id: String,
    pub private_jwk: Value,
    pub public_jwk: Value,
    pub created_at: DateTime<Utc>,
}

impl OAuthSigningKey {
    pub fn new_key_id() -> String {
        let mut bytes = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut bytes);
        format!("anon_key_{}", hex::encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_rejects_empty_redirect_uris() {
        let err = OAuthClient::register(None, vec![]).unwrap_err();
        assert!(matches!(err, OAuthClientError::InvalidRedirectUris));
    }

    #[test]
    fn register_rejects_unparseable_uri() {
        let err = OAuthClient::register(None, vec!["not a uri".to_string()]).unwrap_err();
        assert!(matches!(err, OAuthClientError::InvalidRedirectUris));
    }

    #[test]
    fn register_accepts_valid_uri() {
        let client = OAuthClient::register(None, vec!["http://localhost:9999/callback".to_string()]).unwrap();
        assert!(client.client_id.0.starts_with("anon_client_"));
        assert!(client.accepts_redirect("http://localhost:9999/callback"));
    }

    #[test]
    fn authorization_code_expires_after_120_seconds() {
        let code = AuthorizationCode::new(
            OAuthClientId::new(),
            "http://localhost/cb".to_string(),
            "challenge".to_string(),
            "actor-1".to_string(),
            WorkspaceId::new(),
            "mcp_s1".to_string(),
        )
        .unwrap();
        assert!(!code.is_expired());
        assert_eq!(
            (code.expires_at - code.created_at).num_seconds(),
            AUTHORIZATION_CODE_TTL_SECONDS
        );
    }

    #[test]
    fn key_id_has_expected_prefix_and_length() {
        let id = OAuthSigningKey::new_key_id();
        assert!(id.starts_with("anon_key_"));
        assert_eq!(id.len(), "anon_key_".len() + 8);
    }
}
