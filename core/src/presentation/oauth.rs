// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Self-issued anonymous OAuth authorization server (S4.I, S6.2): RFC 8414
//! discovery, RFC 7591 dynamic registration, PKCE authorization code, and
//! RS256 JWT minting for unauthenticated MCP clients.

use axum::extract::{Query, State};
use axum::response::Redirect;
use axum::{Form, Json};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::domain::oauth::{
    AuthorizationCode, AuthorizationCodeError, OAuthClient, OAuthClientError, OAuthClientId,
    ACCESS_TOKEN_TTL_SECONDS, MAX_PENDING_CODES,
};
use crate::domain::workspace::WorkspaceId;

use super::error::ApiError;
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProtectedResourceQuery {
    #[serde(rename = "workspaceId")]
    pub workspace_id: Option<String>,
}

/// `GET /.well-known/oauth-protected-resource` (S4.I.1).
pub async fn protected_resource_metadata(
    State(state): State<AppState>,
    Query(_query): Query<ProtectedResourceQuery>,
) -> Json<Value> {
    let authorization_servers = if state.config.anonymous_oauth_enabled {
        vec![state.config.issuer.clone()]
    } else {
        state.config.upstream_authorization_server.clone().into_iter().collect()
    };
    Json(json!({
        "resource": state.config.mcp_audience(),
        "authorization_servers": authorization_servers,
        "bearer_methods_supported": ["header"],
    }))
}

/// `GET /.well-known/oauth-authorization-server` (S4.I.2).
pub async fn authorization_server_metadata(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if !state.config.anonymous_oauth_enabled {
        let upstream = state
            .config
            .upstream_authorization_server
            .as_ref()
            .ok_or_else(|| ApiError::Validation("anonymous OAuth disabled and no upstream authorization server configured".into()))?;
        let client = reqwest::Client::new();
        let url = format!("{}/.well-known/oauth-authorization-server", upstream.trim_end_matches('/'));
        let body = client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Internal(e.into()))?
            .json::<Value>()
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        return Ok(Json(body));
    }

    let issuer = state.config.issuer.trim_end_matches('/');
    Ok(Json(json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/authorize"),
        "token_endpoint": format!("{issuer}/token"),
        "registration_endpoint": format!("{issuer}/register"),
        "jwks_uri": format!("{issuer}/oauth2/jwks"),
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code"],
        "token_endpoint_auth_methods_supported": ["none"],
        "code_challenge_methods_supported": ["S256"],
    })))
}

/// `GET /oauth2/jwks`.
pub async fn jwks(State(state): State<AppState>) -> Json<Value> {
    Json(state.signing_key_cache.jwks_document())
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub client_name: Option<String>,
    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub client_id: String,
    pub client_name: Option<String>,
    pub redirect_uris: Vec<String>,
    pub client_id_issued_at: i64,
    pub token_endpoint_auth_method: &'static str,
}

/// `POST /register` (S4.I.3): RFC 7591 dynamic registration.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let client = OAuthClient::register(req.client_name, req.redirect_uris).map_err(|e| match e {
        OAuthClientError::InvalidRedirectUris => ApiError::oauth("invalid_client_metadata", e.to_string()),
    })?;
    state.oauth_clients.save(&client).await?;

    Ok(Json(RegisterResponse {
        client_id: client.client_id.0.clone(),
        client_name: client.client_name,
        redirect_uris: client.redirect_uris,
        client_id_issued_at: client.created_at.timestamp(),
        token_endpoint_auth_method: "none",
    }))
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub resource: String,
    pub state: Option<String>,
}

/// `GET /authorize` (S4.I.4): PKCE authorization-code grant bound to an
/// existing anonymous session.
pub async fn authorize(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Redirect, ApiError> {
    if query.response_type != "code" {
        return Err(ApiError::oauth("unsupported_response_type", "response_type must be 'code'"));
    }
    if query.code_challenge_method != "S256" {
        return Err(ApiError::oauth("invalid_request", "code_challenge_method must be 'S256'"));
    }

    let client = state
        .oauth_clients
        .find(&OAuthClientId(query.client_id.clone()))
        .await?
        .ok_or_else(|| ApiError::oauth("invalid_client", "unknown client_id"))?;
    if !client.accepts_redirect(&query.redirect_uri) {
        return Err(ApiError::oauth("invalid_request", "redirect_uri does not match a registered URI"));
    }

    let (workspace_id, session_id) = parse_resource(&query.resource)?;

    let session = state
        .anon_sessions
        .find(&session_id)
        .await?
        .ok_or_else(|| ApiError::oauth("invalid_request", "resource does not identify an anonymous session"))?;
    if session.workspace_id != workspace_id {
        return Err(ApiError::oauth("invalid_request", "resource workspaceId does not match session"));
    }

    if state.auth_codes.count_pending().await? >= MAX_PENDING_CODES {
        state.auth_codes.purge_expired().await?;
        if state.auth_codes.count_pending().await? >= MAX_PENDING_CODES {
            return Err(ApiError::oauth("temporarily_unavailable", "too many pending authorization codes"));
        }
    }

    let code = AuthorizationCode::new(
        client.client_id,
        query.redirect_uri.clone(),
        query.code_challenge,
        session.actor_id,
        workspace_id,
        session.session_id,
    )
    .map_err(|e| match e {
        AuthorizationCodeError::TooManyPending => ApiError::oauth("temporarily_unavailable", e.to_string()),
        AuthorizationCodeError::ReservedClaimName(_) => ApiError::Internal(e.into()),
    })?;

    let redirect_code = code.code.clone();
    state.auth_codes.save(&code).await?;

    let mut location = format!("{}?code={}", query.redirect_uri, redirect_code);
    if let Some(s) = query.state {
        location.push_str(&format!("&state={s}"));
    }
    Ok(Redirect::to(&location))
}

fn parse_resource(resource: &str) -> Result<(WorkspaceId, String), ApiError> {
    let url = url::Url::parse(resource).map_err(|_| ApiError::oauth("invalid_request", "resource is not a valid URL"))?;
    let mut workspace_id = None;
    let mut session_id = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "workspaceId" => workspace_id = Some(value.into_owned()),
            "sessionId" => session_id = Some(value.into_owned()),
            _ => {}
        }
    }
    let workspace_id = workspace_id
        .as_deref()
        .and_then(WorkspaceId::parse)
        .ok_or_else(|| ApiError::oauth("invalid_request", "resource is missing a valid workspaceId"))?;
    let session_id = session_id.ok_or_else(|| ApiError::oauth("invalid_request", "resource is missing sessionId"))?;
    Ok((workspace_id, session_id))
}

#[derive(Debug, Deserialize)]
pub struct TokenForm {
    pub grant_type: String,
    pub code: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub code_verifier: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// `POST /token` (S4.I.5): atomically consumes the code, validates PKCE,
/// and mints the RS256 bearer token.
pub async fn token(
    State(state): State<AppState>,
    Form(req): Form<TokenForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    if req.grant_type != "authorization_code" {
        return Err(ApiError::oauth("unsupported_grant_type", "grant_type must be 'authorization_code'"));
    }

    let code = state
        .auth_codes
        .consume(&req.code)
        .await?
        .ok_or_else(|| ApiError::oauth("invalid_grant", "authorization code is unknown or already consumed"))?;

    if code.is_expired()
        || code.client_id.0 != req.client_id
        || code.redirect_uri != req.redirect_uri
        || !verify_pkce(&req.code_verifier, &code.code_challenge)
    {
        return Err(ApiError::oauth("invalid_grant", "authorization code is expired or does not match the request"));
    }

    let mut claims = code.token_claims.clone();
    if let Some(obj) = claims.as_object_mut() {
        obj.insert("sub".to_string(), json!(code.actor_id));
        obj.insert("provider".to_string(), json!("anonymous"));
    }

    let access_token = state
        .signing_key_cache
        .sign(claims, &state.config.issuer, &state.config.mcp_audience(), ACCESS_TOKEN_TTL_SECONDS)
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer",
        expires_in: ACCESS_TOKEN_TTL_SECONDS,
    }))
}

fn verify_pkce(verifier: &str, expected_challenge: &str) -> bool {
    let digest = Sha256::digest(verifier.as_bytes());
    let computed = URL_SAFE_NO_PAD.encode(digest);
    computed == expected_challenge
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_matches_known_vector() {
        // RFC 7636 appendix B vector.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert!(verify_pkce(verifier, challenge));
        assert!(!verify_pkce("wrong-verifier", challenge));
    }

    #[test]
    fn parse_resource_extracts_workspace_and_session() {
        let ws = WorkspaceId::new();
        let resource = format!("https://issuer.example/mcp?workspaceId={ws}&sessionId=mcp_s1");
        let (parsed_ws, session) = parse_resource(&resource).unwrap();
        assert_eq!(parsed_ws, ws);
        assert_eq!(session, "mcp_s1");
    }

    #[test]
    fn parse_resource_rejects_missing_session() {
        let resource = format!("https://issuer.example/mcp?workspaceId={}", WorkspaceId::new());
        assert!(parse_resource(&resource).is_err());
    }
}
