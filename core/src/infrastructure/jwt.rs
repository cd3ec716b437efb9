// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! RS256 key management and JWT minting/verification for the anonymous
//! OAuth authorization server (§4.I.6, §5 "in-memory signing-key cache").
//!
//! Keys are generated with `rsa`, stored as a PKCS8 PEM (private) and an
//! RFC 7517 JWK (public) on `OAuthSigningKey`, and cached in-process for
//! the lifetime of the signing key — rotation replaces the cache wholesale,
//! it is never mutated in place.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parking_lot::RwLock;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::oauth::OAuthSigningKey;

const RSA_KEY_BITS: usize = 2048;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("key generation failed: {0}")]
    KeyGen(String),
    #[error("signing failed: {0}")]
    Sign(String),
    #[error("token verification failed: {0}")]
    Verify(String),
    #[error("malformed stored key material: {0}")]
    MalformedKey(String),
}

/// Generates a fresh RS256 key pair and its storable domain representation
/// (§4.I "Key management": `keyId = anon_key_<8-hex>`).
pub fn generate_signing_key() -> Result<OAuthSigningKey, JwtError> {
    let mut rng = rand::thread_rng();
    let private_key =
        RsaPrivateKey::new(&mut rng, RSA_KEY_BITS).map_err(|e| JwtError::KeyGen(e.to_string()))?;
    let public_key = private_key.to_public_key();

    let pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| JwtError::KeyGen(e.to_string()))?
        .to_string();

    let key_id = OAuthSigningKey::new_key_id();
    let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
    let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());

    Ok(OAuthSigningKey {
        key_id: key_id.clone(),
        private_jwk: json!({ "pem": pem, "kid": key_id }),
        public_jwk: json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": key_id,
            "n": n,
            "e": e,
        }),
        created_at: chrono::Utc::now(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
struct PrivateJwkShape {
    pem: String,
}

/// In-memory cache of the imported signing key, re-derived from the
/// domain `OAuthSigningKey` once at process init (§5: "process-wide and
/// immutable after init except via rotation").
#[derive(Clone)]
pub struct SigningKeyCache {
    inner: Arc<RwLock<Option<Active>>>,
}

struct Active {
    key_id: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_jwk: Value,
}

impl SigningKeyCache {
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(None)) }
    }

    pub fn init(&self, key: &OAuthSigningKey) -> Result<(), JwtError> {
        let private: PrivateJwkShape = serde_json::from_value(key.private_jwk.clone())
            .map_err(|e| JwtError::MalformedKey(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_pem(private.pem.as_bytes())
            .map_err(|e| JwtError::MalformedKey(e.to_string()))?;

        let n = key.public_jwk["n"].as_str().ok_or_else(|| JwtError::MalformedKey("missing n".into()))?;
        let e = key.public_jwk["e"].as_str().ok_or_else(|| JwtError::MalformedKey("missing e".into()))?;
        let decoding_key = DecodingKey::from_rsa_components(n, e)
            .map_err(|e| JwtError::MalformedKey(e.to_string()))?;

        *self.inner.write() = Some(Active {
            key_id: key.key_id.clone(),
            encoding_key,
            decoding_key,
            public_jwk: key.public_jwk.clone(),
        });
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.read().is_some()
    }

    pub fn jwks_document(&self) -> Value {
        match self.inner.read().as_ref() {
            Some(active) => json!({ "keys": [active.public_jwk.clone()] }),
            None => json!({ "keys": [] }),
        }
    }

    /// Mints an RS256 JWT. `claims` must already contain every claim beyond
    /// `iss`/`aud`/`iat`/`exp`/`jti` — those five are injected here.
    pub fn sign(&self, mut claims: Value, issuer: &str, audience: &str, ttl_seconds: i64) -> Result<String, JwtError> {
        let guard = self.inner.read();
        let active = guard.as_ref().ok_or_else(|| JwtError::Sign("signing key not initialized".into()))?;

        let now = chrono::Utc::now();
        let obj = claims.as_object_mut().ok_or_else(|| JwtError::Sign("claims must be an object".into()))?;
        obj.insert("iss".to_string(), json!(issuer));
        obj.insert("aud".to_string(), json!(audience));
        obj.insert("iat".to_string(), json!(now.timestamp()));
        obj.insert("exp".to_string(), json!((now + chrono::Duration::seconds(ttl_seconds)).timestamp()));
        obj.insert("jti".to_string(), json!(uuid::Uuid::new_v4().to_string()));

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(active.key_id.clone());

        jsonwebtoken::encode(&header, &claims, &active.encoding_key).map_err(|e| JwtError::Sign(e.to_string()))
    }

    /// Verifies signature, `iss`, and `aud`; returns the decoded claims.
    pub fn verify(&self, token: &str, issuer: &str, audience: &str) -> Result<Value, JwtError> {
        let guard = self.inner.read();
        let active = guard.as_ref().ok_or_else(|| JwtError::Verify("signing key not initialized".into()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);

        let data = jsonwebtoken::decode::<Value>(token, &active.decoding_key, &validation)
            .map_err(|e| JwtError::Verify(e.to_string()))?;
        Ok(data.claims)
    }
}

impl Default for SigningKeyCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_has_expected_prefix() {
        let key = generate_signing_key().unwrap();
        assert!(key.key_id.starts_with("anon_key_"));
        assert_eq!(key.public_jwk["kty"], "RSA");
    }

    #[test]
    fn sign_then_verify_round_trips_claims() {
        let key = generate_signing_key().unwrap();
        let cache = SigningKeyCache::new();
        cache.init(&key).unwrap();

        let token = cache
            .sign(json!({"sub": "anon_actor_1", "provider": "anonymous"}), "https://issuer.example", "https://issuer.example/mcp", 86_400)
            .unwrap();

        let claims = cache.verify(&token, "https://issuer.example", "https://issuer.example/mcp").unwrap();
        assert_eq!(claims["sub"], "anon_actor_1");
        assert!(claims["jti"].is_string());
    }

    #[test]
    fn verify_rejects_wrong_audience() {
        let key = generate_signing_key().unwrap();
        let cache = SigningKeyCache::new();
        cache.init(&key).unwrap();
        let token = cache.sign(json!({"sub": "a"}), "https://issuer.example", "https://issuer.example/mcp", 60).unwrap();
        let err = cache.verify(&token, "https://issuer.example", "https://other/mcp");
        assert!(err.is_err());
    }

    #[test]
    fn jwks_document_exposes_generated_public_key() {
        let key = generate_signing_key().unwrap();
        let cache = SigningKeyCache::new();
        cache.init(&key).unwrap();
        let jwks = cache.jwks_document();
        assert_eq!(jwks["keys"][0]["kid"], key.key_id);
    }
}
