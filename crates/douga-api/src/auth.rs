//! Service-auth token verification.
//!
//! Clients call this service through their PDS, which mints a short-lived
//! JWT with `iss` = the user's DID and `aud` = this service's DID.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Maximum number of accepted tokens kept in the cache.
const DEFAULT_CACHE_CAPACITY: usize = 100_000;

/// Upper bound on how long an accepted token is cached.
const DEFAULT_CACHE_VALIDITY: Duration = Duration::from_secs(12 * 3600); // 12 hours

/// Turns a bearer token into the authenticated DID.
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> ApiResult<String>;
}

/// Claims of an atproto service-auth token.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAuthClaims {
    /// Caller DID, possibly with a service fragment
    pub iss: String,
    /// Audience (this service's DID)
    pub aud: String,
    /// Expiration
    pub exp: i64,
    /// Lexicon method the token is bound to
    #[serde(default)]
    pub lxm: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    did: String,
    expires_at: i64,
}

/// Checks service-auth claims against this service's DID and caches accepted
/// tokens until they expire.
///
/// This gates on the claims only. The signature segment is never checked
/// against the issuer's signing key, so a token is trusted as far as the
/// caller that minted it. Put a signature-verifying [`AuthVerifier`] in front
/// of anything that must not accept forged tokens.
pub struct ServiceAuthVerifier {
    audience: String,
    capacity: usize,
    validity: Duration,
    cache: RwLock<HashMap<String, CachedToken>>,
}

impl ServiceAuthVerifier {
    pub fn new(audience: impl Into<String>) -> Self {
        Self {
            audience: audience.into(),
            capacity: DEFAULT_CACHE_CAPACITY,
            validity: DEFAULT_CACHE_VALIDITY,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_cache(mut self, capacity: usize, validity: Duration) -> Self {
        self.capacity = capacity.max(1);
        self.validity = validity;
        self
    }

    /// Decode and check a token's claims.
    pub fn check_claims(&self, token: &str, now: i64) -> ApiResult<ServiceAuthClaims> {
        let mut parts = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ApiError::unauthorized("Malformed token"));
        };

        let payload = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| ApiError::unauthorized(format!("Invalid token payload: {}", e)))?;
        let claims: ServiceAuthClaims = serde_json::from_slice(&payload)
            .map_err(|e| ApiError::unauthorized(format!("Invalid token claims: {}", e)))?;

        if claims.aud != self.audience {
            return Err(ApiError::unauthorized("Token audience mismatch"));
        }
        if claims.exp <= now {
            return Err(ApiError::unauthorized("Token expired"));
        }
        if !claims.iss.starts_with("did:") {
            return Err(ApiError::unauthorized("Token issuer is not a DID"));
        }

        Ok(claims)
    }

    async fn cached(&self, token: &str, now: i64) -> Option<String> {
        let cache = self.cache.read().await;
        cache
            .get(token)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.did.clone())
    }

    async fn remember(&self, token: &str, did: &str, exp: i64, now: i64) {
        let expires_at = exp.min(now.saturating_add(self.validity.as_secs() as i64));
        let mut cache = self.cache.write().await;

        if cache.len() >= self.capacity {
            cache.retain(|_, entry| entry.expires_at > now);
        }
        if cache.len() >= self.capacity {
            if let Some(oldest) = cache
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(key, _)| key.clone())
            {
                cache.remove(&oldest);
            }
            warn!("Auth token cache at capacity ({})", self.capacity);
        }

        cache.insert(
            token.to_string(),
            CachedToken {
                did: did.to_string(),
                expires_at,
            },
        );
    }
}

#[async_trait]
impl AuthVerifier for ServiceAuthVerifier {
    async fn verify(&self, token: &str) -> ApiResult<String> {
        let now = Utc::now().timestamp();

        if let Some(did) = self.cached(token, now).await {
            return Ok(did);
        }

        let claims = self.check_claims(token, now)?;
        // `did:plc:abc#atproto_labeler` authenticates as `did:plc:abc`.
        let did = claims
            .iss
            .split_once('#')
            .map_or(claims.iss.as_str(), |(did, _)| did)
            .to_string();

        debug!(did = %did, lxm = ?claims.lxm, "Accepted service auth token");
        self.remember(token, &did, claims.exp, now).await;
        Ok(did)
    }
}

/// Authenticated caller extracted from the `Authorization` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub did: String,
}

/// Axum extractor for authenticated user.
#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header format"))?;

        let did = state.auth.verify(token.trim()).await?;
        Ok(AuthUser { did })
    }
}
