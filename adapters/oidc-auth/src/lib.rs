//! oidc-auth — OpenID Connect ID-token verification adapter.
//!
//! Purpose
//! - Verify ID tokens issued by the configured OIDC provider: RS256 signature
//!   against the issuer's JWKS, then `iss`, `aud` and `exp`.
//! - Fetch the userinfo document and merge it with the ID-token claims.
//! - Turn the merged claims into a `VerifiedIdentity` (org and group claims
//!   may be strings or arrays).
//!
//! Notes
//! - Endpoints are discovered from `{issuer}/.well-known/openid-configuration`
//!   and cached together with the JWKS for a short TTL to follow key rotation.
//! - `insecure_skip_signature` is for local development only: claims are
//!   decoded and checked without verifying the signature.

mod claims;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::{debug, trace, warn};

pub use claims::{claim_strings, identity_from_claims, merge_claims, Claims, VerifiedIdentity};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing or malformed token")]
    Malformed,
    #[error("invalid token payload: {0}")]
    InvalidPayload(&'static str),
    #[error("signature invalid")]
    SignatureInvalid,
    #[error("token expired")]
    Expired,
    #[error("audience mismatch")]
    BadAudience,
    #[error("issuer mismatch")]
    BadIssuer,
    #[error("unknown signing key")]
    UnknownKey,
    #[error("provider request failed: {0}")]
    Network(String),
}

#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// Issuer URL without trailing slash, e.g. `https://login.example.com`.
    pub issuer: String,
    pub client_id: String,
    /// Claim holding the organization slug.
    pub org_claim: Option<String>,
    /// Claim holding group names.
    pub groups_claim: String,
    pub insecure_skip_signature: bool,
    /// Static JWKS document used instead of the discovered one.
    pub jwks_override: Option<String>,
}

impl OidcConfig {
    pub fn new(issuer: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            org_claim: None,
            groups_claim: "groups".into(),
            insecure_skip_signature: false,
            jwks_override: None,
        }
    }
}

const JWKS_TTL: Duration = Duration::from_secs(15 * 60);
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
struct Discovery {
    jwks_uri: String,
    userinfo_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: String,
    n: Option<String>,
    e: Option<String>,
}

struct KeyCache {
    fetched_at: SystemTime,
    discovery: Option<Discovery>,
    keys: HashMap<String, DecodingKey>,
}

pub struct OidcVerifier {
    config: OidcConfig,
    http: reqwest::Client,
    cache: Mutex<KeyCache>,
}

impl OidcVerifier {
    pub fn new(config: OidcConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;
        let mut keys = HashMap::new();
        if let Some(raw) = config.jwks_override.as_deref() {
            let jwks: Jwks =
                serde_json::from_str(raw).map_err(|_| AuthError::InvalidPayload("jwks"))?;
            keys = jwks_to_keys(jwks);
        }
        Ok(Self {
            config,
            http,
            cache: Mutex::new(KeyCache {
                fetched_at: UNIX_EPOCH,
                discovery: None,
                keys,
            }),
        })
    }

    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    /// Verify an ID token and, when an access token is supplied, merge the
    /// userinfo claims into the result.
    pub async fn authenticate(
        &self,
        id_token: &str,
        access_token: Option<&str>,
    ) -> Result<VerifiedIdentity, AuthError> {
        let mut claims = self.verify(id_token).await?;
        if let Some(at) = access_token.filter(|t| !t.is_empty()) {
            match self.userinfo(at).await {
                Ok(info) => claims = merge_claims(&claims, &info, &self.config.groups_claim),
                Err(e) => warn!(err = %e, "userinfo fetch failed; using ID-token claims only"),
            }
        }
        identity_from_claims(
            &claims,
            self.config.org_claim.as_deref(),
            &self.config.groups_claim,
        )
        .ok_or(AuthError::InvalidPayload("sub"))
    }

    /// Verify an ID token and return its claims.
    pub async fn verify(&self, id_token: &str) -> Result<Claims, AuthError> {
        if self.config.insecure_skip_signature {
            trace!("oidc-auth: insecure mode, skipping signature verification");
            return self.verify_claims_only(id_token);
        }

        let header = decode_header(id_token).map_err(|_| AuthError::Malformed)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::Malformed);
        }
        let kid = header.kid.ok_or(AuthError::Malformed)?;
        let key = self.signing_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.config.client_id.as_str()]);
        validation.set_issuer(&[self.config.issuer.as_str()]);

        let data = decode::<Claims>(id_token, &key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidToken
            | jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
            jsonwebtoken::errors::ErrorKind::InvalidAudience => AuthError::BadAudience,
            jsonwebtoken::errors::ErrorKind::InvalidIssuer => AuthError::BadIssuer,
            _ => AuthError::Malformed,
        })?;
        Ok(data.claims)
    }

    /// Fetch the userinfo document with the given access token.
    pub async fn userinfo(&self, access_token: &str) -> Result<Claims, AuthError> {
        let discovery = self.discovery().await?;
        let endpoint = discovery
            .userinfo_endpoint
            .ok_or(AuthError::InvalidPayload("userinfo_endpoint"))?;
        let resp = self
            .http
            .get(&endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| AuthError::Network(e.to_string()))?;
        resp.json::<Claims>()
            .await
            .map_err(|_| AuthError::InvalidPayload("userinfo"))
    }

    fn verify_claims_only(&self, id_token: &str) -> Result<Claims, AuthError> {
        let parts: Vec<&str> = id_token.split('.').collect();
        if parts.len() != 3 {
            return Err(AuthError::Malformed);
        }
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(parts[1].as_bytes())
            .map_err(|_| AuthError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| AuthError::InvalidPayload("json"))?;

        let aud_ok = claim_strings(claims.get("aud"))
            .iter()
            .any(|a| a == &self.config.client_id);
        if !aud_ok {
            return Err(AuthError::BadAudience);
        }
        if let Some(iss) = claims.get("iss").and_then(|v| v.as_str()) {
            if iss.trim_end_matches('/') != self.config.issuer {
                return Err(AuthError::BadIssuer);
            }
        }
        if let Some(exp) = claims.get("exp").and_then(|v| v.as_u64()) {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            if exp <= now {
                return Err(AuthError::Expired);
            }
        }
        Ok(claims)
    }

    fn lock(&self) -> MutexGuard<'_, KeyCache> {
        // the cache holds no invariants a panic could break
        self.cache.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn discovery(&self) -> Result<Discovery, AuthError> {
        let cached = self.lock().discovery.clone();
        if let Some(d) = cached {
            return Ok(d);
        }
        let url = format!("{}/.well-known/openid-configuration", self.config.issuer);
        debug!(%url, "fetching OIDC discovery document");
        let d: Discovery = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?
            .json()
            .await
            .map_err(|_| AuthError::InvalidPayload("discovery"))?;
        self.lock().discovery = Some(d.clone());
        Ok(d)
    }

    async fn signing_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        if self.config.jwks_override.is_some() {
            return self.lock().keys.get(kid).cloned().ok_or(AuthError::UnknownKey);
        }
        {
            let cache = self.lock();
            if cache.fetched_at + JWKS_TTL > SystemTime::now() {
                if let Some(k) = cache.keys.get(kid) {
                    return Ok(k.clone());
                }
            }
        }

        // fetch outside the lock
        let discovery = self.discovery().await?;
        let jwks: Jwks = self
            .http
            .get(&discovery.jwks_uri)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?
            .json()
            .await
            .map_err(|_| AuthError::InvalidPayload("jwks"))?;
        let mut cache = self.lock();
        cache.keys = jwks_to_keys(jwks);
        cache.fetched_at = SystemTime::now();
        cache.keys.get(kid).cloned().ok_or(AuthError::UnknownKey)
    }
}

fn jwks_to_keys(jwks: Jwks) -> HashMap<String, DecodingKey> {
    let mut map = HashMap::new();
    for k in jwks.keys {
        if k.kty != "RSA" {
            continue;
        }
        if let (Some(kid), Some(n), Some(e)) = (k.kid, k.n.as_deref(), k.e.as_deref()) {
            if let Ok(key) = DecodingKey::from_rsa_components(n, e) {
                map.insert(kid, key);
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "https://login.acme.test";

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn unsigned(payload: &serde_json::Value) -> String {
        let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\"}");
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{payload}.")
    }

    fn insecure(client_id: &str) -> OidcVerifier {
        let mut cfg = OidcConfig::new(ISSUER, client_id);
        cfg.insecure_skip_signature = true;
        cfg.org_claim = Some("org".into());
        OidcVerifier::new(cfg).unwrap()
    }

    #[tokio::test]
    async fn claims_only_accepts_array_audience() {
        let v = insecure("client-2");
        let tok = unsigned(&serde_json::json!({
            "sub": "x",
            "iss": ISSUER,
            "aud": ["x", "client-2"],
            "exp": now() + 300,
            "org": "Acme",
            "groups": ["mods"]
        }));
        let id = v.authenticate(&tok, None).await.unwrap();
        assert_eq!(id.sub, "x");
        assert_eq!(id.org_slug.as_deref(), Some("acme"));
        assert_eq!(id.groups, vec!["mods"]);
    }

    #[tokio::test]
    async fn claims_only_rejects_bad_claims() {
        let v = insecure("client-3");
        let wrong_aud = unsigned(&serde_json::json!({"sub": "x", "aud": "other", "exp": now() + 300}));
        assert_eq!(v.verify(&wrong_aud).await.unwrap_err(), AuthError::BadAudience);

        let expired = unsigned(&serde_json::json!({"sub": "x", "aud": "client-3", "exp": now() - 10}));
        assert_eq!(v.verify(&expired).await.unwrap_err(), AuthError::Expired);

        let wrong_iss = unsigned(&serde_json::json!({
            "sub": "x", "aud": "client-3", "iss": "https://evil", "exp": now() + 300
        }));
        assert_eq!(v.verify(&wrong_iss).await.unwrap_err(), AuthError::BadIssuer);

        assert_eq!(v.verify("garbage").await.unwrap_err(), AuthError::Malformed);
    }

    // Signature path with a synthetic RSA keypair and a static JWKS.
    #[tokio::test]
    async fn signature_verification() {
        use rsa::pkcs1::EncodeRsaPrivateKey;
        use rsa::traits::PublicKeyParts;
        use rsa::RsaPrivateKey;

        let mut rng = rand::thread_rng();
        let priv_key = RsaPrivateKey::new(&mut rng, 2048).expect("keys");
        let pub_key = priv_key.to_public_key();
        let n = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(pub_key.n().to_bytes_be());
        let e = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(pub_key.e().to_bytes_be());
        let jwks = serde_json::json!({
            "keys": [ { "kid": "k1", "kty": "RSA", "alg": "RS256", "n": n, "e": e } ]
        })
        .to_string();

        let mut cfg = OidcConfig::new(ISSUER, "client-ok");
        cfg.jwks_override = Some(jwks);
        let v = OidcVerifier::new(cfg).unwrap();

        let pem = priv_key.to_pkcs1_pem(Default::default()).unwrap();
        let key = jsonwebtoken::EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
        let sign = |kid: &str, claims: serde_json::Value| {
            let header = jsonwebtoken::Header {
                kid: Some(kid.into()),
                alg: Algorithm::RS256,
                ..Default::default()
            };
            jsonwebtoken::encode(&header, &claims, &key).unwrap()
        };

        let ok = sign(
            "k1",
            serde_json::json!({
                "sub": "u123", "aud": "client-ok", "iss": ISSUER, "exp": now() + 300,
                "email": "user@acme.com"
            }),
        );
        let id = v.authenticate(&ok, None).await.unwrap();
        assert_eq!(id.email, "user@acme.com");

        let wrong_aud = sign(
            "k1",
            serde_json::json!({"sub": "u", "aud": "nope", "iss": ISSUER, "exp": now() + 300}),
        );
        assert_eq!(v.verify(&wrong_aud).await.unwrap_err(), AuthError::BadAudience);

        let unknown_kid = sign(
            "k2",
            serde_json::json!({"sub": "u", "aud": "client-ok", "iss": ISSUER, "exp": now() + 300}),
        );
        assert_eq!(v.verify(&unknown_kid).await.unwrap_err(), AuthError::UnknownKey);
    }
}
