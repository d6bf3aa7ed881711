//! Request authentication.
//!
//! Turns request headers into an [`OidcIdentity`]; the caller then runs the
//! login upsert and role sync on it. Two modes:
//! - `none`: trusts `X-Debug-User` (subject, doubles as email when it has an
//!   `@`), `X-Debug-Org` (org slug) and `X-Debug-Groups` (comma-separated).
//! - `oidc`: `Authorization: Bearer <id token>`, with an optional
//!   `X-Access-Token` used to fetch userinfo claims.

use axum::http::{header, HeaderMap};
use domain::role_sync::OidcIdentity;
use domain::CoreError;
use oidc_auth::{AuthError, OidcVerifier, VerifiedIdentity};
use tracing::warn;

pub const DEBUG_USER_HEADER: &str = "x-debug-user";
pub const DEBUG_ORG_HEADER: &str = "x-debug-org";
pub const DEBUG_GROUPS_HEADER: &str = "x-debug-groups";
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

pub enum Authenticator {
    Debug,
    Oidc(OidcVerifier),
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn debug_identity(headers: &HeaderMap) -> Option<OidcIdentity> {
    let sub = header_str(headers, DEBUG_USER_HEADER)?;
    let email = if sub.contains('@') {
        sub.to_string()
    } else {
        String::new()
    };
    let groups = header_str(headers, DEBUG_GROUPS_HEADER)
        .map(|g| {
            g.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(OidcIdentity {
        sub: sub.to_string(),
        email,
        name: sub.to_string(),
        picture: String::new(),
        username: None,
        org_slug: header_str(headers, DEBUG_ORG_HEADER).map(str::to_string),
        groups,
    })
}

fn from_verified(v: VerifiedIdentity) -> OidcIdentity {
    OidcIdentity {
        sub: v.sub,
        email: v.email,
        name: v.name,
        picture: v.picture,
        username: v.username,
        org_slug: v.org_slug,
        groups: v.groups,
    }
}

impl Authenticator {
    /// `Ok(None)` when the request carries no credentials at all.
    pub async fn identify(&self, headers: &HeaderMap) -> Result<Option<OidcIdentity>, CoreError> {
        match self {
            Authenticator::Debug => Ok(debug_identity(headers)),
            Authenticator::Oidc(verifier) => {
                let Some(auth) = header_str(headers, header::AUTHORIZATION.as_str()) else {
                    return Ok(None);
                };
                let token = auth
                    .strip_prefix("Bearer ")
                    .ok_or(CoreError::Unauthorized)?;
                let access_token = header_str(headers, ACCESS_TOKEN_HEADER);
                match verifier.authenticate(token.trim(), access_token).await {
                    Ok(identity) => Ok(Some(from_verified(identity))),
                    Err(AuthError::Network(e)) => {
                        warn!(err = %e, "identity provider unreachable");
                        Err(CoreError::Repository(format!("identity provider: {e}")))
                    }
                    Err(e) => {
                        warn!(err = %e, "auth failed");
                        Err(CoreError::Unauthorized)
                    }
                }
            }
        }
    }
}
