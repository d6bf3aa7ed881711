//! Dynamic claim helpers. Providers disagree on claim shapes, so org and
//! group claims may arrive as a single string or as an array of strings.

use serde_json::{Map, Value};

pub type Claims = Map<String, Value>;

/// Normalized identity extracted from a claim set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub picture: String,
    pub username: Option<String>,
    pub org_slug: Option<String>,
    pub groups: Vec<String>,
}

/// Read a claim that may be a string or an array of strings. Empty strings
/// and non-string array members are skipped.
pub fn claim_strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn claim_str(claims: &Claims, key: &str) -> Option<String> {
    claims
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Overlay userinfo on top of the ID-token claims. A groups claim carried
/// by the ID token wins over whatever userinfo returns for the same key.
pub fn merge_claims(id_token: &Claims, userinfo: &Claims, groups_claim: &str) -> Claims {
    let mut merged = id_token.clone();
    for (k, v) in userinfo {
        merged.insert(k.clone(), v.clone());
    }
    if let Some(groups) = id_token.get(groups_claim) {
        if !claim_strings(Some(groups)).is_empty() {
            merged.insert(groups_claim.to_string(), groups.clone());
        }
    }
    merged
}

/// Build an identity from a verified claim set.
pub fn identity_from_claims(
    claims: &Claims,
    org_claim: Option<&str>,
    groups_claim: &str,
) -> Option<VerifiedIdentity> {
    let sub = claim_str(claims, "sub")?;
    let org_slug = org_claim
        .and_then(|c| claim_strings(claims.get(c)).into_iter().next())
        .map(|s| s.to_lowercase());
    Some(VerifiedIdentity {
        sub,
        email: claim_str(claims, "email").unwrap_or_default(),
        name: claim_str(claims, "name").unwrap_or_default(),
        picture: claim_str(claims, "picture").unwrap_or_default(),
        username: claim_str(claims, "preferred_username"),
        org_slug,
        groups: claim_strings(claims.get(groups_claim)),
    })
}
