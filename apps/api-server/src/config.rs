//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use std::env;
use std::fmt;
use std::time::Duration;

use domain::health::{DEFAULT_MAX_AGE, DEFAULT_SCAN_INTERVAL};

const MIN_SESSION_SECRET_LEN: usize = 32;

/// Authentication provider mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthProvider {
    /// Debug mode: trusts X-Debug-User / X-Debug-Org / X-Debug-Groups (DO NOT USE IN PRODUCTION)
    None,
    /// Bearer ID tokens verified against the OIDC issuer
    Oidc,
}

impl AuthProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("oidc") {
            Self::Oidc
        } else {
            Self::None
        }
    }
}

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on restart)
    Memory,
    /// SQLite file-based storage
    Sqlite,
}

impl StorageProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("memory") {
            Self::Memory
        } else {
            Self::Sqlite
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// OIDC provider settings (only populated when AUTH_PROVIDER=oidc).
#[derive(Debug, Clone)]
pub struct OidcSettings {
    pub issuer: String,
    pub client_id: String,
    /// Carried for the external login handshake.
    #[allow(dead_code)]
    pub client_secret: String,
    #[allow(dead_code)]
    pub redirect_url: String,
}

/// Outbound email settings. Email is enabled iff this is `Some`.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    #[allow(dead_code)]
    pub password: Option<String>,
    pub from: String,
}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3001)
    pub port: u16,
    pub log_format: LogFormat,
    pub storage_provider: StorageProvider,
    /// SQLite location, `sqlite://` prefix optional
    pub database_url: String,
    pub auth_provider: AuthProvider,
    pub oidc: Option<OidcSettings>,
    /// Claim holding the organization slug
    pub oidc_org_claim: Option<String>,
    /// Claim holding group names (default: groups)
    pub oidc_groups_claim: String,
    pub oidc_admin_groups: Vec<String>,
    pub oidc_moderator_groups: Vec<String>,
    /// Claims-only token verification (dev only)
    pub insecure_skip_signature: bool,
    #[allow(dead_code)]
    pub session_secret: Option<String>,
    pub enable_personal_links: bool,
    pub enable_org_links: bool,
    pub enable_random_keywords: bool,
    pub smtp: Option<SmtpSettings>,
    /// `slug=url` pairs applied at startup
    pub org_fallbacks: Vec<(String, String)>,
    /// Public base URL used in notification bodies
    pub base_url: String,
    pub health_check_enabled: bool,
    pub health_check_interval: Duration,
    pub health_check_max_age: Duration,
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
}

fn parse_bool(field: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError {
                field,
                message: format!("expected a boolean, got '{v}'"),
            }),
        },
    }
}

fn parse_secs(field: &'static str, raw: Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(v) => match v.parse::<u64>() {
            Ok(0) | Err(_) => Err(ConfigError {
                field,
                message: format!("expected a positive number of seconds, got '{v}'"),
            }),
            Ok(secs) => Ok(Duration::from_secs(secs)),
        },
    }
}

fn parse_list(raw: Option<String>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `acme=https://wiki.acme.example/search?q=,beta=https://beta.example/`
fn parse_org_fallbacks(raw: Option<String>) -> Result<Vec<(String, String)>, ConfigError> {
    parse_list(raw)
        .into_iter()
        .map(|entry| match entry.split_once('=') {
            Some((slug, url)) if !slug.trim().is_empty() && !url.trim().is_empty() => {
                Ok((slug.trim().to_lowercase(), url.trim().to_string()))
            }
            _ => Err(ConfigError {
                field: "ORG_FALLBACKS",
                message: format!("expected slug=url, got '{entry}'"),
            }),
        })
        .collect()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an explicit variable source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        // Port
        let port = match var("PORT") {
            Some(p) => p.trim().parse().map_err(|_| ConfigError {
                field: "PORT",
                message: format!("invalid port '{p}'"),
            })?,
            None => 3001,
        };

        let log_format = LogFormat::from_str(&var("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        // Storage
        let storage_provider =
            StorageProvider::from_str(&var("STORAGE_PROVIDER").unwrap_or_else(|| "sqlite".into()));
        let database_url = var("DATABASE_URL").unwrap_or_else(|| "sqlite://./data/golinks.db".into());

        // Auth
        let auth_provider =
            AuthProvider::from_str(&var("AUTH_PROVIDER").unwrap_or_else(|| "none".into()));

        let session_secret = var("SESSION_SECRET");
        if let Some(secret) = &session_secret {
            if secret.len() < MIN_SESSION_SECRET_LEN {
                return Err(ConfigError {
                    field: "SESSION_SECRET",
                    message: format!("must be at least {MIN_SESSION_SECRET_LEN} bytes"),
                });
            }
        }

        // Validate: OIDC needs the whole provider block plus a session secret
        let oidc = if auth_provider == AuthProvider::Oidc {
            let required = |field: &'static str| {
                var(field).ok_or_else(|| ConfigError {
                    field,
                    message: "Required when AUTH_PROVIDER=oidc".into(),
                })
            };
            let settings = OidcSettings {
                issuer: required("OIDC_ISSUER")?,
                client_id: required("OIDC_CLIENT_ID")?,
                client_secret: required("OIDC_CLIENT_SECRET")?,
                redirect_url: required("OIDC_REDIRECT_URL")?,
            };
            if session_secret.is_none() {
                return Err(ConfigError {
                    field: "SESSION_SECRET",
                    message: "Required when AUTH_PROVIDER=oidc".into(),
                });
            }
            Some(settings)
        } else {
            None
        };

        let oidc_org_claim = var("OIDC_ORG_CLAIM").map(|c| c.trim().to_string());
        let oidc_groups_claim = var("OIDC_GROUPS_CLAIM")
            .map(|c| c.trim().to_string())
            .unwrap_or_else(|| "groups".into());
        let oidc_admin_groups = parse_list(var("OIDC_ADMIN_GROUPS"));
        let oidc_moderator_groups = parse_list(var("OIDC_MODERATOR_GROUPS"));
        let insecure_skip_signature = parse_bool(
            "OIDC_INSECURE_SKIP_SIGNATURE",
            var("OIDC_INSECURE_SKIP_SIGNATURE"),
            false,
        )?;

        // Features
        let enable_personal_links =
            parse_bool("ENABLE_PERSONAL_LINKS", var("ENABLE_PERSONAL_LINKS"), true)?;
        let enable_org_links = parse_bool("ENABLE_ORG_LINKS", var("ENABLE_ORG_LINKS"), true)?;
        let enable_random_keywords =
            parse_bool("ENABLE_RANDOM_KEYWORDS", var("ENABLE_RANDOM_KEYWORDS"), false)?;

        // Email
        let smtp = match (var("SMTP_HOST"), var("SMTP_FROM")) {
            (Some(host), Some(from)) => {
                let port = match var("SMTP_PORT") {
                    Some(p) => p.trim().parse().map_err(|_| ConfigError {
                        field: "SMTP_PORT",
                        message: format!("invalid port '{p}'"),
                    })?,
                    None => 587,
                };
                Some(SmtpSettings {
                    host,
                    port,
                    username: var("SMTP_USERNAME"),
                    password: var("SMTP_PASSWORD"),
                    from,
                })
            }
            _ => None,
        };

        let org_fallbacks = parse_org_fallbacks(var("ORG_FALLBACKS"))?;
        let base_url = var("BASE_URL")
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| "http://localhost:3001".into());

        // Health checker
        let health_check_enabled =
            parse_bool("HEALTH_CHECK_ENABLED", var("HEALTH_CHECK_ENABLED"), true)?;
        let health_check_interval = parse_secs(
            "HEALTH_CHECK_INTERVAL_SECS",
            var("HEALTH_CHECK_INTERVAL_SECS"),
            DEFAULT_SCAN_INTERVAL,
        )?;
        let health_check_max_age = parse_secs(
            "HEALTH_CHECK_MAX_AGE_SECS",
            var("HEALTH_CHECK_MAX_AGE_SECS"),
            DEFAULT_MAX_AGE,
        )?;

        // CORS allow origin
        let cors_origin_str = var("CORS_ALLOW_ORIGIN").unwrap_or_else(|| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        Ok(Self {
            port,
            log_format,
            storage_provider,
            database_url,
            auth_provider,
            oidc,
            oidc_org_claim,
            oidc_groups_claim,
            oidc_admin_groups,
            oidc_moderator_groups,
            insecure_skip_signature,
            session_secret,
            enable_personal_links,
            enable_org_links,
            enable_random_keywords,
            smtp,
            org_fallbacks,
            base_url,
            health_check_enabled,
            health_check_interval,
            health_check_max_age,
            cors_allow_origin,
        })
    }

    /// Only global links, anonymous redirects.
    pub fn is_simple_mode(&self) -> bool {
        !self.enable_personal_links && !self.enable_org_links
    }

    /// Log warnings about insecure configuration.
    pub fn warn_if_insecure(&self) {
        if self.auth_provider == AuthProvider::None {
            tracing::warn!(
                "AUTH_PROVIDER=none: Using debug authentication via X-Debug-User header. \
                 DO NOT USE IN PRODUCTION."
            );
        }
        if self.insecure_skip_signature {
            tracing::warn!(
                "OIDC_INSECURE_SKIP_SIGNATURE is set: ID token signature verification \
                 is DISABLED. DO NOT USE IN PRODUCTION."
            );
        }
        if self.smtp.is_none() {
            tracing::info!("SMTP_HOST/SMTP_FROM not set: email notifications are disabled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn auth_provider_parsing() {
        assert_eq!(AuthProvider::from_str("none"), AuthProvider::None);
        assert_eq!(AuthProvider::from_str("OIDC"), AuthProvider::Oidc);
        assert_eq!(AuthProvider::from_str("anything"), AuthProvider::None);
    }

    #[test]
    fn storage_provider_parsing() {
        assert_eq!(StorageProvider::from_str("memory"), StorageProvider::Memory);
        assert_eq!(StorageProvider::from_str("SQLITE"), StorageProvider::Sqlite);
        assert_eq!(StorageProvider::from_str("anything"), StorageProvider::Sqlite);
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::from_str("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("anything"), LogFormat::Pretty);
    }

    #[test]
    fn defaults() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.port, 3001);
        assert_eq!(cfg.auth_provider, AuthProvider::None);
        assert_eq!(cfg.storage_provider, StorageProvider::Sqlite);
        assert_eq!(cfg.database_url, "sqlite://./data/golinks.db");
        assert_eq!(cfg.oidc_groups_claim, "groups");
        assert!(cfg.enable_personal_links && cfg.enable_org_links);
        assert!(!cfg.enable_random_keywords);
        assert!(!cfg.is_simple_mode());
        assert!(cfg.smtp.is_none());
        assert!(cfg.health_check_enabled);
        assert_eq!(cfg.health_check_interval, Duration::from_secs(3600));
        assert_eq!(cfg.health_check_max_age, Duration::from_secs(86_400));
    }

    #[test]
    fn oidc_requires_provider_block_and_secret() {
        let err = load(&[("AUTH_PROVIDER", "oidc")]).unwrap_err();
        assert_eq!(err.field, "OIDC_ISSUER");

        let base = [
            ("AUTH_PROVIDER", "oidc"),
            ("OIDC_ISSUER", "https://login.example.com"),
            ("OIDC_CLIENT_ID", "golinks"),
            ("OIDC_CLIENT_SECRET", "s3cret"),
            ("OIDC_REDIRECT_URL", "https://go.example.com/auth/callback"),
        ];
        let err = load(&base).unwrap_err();
        assert_eq!(err.field, "SESSION_SECRET");

        let mut vars = base.to_vec();
        vars.push(("SESSION_SECRET", "0123456789abcdef0123456789abcdef"));
        let cfg = load(&vars).unwrap();
        assert_eq!(cfg.oidc.unwrap().issuer, "https://login.example.com");
    }

    #[test]
    fn short_session_secret_is_rejected() {
        let err = load(&[("SESSION_SECRET", "too-short")]).unwrap_err();
        assert_eq!(err.field, "SESSION_SECRET");
    }

    #[test]
    fn simple_mode_and_group_lists() {
        let cfg = load(&[
            ("ENABLE_PERSONAL_LINKS", "false"),
            ("ENABLE_ORG_LINKS", "0"),
            ("OIDC_ADMIN_GROUPS", " admins , ,ops"),
        ])
        .unwrap();
        assert!(cfg.is_simple_mode());
        assert_eq!(cfg.oidc_admin_groups, vec!["admins", "ops"]);
        assert!(cfg.oidc_moderator_groups.is_empty());

        let err = load(&[("ENABLE_ORG_LINKS", "maybe")]).unwrap_err();
        assert_eq!(err.field, "ENABLE_ORG_LINKS");
    }

    #[test]
    fn org_fallbacks_parse_pairs() {
        let cfg = load(&[(
            "ORG_FALLBACKS",
            "Acme=https://wiki.acme.example/search?q=, beta=https://beta.example/",
        )])
        .unwrap();
        assert_eq!(
            cfg.org_fallbacks,
            vec![
                ("acme".to_string(), "https://wiki.acme.example/search?q=".to_string()),
                ("beta".to_string(), "https://beta.example/".to_string()),
            ]
        );
        let err = load(&[("ORG_FALLBACKS", "acme")]).unwrap_err();
        assert_eq!(err.field, "ORG_FALLBACKS");
    }

    #[test]
    fn smtp_enabled_only_with_host_and_from() {
        assert!(load(&[("SMTP_HOST", "mail.example.com")]).unwrap().smtp.is_none());
        let cfg = load(&[
            ("SMTP_HOST", "mail.example.com"),
            ("SMTP_FROM", "golinks@example.com"),
        ])
        .unwrap();
        assert_eq!(cfg.smtp.unwrap().port, 587);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = load(&[("HEALTH_CHECK_INTERVAL_SECS", "0")]).unwrap_err();
        assert_eq!(err.field, "HEALTH_CHECK_INTERVAL_SECS");
    }
}
