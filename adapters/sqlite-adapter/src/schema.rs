//! Versioned schema. Each entry runs once, in order, tracked through
//! `PRAGMA user_version`.

use rusqlite::Connection;

use crate::map_sqerr;
use domain::CoreError;

const V1: &str = r#"
CREATE TABLE organizations (
    id BLOB PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    fallback_redirect_url TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE fallback_redirects (
    id BLOB PRIMARY KEY,
    organization_id BLOB NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX idx_fallback_redirects_org ON fallback_redirects(organization_id);

CREATE TABLE users (
    id BLOB PRIMARY KEY,
    sub TEXT NOT NULL UNIQUE,
    username TEXT,
    email TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    picture TEXT NOT NULL DEFAULT '',
    role TEXT NOT NULL DEFAULT 'user'
        CHECK (role IN ('user', 'org_mod', 'global_mod', 'admin')),
    organization_id BLOB REFERENCES organizations(id) ON DELETE SET NULL,
    oidc_mapped_role TEXT
        CHECK (oidc_mapped_role IS NULL OR oidc_mapped_role IN ('user', 'moderator', 'admin')),
    fallback_redirect_id BLOB REFERENCES fallback_redirects(id) ON DELETE SET NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX idx_users_org ON users(organization_id);
CREATE INDEX idx_users_email ON users(lower(email));

CREATE TABLE links (
    id BLOB PRIMARY KEY,
    keyword TEXT NOT NULL CHECK (keyword = lower(keyword)),
    url TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    scope TEXT NOT NULL CHECK (scope IN ('global', 'org')),
    organization_id BLOB REFERENCES organizations(id) ON DELETE CASCADE,
    status TEXT NOT NULL
        CHECK (status IN ('pending', 'approved', 'rejected', 'deletion_pending')),
    created_by BLOB REFERENCES users(id) ON DELETE SET NULL,
    submitted_by BLOB REFERENCES users(id) ON DELETE SET NULL,
    reviewed_by BLOB REFERENCES users(id) ON DELETE SET NULL,
    reviewed_at INTEGER,
    deletion_requested_by BLOB REFERENCES users(id) ON DELETE SET NULL,
    deletion_reason TEXT,
    click_count INTEGER NOT NULL DEFAULT 0,
    health_status TEXT NOT NULL DEFAULT 'unknown'
        CHECK (health_status IN ('unknown', 'healthy', 'unhealthy')),
    health_checked_at INTEGER,
    health_error TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    CHECK ((scope = 'org') = (organization_id IS NOT NULL)),
    CHECK ((health_status = 'unknown') = (health_checked_at IS NULL))
);
-- one live row per keyword and scope; rejected rows release the keyword
CREATE UNIQUE INDEX ux_links_global_keyword ON links(keyword)
    WHERE scope = 'global' AND status IN ('pending', 'approved', 'deletion_pending');
CREATE UNIQUE INDEX ux_links_org_keyword ON links(organization_id, keyword)
    WHERE scope = 'org' AND status IN ('pending', 'approved', 'deletion_pending');
CREATE INDEX idx_links_status ON links(status);
CREATE INDEX idx_links_health_checked ON links(health_checked_at);

CREATE TABLE user_links (
    id BLOB PRIMARY KEY,
    user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    keyword TEXT NOT NULL CHECK (keyword = lower(keyword)),
    url TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    click_count INTEGER NOT NULL DEFAULT 0,
    health_status TEXT NOT NULL DEFAULT 'unknown'
        CHECK (health_status IN ('unknown', 'healthy', 'unhealthy')),
    health_checked_at INTEGER,
    health_error TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (user_id, keyword),
    CHECK ((health_status = 'unknown') = (health_checked_at IS NULL))
);
CREATE INDEX idx_user_links_health_checked ON user_links(health_checked_at);

CREATE TABLE link_edit_requests (
    id BLOB PRIMARY KEY,
    link_id BLOB NOT NULL REFERENCES links(id) ON DELETE CASCADE,
    user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    reason TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'approved', 'rejected')),
    reviewed_by BLOB REFERENCES users(id) ON DELETE SET NULL,
    reviewed_at INTEGER,
    created_at INTEGER NOT NULL
);
CREATE UNIQUE INDEX ux_edit_requests_pending ON link_edit_requests(link_id, user_id)
    WHERE status = 'pending';
CREATE INDEX idx_edit_requests_user_status ON link_edit_requests(user_id, status);

CREATE TABLE shared_links (
    id BLOB PRIMARY KEY,
    sender_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    recipient_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    keyword TEXT NOT NULL,
    url TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL,
    CHECK (sender_id <> recipient_id),
    UNIQUE (sender_id, recipient_id, keyword)
);
CREATE INDEX idx_shared_links_recipient ON shared_links(recipient_id);

CREATE TABLE keyword_lookups (
    keyword TEXT NOT NULL,
    outcome TEXT NOT NULL CHECK (outcome IN ('resolved', 'fallback', 'not_found')),
    count INTEGER NOT NULL DEFAULT 0,
    last_seen_at INTEGER NOT NULL,
    PRIMARY KEY (keyword, outcome)
);
"#;

/// Last check attempt, set on every result including timeouts, so targets
/// that keep timing out queue behind the rest of the stale set.
const V2: &str = r#"
ALTER TABLE links ADD COLUMN health_attempted_at INTEGER;
ALTER TABLE user_links ADD COLUMN health_attempted_at INTEGER;
CREATE INDEX idx_links_health_attempted ON links(health_attempted_at);
CREATE INDEX idx_user_links_health_attempted ON user_links(health_attempted_at);
"#;

const MIGRATIONS: &[&str] = &[V1, V2];

/// Apply every migration newer than the database's `user_version`.
pub(crate) fn migrate(conn: &Connection) -> Result<(), CoreError> {
    let current: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(map_sqerr)?;
    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let version = idx as i64 + 1;
        if version <= current {
            continue;
        }
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        tx.execute_batch(sql).map_err(map_sqerr)?;
        tx.pragma_update(None, "user_version", version)
            .map_err(map_sqerr)?;
        tx.commit().map_err(map_sqerr)?;
        tracing::info!(version, "applied sqlite migration");
    }
    Ok(())
}

/// Latest schema version this build knows about.
pub fn latest_version() -> i64 {
    MIGRATIONS.len() as i64
}
