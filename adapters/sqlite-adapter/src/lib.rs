//! sqlite-adapter — SQLite implementation of the domain store.
//!
//! Purpose
//! - Persist organizations, users, links, personal links, edit requests,
//!   share offers, fallback redirects and lookup counters.
//! - Enforce the keyword and request invariants at the database level
//!   (unique and partial-unique indexes, CHECK and foreign-key constraints).
//! - Resolve keywords in a single `UNION ALL` query.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - A single connection behind a mutex; multi-statement operations run in a
//!   transaction on it.
//! - Timestamps are stored as seconds since UNIX_EPOCH, ids as 16-byte blobs.
//! - `similarity(a, b)` is registered as a SQL function (trigram Jaccard).

mod links;
mod resolve;
mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use domain::{
    CoreError, FallbackRedirect, FallbackRepository, HealthStatus, KeywordLookup, LinkHealth,
    LookupOutcome, LookupRepository, MappedRole, Organization, OrganizationRepository, Role, Store,
    UpsertUser, User, UserRepository,
};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use uuid::Uuid;

pub use schema::latest_version;

/// SQLite-backed store.
pub struct SqliteRepo {
    conn: Mutex<Connection>,
}

impl SqliteRepo {
    /// Open (or create) a SQLite database at the given path and migrate it.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(map_sqerr)?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, for tests and throwaway runs.
    pub fn in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqerr)?;
        Self::from_connection(conn)
    }

    /// Open from a `DATABASE_URL`-style location. The `sqlite://` prefix is
    /// optional; parent directories are created.
    pub fn open_url(url: &str) -> Result<Self, CoreError> {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        if path == ":memory:" {
            return Self::in_memory();
        }
        if let Some(dir) = Path::new(path).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    CoreError::Repository(format!("create {}: {e}", dir.display()))
                })?;
            }
        }
        Self::new(path)
    }

    fn from_connection(conn: Connection) -> Result<Self, CoreError> {
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(map_sqerr)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(map_sqerr)?;
        conn.create_scalar_function(
            "similarity",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let a: String = ctx.get(0)?;
                let b: String = ctx.get(1)?;
                Ok(domain::similarity::similarity(&a, &b))
            },
        )
        .map_err(map_sqerr)?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))
    }
}

pub(crate) fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::Repository(format!("sqlite error: {e}"))
}

/// Map a constraint failure to the domain error for a unique violation;
/// everything else becomes a repository error.
pub(crate) fn map_constraint(e: rusqlite::Error, on_unique: CoreError) -> CoreError {
    let code = match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            err.extended_code
        }
        _ => return map_sqerr(e),
    };
    match code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => on_unique,
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => CoreError::NotFound,
        ffi::SQLITE_CONSTRAINT_CHECK => CoreError::InvalidInput(format!("constraint failed: {e}")),
        _ => map_sqerr(e),
    }
}

pub(crate) fn to_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs() as i64
}

pub(crate) fn from_secs(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

/// Read a text column through one of the domain `parse` functions.
pub(crate) fn enum_col<T>(row: &Row, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unexpected value '{raw}'").into(),
        )
    })
}

/// Health columns `(status, checked_at, error)` starting at `idx`.
pub(crate) fn health_cols(row: &Row, idx: usize) -> rusqlite::Result<LinkHealth> {
    let checked_at: Option<i64> = row.get(idx + 1)?;
    Ok(LinkHealth {
        status: enum_col(row, idx, HealthStatus::parse)?,
        checked_at: checked_at.map(from_secs),
        error: row.get(idx + 2)?,
    })
}

const ORG_COLUMNS: &str = "id, slug, name, fallback_redirect_url, created_at, updated_at";

fn row_to_org(row: &Row) -> rusqlite::Result<Organization> {
    Ok(Organization {
        id: row.get(0)?,
        slug: row.get(1)?,
        name: row.get(2)?,
        fallback_redirect_url: row.get(3)?,
        created_at: from_secs(row.get(4)?),
        updated_at: from_secs(row.get(5)?),
    })
}

const USER_COLUMNS: &str = "id, sub, username, email, name, picture, role, organization_id, \
     oidc_mapped_role, fallback_redirect_id, created_at, updated_at";

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let mapped: Option<String> = row.get(8)?;
    Ok(User {
        id: row.get(0)?,
        sub: row.get(1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        name: row.get(4)?,
        picture: row.get(5)?,
        role: enum_col(row, 6, Role::parse)?,
        organization_id: row.get(7)?,
        oidc_mapped_role: mapped.as_deref().and_then(MappedRole::parse),
        fallback_redirect_id: row.get(9)?,
        created_at: from_secs(row.get(10)?),
        updated_at: from_secs(row.get(11)?),
    })
}

const FALLBACK_COLUMNS: &str = "id, organization_id, name, url, created_at";

fn row_to_fallback(row: &Row) -> rusqlite::Result<FallbackRedirect> {
    Ok(FallbackRedirect {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        name: row.get(2)?,
        url: row.get(3)?,
        created_at: from_secs(row.get(4)?),
    })
}

impl OrganizationRepository for SqliteRepo {
    fn get_organization(&self, id: Uuid) -> Result<Option<Organization>, CoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {ORG_COLUMNS} FROM organizations WHERE id = ?1"),
            params![id],
            row_to_org,
        )
        .optional()
        .map_err(map_sqerr)
    }

    fn get_organization_by_slug(&self, slug: &str) -> Result<Option<Organization>, CoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {ORG_COLUMNS} FROM organizations WHERE slug = ?1"),
            params![slug],
            row_to_org,
        )
        .optional()
        .map_err(map_sqerr)
    }

    fn create_organization(&self, org: Organization) -> Result<(), CoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO organizations(id, slug, name, fallback_redirect_url, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                org.id,
                org.slug,
                org.name,
                org.fallback_redirect_url,
                to_secs(org.created_at),
                to_secs(org.updated_at),
            ],
        )
        .map_err(|e| map_constraint(e, CoreError::AlreadyExists))?;
        Ok(())
    }

    fn list_organizations(&self) -> Result<Vec<Organization>, CoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {ORG_COLUMNS} FROM organizations ORDER BY slug"))
            .map_err(map_sqerr)?;
        let rows = stmt.query_map([], row_to_org).map_err(map_sqerr)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sqerr)
    }

    fn set_organization_fallback_url(
        &self,
        id: Uuid,
        url: Option<&str>,
        now: SystemTime,
    ) -> Result<(), CoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE organizations SET fallback_redirect_url = ?1, updated_at = ?2 WHERE id = ?3",
                params![url, to_secs(now), id],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }
}

impl UserRepository for SqliteRepo {
    fn get_user(&self, id: Uuid) -> Result<Option<User>, CoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            row_to_user,
        )
        .optional()
        .map_err(map_sqerr)
    }

    fn get_user_by_sub(&self, sub: &str) -> Result<Option<User>, CoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE sub = ?1"),
            params![sub],
            row_to_user,
        )
        .optional()
        .map_err(map_sqerr)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower(?1) \
                 ORDER BY created_at LIMIT 1"
            ),
            params![email],
            row_to_user,
        )
        .optional()
        .map_err(map_sqerr)
    }

    fn upsert_user(&self, input: UpsertUser, now: SystemTime) -> Result<User, CoreError> {
        let conn = self.conn()?;
        let role = input.role.map(|r| r.as_str());
        conn.execute(
            "INSERT INTO users(id, sub, username, email, name, picture, role, organization_id, \
                               oidc_mapped_role, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, COALESCE(?7, 'user'), ?8, ?9, ?10, ?10) \
             ON CONFLICT(sub) DO UPDATE SET \
                username = excluded.username, \
                email = excluded.email, \
                name = excluded.name, \
                picture = excluded.picture, \
                role = COALESCE(?7, users.role), \
                organization_id = excluded.organization_id, \
                oidc_mapped_role = excluded.oidc_mapped_role, \
                updated_at = excluded.updated_at",
            params![
                Uuid::new_v4(),
                input.sub,
                input.username,
                input.email,
                input.name,
                input.picture,
                role,
                input.organization_id,
                input.oidc_mapped_role.map(|m| m.as_str()),
                to_secs(now),
            ],
        )
        .map_err(|e| map_constraint(e, CoreError::AlreadyExists))?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE sub = ?1"),
            params![input.sub],
            row_to_user,
        )
        .map_err(map_sqerr)
    }

    fn set_user_role(&self, id: Uuid, role: Role, now: SystemTime) -> Result<(), CoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE users SET role = ?1, updated_at = ?2 WHERE id = ?3",
                params![role.as_str(), to_secs(now), id],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn set_user_fallback(
        &self,
        id: Uuid,
        fallback_id: Option<Uuid>,
        now: SystemTime,
    ) -> Result<(), CoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE users SET fallback_redirect_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![fallback_id, to_secs(now), id],
            )
            .map_err(|e| map_constraint(e, CoreError::NotFound))?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn list_moderators(&self, organization_id: Option<Uuid>) -> Result<Vec<User>, CoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users \
                 WHERE role IN ('global_mod', 'admin') \
                    OR (role = 'org_mod' AND ?1 IS NOT NULL AND organization_id = ?1) \
                 ORDER BY email"
            ))
            .map_err(map_sqerr)?;
        let rows = stmt
            .query_map(params![organization_id], row_to_user)
            .map_err(map_sqerr)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sqerr)
    }

    fn promote_org_moderators(
        &self,
        organization_id: Uuid,
        now: SystemTime,
    ) -> Result<usize, CoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE users SET role = 'org_mod', updated_at = ?1 \
             WHERE organization_id = ?2 AND oidc_mapped_role = 'moderator' AND role = 'user'",
            params![to_secs(now), organization_id],
        )
        .map_err(map_sqerr)
    }
}

impl FallbackRepository for SqliteRepo {
    fn insert_fallback(&self, fallback: FallbackRedirect) -> Result<(), CoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO fallback_redirects(id, organization_id, name, url, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                fallback.id,
                fallback.organization_id,
                fallback.name,
                fallback.url,
                to_secs(fallback.created_at),
            ],
        )
        .map_err(|e| map_constraint(e, CoreError::AlreadyExists))?;
        Ok(())
    }

    fn get_fallback(&self, id: Uuid) -> Result<Option<FallbackRedirect>, CoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {FALLBACK_COLUMNS} FROM fallback_redirects WHERE id = ?1"),
            params![id],
            row_to_fallback,
        )
        .optional()
        .map_err(map_sqerr)
    }

    fn list_fallbacks(&self, organization_id: Uuid) -> Result<Vec<FallbackRedirect>, CoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {FALLBACK_COLUMNS} FROM fallback_redirects \
                 WHERE organization_id = ?1 ORDER BY name"
            ))
            .map_err(map_sqerr)?;
        let rows = stmt
            .query_map(params![organization_id], row_to_fallback)
            .map_err(map_sqerr)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sqerr)
    }

    fn delete_fallback(&self, id: Uuid) -> Result<(), CoreError> {
        let conn = self.conn()?;
        // users.fallback_redirect_id is cleared by ON DELETE SET NULL
        let changed = conn
            .execute("DELETE FROM fallback_redirects WHERE id = ?1", params![id])
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }
}

impl LookupRepository for SqliteRepo {
    fn record_lookup(
        &self,
        keyword: &str,
        outcome: LookupOutcome,
        now: SystemTime,
    ) -> Result<(), CoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO keyword_lookups(keyword, outcome, count, last_seen_at) \
             VALUES (?1, ?2, 1, ?3) \
             ON CONFLICT(keyword, outcome) DO UPDATE SET \
                count = count + 1, last_seen_at = excluded.last_seen_at",
            params![keyword, outcome.as_str(), to_secs(now)],
        )
        .map_err(map_sqerr)?;
        Ok(())
    }

    fn list_lookups(&self) -> Result<Vec<KeywordLookup>, CoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT keyword, outcome, count, last_seen_at FROM keyword_lookups \
                 ORDER BY keyword, outcome",
            )
            .map_err(map_sqerr)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(KeywordLookup {
                    keyword: row.get(0)?,
                    outcome: enum_col(row, 1, LookupOutcome::parse)?,
                    count: row.get::<_, i64>(2)? as u64,
                    last_seen_at: from_secs(row.get(3)?),
                })
            })
            .map_err(map_sqerr)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sqerr)
    }
}

impl Store for SqliteRepo {
    fn ping(&self) -> Result<(), CoreError> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(map_sqerr)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn tmp_db() -> (SqliteRepo, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let repo = SqliteRepo::new(path).unwrap();
        (repo, dir)
    }

    pub(crate) fn seed_user(repo: &SqliteRepo, sub: &str, org: Option<Uuid>) -> User {
        repo.upsert_user(
            UpsertUser {
                sub: sub.into(),
                username: None,
                email: format!("{sub}@example.com"),
                name: sub.into(),
                picture: String::new(),
                organization_id: org,
                oidc_mapped_role: None,
                role: None,
            },
            UNIX_EPOCH,
        )
        .unwrap()
    }

    pub(crate) fn seed_org(repo: &SqliteRepo, slug: &str) -> Organization {
        let org = Organization::new(slug, slug, UNIX_EPOCH);
        repo.create_organization(org.clone()).unwrap();
        org
    }

    #[test]
    fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.db");
        drop(SqliteRepo::new(&path).unwrap());
        let repo = SqliteRepo::new(&path).unwrap();
        let conn = repo.conn().unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, latest_version());
    }

    #[test]
    fn open_url_strips_scheme_and_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/nested/golinks.db", dir.path().display());
        let repo = SqliteRepo::open_url(&url).unwrap();
        repo.ping().unwrap();
        assert!(dir.path().join("nested/golinks.db").exists());
    }

    #[test]
    fn organization_slug_is_unique() {
        let (repo, _dir) = tmp_db();
        seed_org(&repo, "acme");
        let err = repo
            .create_organization(Organization::new("acme", "Again", UNIX_EPOCH))
            .unwrap_err();
        assert_eq!(err, CoreError::AlreadyExists);
        assert_eq!(repo.list_organizations().unwrap().len(), 1);
    }

    #[test]
    fn upsert_keeps_role_unless_overridden() {
        let (repo, _dir) = tmp_db();
        let u = seed_user(&repo, "alice", None);
        assert_eq!(u.role, Role::User);
        repo.set_user_role(u.id, Role::Admin, UNIX_EPOCH).unwrap();
        let again = seed_user(&repo, "alice", None);
        assert_eq!(again.id, u.id);
        assert_eq!(again.role, Role::Admin);

        let overridden = repo
            .upsert_user(
                UpsertUser {
                    sub: "alice".into(),
                    username: Some("al".into()),
                    email: "Alice@Example.com".into(),
                    name: "Alice".into(),
                    picture: String::new(),
                    organization_id: None,
                    oidc_mapped_role: Some(MappedRole::Moderator),
                    role: Some(Role::GlobalMod),
                },
                UNIX_EPOCH,
            )
            .unwrap();
        assert_eq!(overridden.role, Role::GlobalMod);
        assert_eq!(overridden.oidc_mapped_role, Some(MappedRole::Moderator));
        assert_eq!(
            repo.get_user_by_email("alice@example.com").unwrap().map(|u| u.id),
            Some(u.id)
        );
    }

    #[test]
    fn moderators_and_promotion() {
        let (repo, _dir) = tmp_db();
        let acme = seed_org(&repo, "acme");
        let other = seed_org(&repo, "other");
        let gm = seed_user(&repo, "gm", None);
        repo.set_user_role(gm.id, Role::GlobalMod, UNIX_EPOCH).unwrap();
        let om = seed_user(&repo, "om", Some(acme.id));
        repo.set_user_role(om.id, Role::OrgMod, UNIX_EPOCH).unwrap();
        let om2 = seed_user(&repo, "om2", Some(other.id));
        repo.set_user_role(om2.id, Role::OrgMod, UNIX_EPOCH).unwrap();

        assert_eq!(repo.list_moderators(None).unwrap().len(), 1);
        let acme_mods = repo.list_moderators(Some(acme.id)).unwrap();
        assert_eq!(acme_mods.len(), 2);
        assert!(acme_mods.iter().all(|u| u.id != om2.id));

        let pending = repo
            .upsert_user(
                UpsertUser {
                    sub: "mod-to-be".into(),
                    username: None,
                    email: "m@example.com".into(),
                    name: String::new(),
                    picture: String::new(),
                    organization_id: Some(acme.id),
                    oidc_mapped_role: Some(MappedRole::Moderator),
                    role: Some(Role::User),
                },
                UNIX_EPOCH,
            )
            .unwrap();
        assert_eq!(repo.promote_org_moderators(acme.id, UNIX_EPOCH).unwrap(), 1);
        assert_eq!(
            repo.get_user(pending.id).unwrap().unwrap().role,
            Role::OrgMod
        );
    }

    #[test]
    fn deleting_fallback_nulls_users() {
        let (repo, _dir) = tmp_db();
        let acme = seed_org(&repo, "acme");
        let fb = FallbackRedirect {
            id: Uuid::new_v4(),
            organization_id: acme.id,
            name: "wiki".into(),
            url: "https://wiki/?q=".into(),
            created_at: UNIX_EPOCH,
        };
        repo.insert_fallback(fb.clone()).unwrap();
        let u = seed_user(&repo, "alice", Some(acme.id));
        repo.set_user_fallback(u.id, Some(fb.id), UNIX_EPOCH).unwrap();
        assert_eq!(
            repo.get_user(u.id).unwrap().unwrap().fallback_redirect_id,
            Some(fb.id)
        );
        repo.delete_fallback(fb.id).unwrap();
        assert_eq!(repo.get_user(u.id).unwrap().unwrap().fallback_redirect_id, None);
        assert_eq!(repo.delete_fallback(fb.id).unwrap_err(), CoreError::NotFound);
        // unknown option is refused by the foreign key
        assert_eq!(
            repo.set_user_fallback(u.id, Some(Uuid::new_v4()), UNIX_EPOCH)
                .unwrap_err(),
            CoreError::NotFound
        );
    }

    #[test]
    fn lookup_counter_increments() {
        let (repo, _dir) = tmp_db();
        for _ in 0..5 {
            repo.record_lookup("go", LookupOutcome::Resolved, UNIX_EPOCH)
                .unwrap();
        }
        repo.record_lookup("go", LookupOutcome::NotFound, UNIX_EPOCH)
            .unwrap();
        let rows = repo.list_lookups().unwrap();
        assert_eq!(rows.len(), 2);
        let resolved = rows
            .iter()
            .find(|r| r.outcome == LookupOutcome::Resolved)
            .unwrap();
        assert_eq!(resolved.count, 5);
    }
}
