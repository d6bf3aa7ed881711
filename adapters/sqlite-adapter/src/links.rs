//! Links, personal links, edit requests and share offers.

use std::time::SystemTime;

use domain::{
    CoreError, EditRequestRepository, Link, LinkEditRequest, LinkFilter, LinkRepository,
    LinkStatus, ModerationScope, RequestStatus, Scope, ShareRepository, SharedLink,
    UserLink, UserLinkRepository, MAX_INCOMING_SHARES, MAX_OUTGOING_SHARES,
    MAX_PENDING_REQUESTS,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::{enum_col, from_secs, health_cols, map_constraint, map_sqerr, to_secs, SqliteRepo};

const LINK_COLUMNS: &str = "id, keyword, url, description, scope, organization_id, status, \
     created_by, submitted_by, reviewed_by, reviewed_at, deletion_requested_by, deletion_reason, \
     click_count, health_status, health_checked_at, health_error, created_at, updated_at";

fn row_to_link(row: &Row) -> rusqlite::Result<Link> {
    let reviewed_at: Option<i64> = row.get(10)?;
    Ok(Link {
        id: row.get(0)?,
        keyword: row.get(1)?,
        url: row.get(2)?,
        description: row.get(3)?,
        scope: enum_col(row, 4, Scope::parse)?,
        organization_id: row.get(5)?,
        status: enum_col(row, 6, LinkStatus::parse)?,
        created_by: row.get(7)?,
        submitted_by: row.get(8)?,
        reviewed_by: row.get(9)?,
        reviewed_at: reviewed_at.map(from_secs),
        deletion_requested_by: row.get(11)?,
        deletion_reason: row.get(12)?,
        click_count: row.get::<_, i64>(13)? as u64,
        health: health_cols(row, 14)?,
        created_at: from_secs(row.get(17)?),
        updated_at: from_secs(row.get(18)?),
    })
}

const USER_LINK_COLUMNS: &str = "id, user_id, keyword, url, description, click_count, \
     health_status, health_checked_at, health_error, created_at, updated_at";

fn row_to_user_link(row: &Row) -> rusqlite::Result<UserLink> {
    Ok(UserLink {
        id: row.get(0)?,
        user_id: row.get(1)?,
        keyword: row.get(2)?,
        url: row.get(3)?,
        description: row.get(4)?,
        click_count: row.get::<_, i64>(5)? as u64,
        health: health_cols(row, 6)?,
        created_at: from_secs(row.get(9)?),
        updated_at: from_secs(row.get(10)?),
    })
}

const EDIT_COLUMNS: &str =
    "id, link_id, user_id, url, description, reason, status, reviewed_by, reviewed_at, created_at";

fn row_to_edit(row: &Row) -> rusqlite::Result<LinkEditRequest> {
    let reviewed_at: Option<i64> = row.get(8)?;
    Ok(LinkEditRequest {
        id: row.get(0)?,
        link_id: row.get(1)?,
        user_id: row.get(2)?,
        url: row.get(3)?,
        description: row.get(4)?,
        reason: row.get(5)?,
        status: enum_col(row, 6, RequestStatus::parse)?,
        reviewed_by: row.get(7)?,
        reviewed_at: reviewed_at.map(from_secs),
        created_at: from_secs(row.get(9)?),
    })
}

const SHARE_COLUMNS: &str = "id, sender_id, recipient_id, keyword, url, description, created_at";

fn row_to_share(row: &Row) -> rusqlite::Result<SharedLink> {
    Ok(SharedLink {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        recipient_id: row.get(2)?,
        keyword: row.get(3)?,
        url: row.get(4)?,
        description: row.get(5)?,
        created_at: from_secs(row.get(6)?),
    })
}

fn fetch_link(conn: &Connection, id: Uuid) -> Result<Option<Link>, CoreError> {
    conn.query_row(
        &format!("SELECT {LINK_COLUMNS} FROM links WHERE id = ?1"),
        params![id],
        row_to_link,
    )
    .optional()
    .map_err(map_sqerr)
}

fn fetch_edit(conn: &Connection, id: Uuid) -> Result<Option<LinkEditRequest>, CoreError> {
    conn.query_row(
        &format!("SELECT {EDIT_COLUMNS} FROM link_edit_requests WHERE id = ?1"),
        params![id],
        row_to_edit,
    )
    .optional()
    .map_err(map_sqerr)
}

fn fetch_user_link(conn: &Connection, id: Uuid) -> Result<Option<UserLink>, CoreError> {
    conn.query_row(
        &format!("SELECT {USER_LINK_COLUMNS} FROM user_links WHERE id = ?1"),
        params![id],
        row_to_user_link,
    )
    .optional()
    .map_err(map_sqerr)
}

/// Run a guarded `UPDATE` and return the row afterwards; zero affected rows
/// means the link is gone or no longer in the expected status.
fn update_link_guarded(
    conn: &Connection,
    id: Uuid,
    sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Link, CoreError> {
    let changed = conn.execute(sql, args).map_err(map_sqerr)?;
    if changed == 0 {
        return Err(CoreError::NotFound);
    }
    fetch_link(conn, id)?.ok_or(CoreError::NotFound)
}

/// Pending edit requests plus pending deletion requests of `user_id`.
fn pending_requests_of(conn: &Connection, user_id: Uuid) -> Result<usize, CoreError> {
    let n: i64 = conn
        .query_row(
            "SELECT (SELECT COUNT(*) FROM link_edit_requests WHERE user_id = ?1 AND status = 'pending') \
                  + (SELECT COUNT(*) FROM links WHERE deletion_requested_by = ?1 \
                                                AND status = 'deletion_pending')",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(map_sqerr)?;
    Ok(n as usize)
}

impl LinkRepository for SqliteRepo {
    fn get_link(&self, id: Uuid) -> Result<Option<Link>, CoreError> {
        let conn = self.conn()?;
        fetch_link(&conn, id)
    }

    fn insert_link(&self, link: Link) -> Result<(), CoreError> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO links({LINK_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
            ),
            params![
                link.id,
                link.keyword,
                link.url,
                link.description,
                link.scope.as_str(),
                link.organization_id,
                link.status.as_str(),
                link.created_by,
                link.submitted_by,
                link.reviewed_by,
                link.reviewed_at.map(to_secs),
                link.deletion_requested_by,
                link.deletion_reason,
                link.click_count as i64,
                link.health.status.as_str(),
                link.health.checked_at.map(to_secs),
                link.health.error,
                to_secs(link.created_at),
                to_secs(link.updated_at),
            ],
        )
        .map_err(|e| map_constraint(e, CoreError::DuplicateKeyword))?;
        Ok(())
    }

    fn update_link_target(
        &self,
        id: Uuid,
        url: &str,
        description: &str,
        reset_health: bool,
        now: SystemTime,
    ) -> Result<Link, CoreError> {
        let conn = self.conn()?;
        update_link_guarded(
            &conn,
            id,
            "UPDATE links SET url = ?1, description = ?2, updated_at = ?3, \
                health_status = CASE WHEN ?4 THEN 'unknown' ELSE health_status END, \
                health_checked_at = CASE WHEN ?4 THEN NULL ELSE health_checked_at END, \
                health_error = CASE WHEN ?4 THEN NULL ELSE health_error END, \
                health_attempted_at = CASE WHEN ?4 THEN NULL ELSE health_attempted_at END \
             WHERE id = ?5",
            params![url, description, to_secs(now), reset_health, id],
        )
    }

    fn approve_link(&self, id: Uuid, reviewer: Uuid, now: SystemTime) -> Result<Link, CoreError> {
        let conn = self.conn()?;
        update_link_guarded(
            &conn,
            id,
            "UPDATE links SET status = 'approved', reviewed_by = ?1, reviewed_at = ?2, updated_at = ?2 \
             WHERE id = ?3 AND status = 'pending'",
            params![reviewer, to_secs(now), id],
        )
    }

    fn reject_link(&self, id: Uuid, reviewer: Uuid, now: SystemTime) -> Result<Link, CoreError> {
        let conn = self.conn()?;
        update_link_guarded(
            &conn,
            id,
            "UPDATE links SET status = 'rejected', reviewed_by = ?1, reviewed_at = ?2, updated_at = ?2 \
             WHERE id = ?3 AND status = 'pending'",
            params![reviewer, to_secs(now), id],
        )
    }

    fn mark_deletion_pending(
        &self,
        id: Uuid,
        requester: Uuid,
        reason: &str,
        now: SystemTime,
    ) -> Result<Link, CoreError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        match fetch_link(&tx, id)? {
            Some(l) if l.status == LinkStatus::Approved => {}
            _ => return Err(CoreError::NotFound),
        }
        if pending_requests_of(&tx, requester)? >= MAX_PENDING_REQUESTS {
            return Err(CoreError::PendingRequestLimit);
        }
        let link = update_link_guarded(
            &tx,
            id,
            "UPDATE links SET status = 'deletion_pending', deletion_requested_by = ?1, \
                deletion_reason = ?2, updated_at = ?3 \
             WHERE id = ?4 AND status = 'approved'",
            params![requester, reason, to_secs(now), id],
        )?;
        tx.commit().map_err(map_sqerr)?;
        Ok(link)
    }

    fn restore_link(&self, id: Uuid, now: SystemTime) -> Result<Link, CoreError> {
        let conn = self.conn()?;
        update_link_guarded(
            &conn,
            id,
            "UPDATE links SET status = 'approved', deletion_requested_by = NULL, \
                deletion_reason = NULL, updated_at = ?1 \
             WHERE id = ?2 AND status = 'deletion_pending'",
            params![to_secs(now), id],
        )
    }

    fn delete_link(&self, id: Uuid, expected: Option<LinkStatus>) -> Result<Link, CoreError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        let link = fetch_link(&tx, id)?.ok_or(CoreError::NotFound)?;
        if expected.is_some_and(|s| s != link.status) {
            return Err(CoreError::NotFound);
        }
        // edit requests go with the link (ON DELETE CASCADE)
        tx.execute("DELETE FROM links WHERE id = ?1", params![id])
            .map_err(map_sqerr)?;
        tx.commit().map_err(map_sqerr)?;
        Ok(link)
    }

    fn list_links(&self, filter: &LinkFilter) -> Result<Vec<Link>, CoreError> {
        let conn = self.conn()?;
        let mut sql = format!("SELECT {LINK_COLUMNS} FROM links WHERE 1 = 1");
        let mut args: Vec<Value> = Vec::new();
        if let Some(status) = filter.status {
            args.push(Value::Text(status.as_str().into()));
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(scope) = filter.scope {
            args.push(Value::Text(scope.as_str().into()));
            sql.push_str(&format!(" AND scope = ?{}", args.len()));
        }
        if let Some(org) = filter.organization_id {
            args.push(Value::Blob(org.as_bytes().to_vec()));
            sql.push_str(&format!(" AND organization_id = ?{}", args.len()));
        }
        if let Some(creator) = filter.created_by {
            args.push(Value::Blob(creator.as_bytes().to_vec()));
            sql.push_str(&format!(" AND created_by = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY keyword, created_at");
        if filter.limit > 0 {
            sql.push_str(&format!(" LIMIT {}", filter.limit));
        }
        let mut stmt = conn.prepare(&sql).map_err(map_sqerr)?;
        let rows = stmt
            .query_map(params_from_iter(args), row_to_link)
            .map_err(map_sqerr)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sqerr)
    }

    fn increment_link_clicks(&self, id: Uuid) -> Result<(), CoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE links SET click_count = click_count + 1 WHERE id = ?1",
                params![id],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }
}

fn insert_user_link_row(conn: &Connection, link: &UserLink) -> Result<(), CoreError> {
    conn.execute(
        &format!(
            "INSERT INTO user_links({USER_LINK_COLUMNS}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            link.id,
            link.user_id,
            link.keyword,
            link.url,
            link.description,
            link.click_count as i64,
            link.health.status.as_str(),
            link.health.checked_at.map(to_secs),
            link.health.error,
            to_secs(link.created_at),
            to_secs(link.updated_at),
        ],
    )
    .map_err(|e| map_constraint(e, CoreError::DuplicateKeyword))?;
    Ok(())
}

impl UserLinkRepository for SqliteRepo {
    fn get_user_link(&self, id: Uuid) -> Result<Option<UserLink>, CoreError> {
        let conn = self.conn()?;
        fetch_user_link(&conn, id)
    }

    fn find_user_link(&self, user_id: Uuid, keyword: &str) -> Result<Option<UserLink>, CoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {USER_LINK_COLUMNS} FROM user_links WHERE user_id = ?1 AND keyword = ?2"),
            params![user_id, keyword],
            row_to_user_link,
        )
        .optional()
        .map_err(map_sqerr)
    }

    fn insert_user_link(&self, link: UserLink) -> Result<(), CoreError> {
        let conn = self.conn()?;
        insert_user_link_row(&conn, &link)
    }

    fn update_user_link(
        &self,
        id: Uuid,
        url: &str,
        description: &str,
        reset_health: bool,
        now: SystemTime,
    ) -> Result<UserLink, CoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE user_links SET url = ?1, description = ?2, updated_at = ?3, \
                    health_status = CASE WHEN ?4 THEN 'unknown' ELSE health_status END, \
                    health_checked_at = CASE WHEN ?4 THEN NULL ELSE health_checked_at END, \
                    health_error = CASE WHEN ?4 THEN NULL ELSE health_error END, \
                    health_attempted_at = CASE WHEN ?4 THEN NULL ELSE health_attempted_at END \
                 WHERE id = ?5",
                params![url, description, to_secs(now), reset_health, id],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            return Err(CoreError::NotFound);
        }
        fetch_user_link(&conn, id)?.ok_or(CoreError::NotFound)
    }

    fn delete_user_link(&self, id: Uuid) -> Result<(), CoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute("DELETE FROM user_links WHERE id = ?1", params![id])
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn list_user_links(&self, user_id: Uuid) -> Result<Vec<UserLink>, CoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {USER_LINK_COLUMNS} FROM user_links WHERE user_id = ?1 ORDER BY keyword"
            ))
            .map_err(map_sqerr)?;
        let rows = stmt
            .query_map(params![user_id], row_to_user_link)
            .map_err(map_sqerr)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sqerr)
    }

    fn increment_user_link_clicks(&self, id: Uuid) -> Result<(), CoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE user_links SET click_count = click_count + 1 WHERE id = ?1",
                params![id],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }
}

impl EditRequestRepository for SqliteRepo {
    fn insert_edit_request(&self, req: LinkEditRequest) -> Result<(), CoreError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        if fetch_link(&tx, req.link_id)?.is_none() {
            return Err(CoreError::NotFound);
        }
        if pending_requests_of(&tx, req.user_id)? >= MAX_PENDING_REQUESTS {
            return Err(CoreError::PendingRequestLimit);
        }
        tx.execute(
            &format!(
                "INSERT INTO link_edit_requests({EDIT_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                req.id,
                req.link_id,
                req.user_id,
                req.url,
                req.description,
                req.reason,
                req.status.as_str(),
                req.reviewed_by,
                req.reviewed_at.map(to_secs),
                to_secs(req.created_at),
            ],
        )
        .map_err(|e| map_constraint(e, CoreError::DuplicateEditRequest))?;
        tx.commit().map_err(map_sqerr)?;
        Ok(())
    }

    fn get_edit_request(&self, id: Uuid) -> Result<Option<LinkEditRequest>, CoreError> {
        let conn = self.conn()?;
        fetch_edit(&conn, id)
    }

    fn list_pending_edit_requests(
        &self,
        scope: ModerationScope,
    ) -> Result<Vec<LinkEditRequest>, CoreError> {
        let conn = self.conn()?;
        let org = match scope {
            ModerationScope::All => None,
            ModerationScope::Organization(org) => Some(org),
        };
        let mut stmt = conn
            .prepare(
                "SELECT r.id, r.link_id, r.user_id, r.url, r.description, r.reason, r.status, \
                        r.reviewed_by, r.reviewed_at, r.created_at \
                 FROM link_edit_requests r JOIN links l ON l.id = r.link_id \
                 WHERE r.status = 'pending' \
                   AND (?1 IS NULL OR (l.scope = 'org' AND l.organization_id = ?1)) \
                 ORDER BY r.created_at",
            )
            .map_err(map_sqerr)?;
        let rows = stmt.query_map(params![org], row_to_edit).map_err(map_sqerr)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sqerr)
    }

    fn approve_edit_request(
        &self,
        id: Uuid,
        reviewer: Uuid,
        now: SystemTime,
    ) -> Result<(LinkEditRequest, Link), CoreError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        let req = match fetch_edit(&tx, id)? {
            Some(r) if r.status == RequestStatus::Pending => r,
            _ => return Err(CoreError::NotFound),
        };
        let link = update_link_guarded(
            &tx,
            req.link_id,
            "UPDATE links SET url = ?1, description = ?2, updated_at = ?3, \
                health_status = 'unknown', health_checked_at = NULL, health_error = NULL, \
                health_attempted_at = NULL \
             WHERE id = ?4",
            params![req.url, req.description, to_secs(now), req.link_id],
        )?;
        tx.execute(
            "UPDATE link_edit_requests SET status = 'approved', reviewed_by = ?1, reviewed_at = ?2 \
             WHERE id = ?3 AND status = 'pending'",
            params![reviewer, to_secs(now), id],
        )
        .map_err(map_sqerr)?;
        let req = fetch_edit(&tx, id)?.ok_or(CoreError::NotFound)?;
        tx.commit().map_err(map_sqerr)?;
        Ok((req, link))
    }

    fn reject_edit_request(
        &self,
        id: Uuid,
        reviewer: Uuid,
        now: SystemTime,
    ) -> Result<LinkEditRequest, CoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE link_edit_requests SET status = 'rejected', reviewed_by = ?1, reviewed_at = ?2 \
                 WHERE id = ?3 AND status = 'pending'",
                params![reviewer, to_secs(now), id],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            return Err(CoreError::NotFound);
        }
        fetch_edit(&conn, id)?.ok_or(CoreError::NotFound)
    }

    fn count_pending_requests(&self, user_id: Uuid) -> Result<usize, CoreError> {
        let conn = self.conn()?;
        pending_requests_of(&conn, user_id)
    }
}

impl ShareRepository for SqliteRepo {
    fn insert_share(&self, share: SharedLink) -> Result<(), CoreError> {
        if share.sender_id == share.recipient_id {
            return Err(CoreError::InvalidInput(
                "cannot share a link with yourself".into(),
            ));
        }
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        let (outgoing, incoming): (i64, i64) = tx
            .query_row(
                "SELECT (SELECT COUNT(*) FROM shared_links WHERE sender_id = ?1), \
                        (SELECT COUNT(*) FROM shared_links WHERE recipient_id = ?2)",
                params![share.sender_id, share.recipient_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(map_sqerr)?;
        if outgoing as usize >= MAX_OUTGOING_SHARES {
            return Err(CoreError::ShareLimitReached);
        }
        if incoming as usize >= MAX_INCOMING_SHARES {
            return Err(CoreError::RecipientLimitReached);
        }
        tx.execute(
            &format!("INSERT INTO shared_links({SHARE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                share.id,
                share.sender_id,
                share.recipient_id,
                share.keyword,
                share.url,
                share.description,
                to_secs(share.created_at),
            ],
        )
        .map_err(|e| map_constraint(e, CoreError::DuplicateShare))?;
        tx.commit().map_err(map_sqerr)?;
        Ok(())
    }

    fn get_share(&self, id: Uuid) -> Result<Option<SharedLink>, CoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {SHARE_COLUMNS} FROM shared_links WHERE id = ?1"),
            params![id],
            row_to_share,
        )
        .optional()
        .map_err(map_sqerr)
    }

    fn list_incoming_shares(&self, recipient_id: Uuid) -> Result<Vec<SharedLink>, CoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SHARE_COLUMNS} FROM shared_links WHERE recipient_id = ?1 \
                 ORDER BY created_at DESC"
            ))
            .map_err(map_sqerr)?;
        let rows = stmt
            .query_map(params![recipient_id], row_to_share)
            .map_err(map_sqerr)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sqerr)
    }

    fn list_outgoing_shares(&self, sender_id: Uuid) -> Result<Vec<SharedLink>, CoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SHARE_COLUMNS} FROM shared_links WHERE sender_id = ?1 \
                 ORDER BY created_at DESC"
            ))
            .map_err(map_sqerr)?;
        let rows = stmt
            .query_map(params![sender_id], row_to_share)
            .map_err(map_sqerr)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sqerr)
    }

    fn accept_share(&self, id: Uuid, link: UserLink) -> Result<UserLink, CoreError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM shared_links WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sqerr)?;
        if exists.is_none() {
            return Err(CoreError::NotFound);
        }
        // a failed insert rolls back and the offer stays
        insert_user_link_row(&tx, &link)?;
        tx.execute("DELETE FROM shared_links WHERE id = ?1", params![id])
            .map_err(map_sqerr)?;
        tx.commit().map_err(map_sqerr)?;
        Ok(link)
    }

    fn delete_share(&self, id: Uuid) -> Result<(), CoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute("DELETE FROM shared_links WHERE id = ?1", params![id])
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{seed_org, seed_user, tmp_db};
    use domain::{HealthRepository, LinkHealth};
    use domain::health::{ProbeOutcome, TargetKind};
    use std::time::{Duration, UNIX_EPOCH};

    fn link(keyword: &str, scope: Scope, org: Option<Uuid>, status: LinkStatus, by: Uuid) -> Link {
        Link {
            id: Uuid::new_v4(),
            keyword: keyword.into(),
            url: format!("https://{keyword}.example.com"),
            description: String::new(),
            scope,
            organization_id: org,
            status,
            created_by: Some(by),
            submitted_by: Some(by),
            reviewed_by: None,
            reviewed_at: None,
            deletion_requested_by: None,
            deletion_reason: None,
            click_count: 0,
            health: LinkHealth::unknown(),
            created_at: UNIX_EPOCH,
            updated_at: UNIX_EPOCH,
        }
    }

    fn edit(link_id: Uuid, user_id: Uuid) -> LinkEditRequest {
        LinkEditRequest {
            id: Uuid::new_v4(),
            link_id,
            user_id,
            url: "https://new.example.com".into(),
            description: "moved".into(),
            reason: "outdated".into(),
            status: RequestStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            created_at: UNIX_EPOCH,
        }
    }

    fn share(sender: Uuid, recipient: Uuid, keyword: &str) -> SharedLink {
        SharedLink {
            id: Uuid::new_v4(),
            sender_id: sender,
            recipient_id: recipient,
            keyword: keyword.into(),
            url: "https://x.example.com".into(),
            description: String::new(),
            created_at: UNIX_EPOCH,
        }
    }

    #[test]
    fn keyword_unique_while_held() {
        let (repo, _dir) = tmp_db();
        let u = seed_user(&repo, "alice", None);
        let acme = seed_org(&repo, "acme");
        repo.insert_link(link("wiki", Scope::Global, None, LinkStatus::Pending, u.id))
            .unwrap();
        assert_eq!(
            repo.insert_link(link("wiki", Scope::Global, None, LinkStatus::Pending, u.id))
                .unwrap_err(),
            CoreError::DuplicateKeyword
        );
        // same keyword in an org scope is independent
        repo.insert_link(link("wiki", Scope::Org, Some(acme.id), LinkStatus::Approved, u.id))
            .unwrap();
        // rejected rows never hold the keyword
        repo.insert_link(link("wiki", Scope::Global, None, LinkStatus::Rejected, u.id))
            .unwrap();
    }

    #[test]
    fn org_scope_requires_org() {
        let (repo, _dir) = tmp_db();
        let u = seed_user(&repo, "alice", None);
        let err = repo
            .insert_link(link("x", Scope::Org, None, LinkStatus::Pending, u.id))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn approve_twice_is_not_found() {
        let (repo, _dir) = tmp_db();
        let u = seed_user(&repo, "alice", None);
        let l = link("docs", Scope::Global, None, LinkStatus::Pending, u.id);
        repo.insert_link(l.clone()).unwrap();
        let approved = repo.approve_link(l.id, u.id, UNIX_EPOCH).unwrap();
        assert_eq!(approved.status, LinkStatus::Approved);
        assert_eq!(approved.reviewed_by, Some(u.id));
        assert_eq!(
            repo.approve_link(l.id, u.id, UNIX_EPOCH).unwrap_err(),
            CoreError::NotFound
        );
        assert_eq!(
            repo.reject_link(l.id, u.id, UNIX_EPOCH).unwrap_err(),
            CoreError::NotFound
        );
    }

    #[test]
    fn deletion_request_round_trip() {
        let (repo, _dir) = tmp_db();
        let u = seed_user(&repo, "alice", None);
        let l = link("docs", Scope::Global, None, LinkStatus::Approved, u.id);
        repo.insert_link(l.clone()).unwrap();
        let marked = repo
            .mark_deletion_pending(l.id, u.id, "gone", UNIX_EPOCH)
            .unwrap();
        assert_eq!(marked.status, LinkStatus::DeletionPending);
        assert_eq!(marked.deletion_reason.as_deref(), Some("gone"));
        assert_eq!(repo.count_pending_requests(u.id).unwrap(), 1);

        let restored = repo.restore_link(l.id, UNIX_EPOCH).unwrap();
        assert_eq!(restored.status, LinkStatus::Approved);
        assert_eq!(restored.deletion_requested_by, None);

        repo.mark_deletion_pending(l.id, u.id, "gone", UNIX_EPOCH)
            .unwrap();
        assert_eq!(
            repo.delete_link(l.id, Some(LinkStatus::Approved)).unwrap_err(),
            CoreError::NotFound
        );
        repo.delete_link(l.id, Some(LinkStatus::DeletionPending))
            .unwrap();
        assert!(repo.get_link(l.id).unwrap().is_none());
    }

    #[test]
    fn edit_request_approval_applies_and_resets_health() {
        let (repo, _dir) = tmp_db();
        let u = seed_user(&repo, "alice", None);
        let m = seed_user(&repo, "mod", None);
        let l = link("docs", Scope::Global, None, LinkStatus::Approved, u.id);
        repo.insert_link(l.clone()).unwrap();
        repo.record_health(
            TargetKind::Link,
            l.id,
            &ProbeOutcome::Reachable { status: 200 }.into_health(UNIX_EPOCH + Duration::from_secs(5)),
            UNIX_EPOCH + Duration::from_secs(5),
        )
        .unwrap();

        let req = edit(l.id, u.id);
        repo.insert_edit_request(req.clone()).unwrap();
        assert_eq!(
            repo.insert_edit_request(edit(l.id, u.id)).unwrap_err(),
            CoreError::DuplicateEditRequest
        );
        assert_eq!(
            repo.list_pending_edit_requests(ModerationScope::All)
                .unwrap()
                .len(),
            1
        );
        assert!(repo
            .list_pending_edit_requests(ModerationScope::Organization(Uuid::new_v4()))
            .unwrap()
            .is_empty());

        let (done, updated) = repo.approve_edit_request(req.id, m.id, UNIX_EPOCH).unwrap();
        assert_eq!(done.status, RequestStatus::Approved);
        assert_eq!(done.reviewed_by, Some(m.id));
        assert_eq!(updated.url, "https://new.example.com");
        assert_eq!(updated.health, LinkHealth::unknown());
        assert_eq!(
            repo.approve_edit_request(req.id, m.id, UNIX_EPOCH).unwrap_err(),
            CoreError::NotFound
        );
        assert_eq!(repo.count_pending_requests(u.id).unwrap(), 0);
    }

    #[test]
    fn pending_quota_counts_edits_and_deletions() {
        let (repo, _dir) = tmp_db();
        let u = seed_user(&repo, "alice", None);
        let mut ids = Vec::new();
        for i in 0..6 {
            let l = link(&format!("k{i}"), Scope::Global, None, LinkStatus::Approved, u.id);
            ids.push(l.id);
            repo.insert_link(l).unwrap();
        }
        repo.mark_deletion_pending(ids[0], u.id, "", UNIX_EPOCH)
            .unwrap();
        for id in &ids[1..5] {
            repo.insert_edit_request(edit(*id, u.id)).unwrap();
        }
        assert_eq!(repo.count_pending_requests(u.id).unwrap(), 5);
        assert_eq!(
            repo.insert_edit_request(edit(ids[5], u.id)).unwrap_err(),
            CoreError::PendingRequestLimit
        );
        assert_eq!(
            repo.mark_deletion_pending(ids[5], u.id, "", UNIX_EPOCH)
                .unwrap_err(),
            CoreError::PendingRequestLimit
        );
    }

    #[test]
    fn share_quotas_and_accept() {
        let (repo, _dir) = tmp_db();
        let alice = seed_user(&repo, "alice", None);
        let bob = seed_user(&repo, "bob", None);
        assert!(matches!(
            repo.insert_share(share(alice.id, alice.id, "x")).unwrap_err(),
            CoreError::InvalidInput(_)
        ));
        let first = share(alice.id, bob.id, "k0");
        repo.insert_share(first.clone()).unwrap();
        assert_eq!(
            repo.insert_share(share(alice.id, bob.id, "k0")).unwrap_err(),
            CoreError::DuplicateShare
        );
        for i in 1..5 {
            repo.insert_share(share(alice.id, bob.id, &format!("k{i}")))
                .unwrap();
        }
        assert_eq!(
            repo.insert_share(share(alice.id, bob.id, "k5")).unwrap_err(),
            CoreError::ShareLimitReached
        );
        let carol = seed_user(&repo, "carol", None);
        assert_eq!(
            repo.insert_share(share(carol.id, bob.id, "c")).unwrap_err(),
            CoreError::RecipientLimitReached
        );

        // a clashing personal link blocks acceptance and keeps the offer
        let clash = UserLink {
            id: Uuid::new_v4(),
            user_id: bob.id,
            keyword: "k0".into(),
            url: "https://mine.example.com".into(),
            description: String::new(),
            click_count: 0,
            health: LinkHealth::unknown(),
            created_at: UNIX_EPOCH,
            updated_at: UNIX_EPOCH,
        };
        repo.insert_user_link(clash.clone()).unwrap();
        let incoming = UserLink {
            id: Uuid::new_v4(),
            ..clash.clone()
        };
        assert_eq!(
            repo.accept_share(first.id, incoming.clone()).unwrap_err(),
            CoreError::DuplicateKeyword
        );
        assert!(repo.get_share(first.id).unwrap().is_some());

        repo.delete_user_link(clash.id).unwrap();
        repo.accept_share(first.id, incoming).unwrap();
        assert!(repo.get_share(first.id).unwrap().is_none());
        assert_eq!(repo.list_user_links(bob.id).unwrap().len(), 1);
        assert_eq!(repo.list_incoming_shares(bob.id).unwrap().len(), 4);
        assert_eq!(repo.list_outgoing_shares(alice.id).unwrap().len(), 4);
    }

    #[test]
    fn list_links_filters() {
        let (repo, _dir) = tmp_db();
        let u = seed_user(&repo, "alice", None);
        let v = seed_user(&repo, "bob", None);
        let acme = seed_org(&repo, "acme");
        repo.insert_link(link("a", Scope::Global, None, LinkStatus::Approved, u.id))
            .unwrap();
        repo.insert_link(link("b", Scope::Global, None, LinkStatus::Pending, v.id))
            .unwrap();
        repo.insert_link(link("c", Scope::Org, Some(acme.id), LinkStatus::Approved, u.id))
            .unwrap();

        let approved = repo
            .list_links(&LinkFilter {
                status: Some(LinkStatus::Approved),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            approved.iter().map(|l| l.keyword.as_str()).collect::<Vec<_>>(),
            vec!["a", "c"]
        );
        let org = repo
            .list_links(&LinkFilter {
                organization_id: Some(acme.id),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(org.len(), 1);
        let mine = repo
            .list_links(&LinkFilter {
                created_by: Some(v.id),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(mine[0].keyword, "b");
        let limited = repo
            .list_links(&LinkFilter {
                limit: 1,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn clicks_increment() {
        let (repo, _dir) = tmp_db();
        let u = seed_user(&repo, "alice", None);
        let l = link("a", Scope::Global, None, LinkStatus::Approved, u.id);
        repo.insert_link(l.clone()).unwrap();
        repo.increment_link_clicks(l.id).unwrap();
        repo.increment_link_clicks(l.id).unwrap();
        assert_eq!(repo.get_link(l.id).unwrap().unwrap().click_count, 2);
        assert_eq!(
            repo.increment_link_clicks(Uuid::new_v4()).unwrap_err(),
            CoreError::NotFound
        );
    }
}
