//! Resolver and health-scan queries.

use std::time::SystemTime;

use domain::health::{HealthTarget, TargetKind};
use domain::similarity::SIMILARITY_THRESHOLD;
use domain::{
    CoreError, HealthRepository, LinkHealth, LinkSource, Resolution, ResolveRepository,
};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::{enum_col, health_cols, map_sqerr, to_secs, SqliteRepo};

fn row_to_resolution(row: &Row) -> rusqlite::Result<Resolution> {
    Ok(Resolution {
        link_id: row.get(0)?,
        keyword: row.get(1)?,
        url: row.get(2)?,
        source: enum_col(row, 3, LinkSource::parse)?,
    })
}

fn target_kind(raw: &str) -> Option<TargetKind> {
    match raw {
        "link" => Some(TargetKind::Link),
        "personal" => Some(TargetKind::Personal),
        _ => None,
    }
}

fn row_to_target(row: &Row) -> rusqlite::Result<HealthTarget> {
    Ok(HealthTarget {
        kind: enum_col(row, 0, target_kind)?,
        id: row.get(1)?,
        keyword: row.get(2)?,
        url: row.get(3)?,
        health: health_cols(row, 4)?,
    })
}

const TARGET_UNION: &str = "\
    SELECT 'link' AS kind, id, keyword, url, health_status, health_checked_at, health_error, \
           health_attempted_at \
      FROM links WHERE status = 'approved' \
    UNION ALL \
    SELECT 'personal' AS kind, id, keyword, url, health_status, health_checked_at, health_error, \
           health_attempted_at \
      FROM user_links";

impl ResolveRepository for SqliteRepo {
    fn resolve_keyword(
        &self,
        user_id: Option<Uuid>,
        organization_id: Option<Uuid>,
        keyword: &str,
    ) -> Result<Option<Resolution>, CoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, keyword, url, source FROM ( \
                SELECT id, keyword, url, 'personal' AS source, 1 AS priority \
                  FROM user_links WHERE ?1 IS NOT NULL AND user_id = ?1 AND keyword = ?3 \
                UNION ALL \
                SELECT id, keyword, url, 'org', 2 \
                  FROM links WHERE ?2 IS NOT NULL AND scope = 'org' AND organization_id = ?2 \
                               AND keyword = ?3 AND status = 'approved' \
                UNION ALL \
                SELECT id, keyword, url, 'global', 3 \
                  FROM links WHERE scope = 'global' AND keyword = ?3 AND status = 'approved' \
             ) ORDER BY priority LIMIT 1",
            params![user_id, organization_id, keyword],
            row_to_resolution,
        )
        .optional()
        .map_err(map_sqerr)
    }

    fn similar_keywords(
        &self,
        user_id: Option<Uuid>,
        organization_id: Option<Uuid>,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<String>, CoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT keyword, MAX(similarity(keyword, ?3)) AS score FROM ( \
                    SELECT keyword FROM links WHERE status = 'approved' \
                       AND (scope = 'global' OR (?2 IS NOT NULL AND organization_id = ?2)) \
                    UNION ALL \
                    SELECT keyword FROM user_links WHERE ?1 IS NOT NULL AND user_id = ?1 \
                 ) \
                 WHERE keyword <> ?3 \
                 GROUP BY keyword \
                 HAVING score > ?4 \
                 ORDER BY score DESC, keyword \
                 LIMIT ?5",
            )
            .map_err(map_sqerr)?;
        let rows = stmt
            .query_map(
                params![
                    user_id,
                    organization_id,
                    keyword,
                    SIMILARITY_THRESHOLD,
                    limit as i64
                ],
                |row| row.get::<_, String>(0),
            )
            .map_err(map_sqerr)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sqerr)
    }

    fn random_link(&self, organization_id: Option<Uuid>) -> Result<Option<Resolution>, CoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, keyword, url, scope FROM links \
             WHERE status = 'approved' \
               AND (scope = 'global' OR (?1 IS NOT NULL AND organization_id = ?1)) \
             ORDER BY RANDOM() LIMIT 1",
            params![organization_id],
            row_to_resolution,
        )
        .optional()
        .map_err(map_sqerr)
    }
}

impl HealthRepository for SqliteRepo {
    fn list_stale_targets(
        &self,
        cutoff: SystemTime,
        limit: usize,
    ) -> Result<Vec<HealthTarget>, CoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT * FROM ({TARGET_UNION}) \
                 WHERE health_checked_at IS NULL OR health_checked_at < ?1 \
                 ORDER BY health_attempted_at IS NOT NULL, health_attempted_at \
                 LIMIT ?2"
            ))
            .map_err(map_sqerr)?;
        let rows = stmt
            .query_map(params![to_secs(cutoff), limit as i64], row_to_target)
            .map_err(map_sqerr)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sqerr)
    }

    fn get_health_target(&self, id: Uuid) -> Result<Option<HealthTarget>, CoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT 'link', id, keyword, url, health_status, health_checked_at, health_error \
               FROM links WHERE id = ?1 \
             UNION ALL \
             SELECT 'personal', id, keyword, url, health_status, health_checked_at, health_error \
               FROM user_links WHERE id = ?1 \
             LIMIT 1",
            params![id],
            row_to_target,
        )
        .optional()
        .map_err(map_sqerr)
    }

    fn record_health(
        &self,
        kind: TargetKind,
        id: Uuid,
        health: &LinkHealth,
        attempted_at: SystemTime,
    ) -> Result<(), CoreError> {
        let table = match kind {
            TargetKind::Link => "links",
            TargetKind::Personal => "user_links",
        };
        let conn = self.conn()?;
        let changed = conn
            .execute(
                &format!(
                    "UPDATE {table} SET health_status = ?1, health_checked_at = ?2, \
                        health_error = ?3, health_attempted_at = ?4 WHERE id = ?5"
                ),
                params![
                    health.status.as_str(),
                    health.checked_at.map(to_secs),
                    health.error,
                    to_secs(attempted_at),
                    id
                ],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }
}
