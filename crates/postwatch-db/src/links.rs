//! Database operations for the `links` table.

use chrono::{DateTime, Utc};
use postwatch_core::{Link, LinkId, UnknownVariant};
use sqlx::{PgExecutor, PgPool};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `links` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LinkRow {
    pub id: i64,
    pub owner_id: i64,
    pub raw_url: String,
    pub name: Option<String>,
    pub post_id: Option<String>,
    pub post_id_v1: Option<String>,
    pub link_type: String,
    pub status: String,
    pub resolved: bool,
    pub delay_secs: i32,
    pub last_comment_time: Option<DateTime<Utc>>,
    pub hidden: bool,
}

impl TryFrom<LinkRow> for Link {
    type Error = UnknownVariant;

    fn try_from(row: LinkRow) -> Result<Self, Self::Error> {
        Ok(Link {
            id: row.id,
            owner_id: row.owner_id,
            raw_url: row.raw_url,
            name: row.name,
            post_id: row.post_id,
            post_id_v1: row.post_id_v1,
            link_type: row.link_type.parse()?,
            status: row.status.parse()?,
            resolved: row.resolved,
            // The column is CHECKed non-negative.
            delay_secs: u32::try_from(row.delay_secs).unwrap_or(0),
            last_comment_time: row.last_comment_time,
            hidden: row.hidden,
        })
    }
}

const LINK_COLUMNS: &str = "id, owner_id, raw_url, name, post_id, post_id_v1, link_type, status, \
                            resolved, delay_secs, last_comment_time, hidden";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Started links of any type except `dead`, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_links_eligible_for_polling(pool: &PgPool) -> Result<Vec<LinkRow>, DbError> {
    let rows = sqlx::query_as::<_, LinkRow>(&format!(
        "SELECT {LINK_COLUMNS} \
         FROM links \
         WHERE status = 'started' AND link_type <> 'dead' \
         ORDER BY id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Links with no canonical post id that were never marked resolved.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_links_eligible_for_resolution(pool: &PgPool) -> Result<Vec<LinkRow>, DbError> {
    let rows = sqlx::query_as::<_, LinkRow>(&format!(
        "SELECT {LINK_COLUMNS} \
         FROM links \
         WHERE post_id IS NULL AND resolved = false \
         ORDER BY id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns a single link by id, or `None` if it has been deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_link(pool: &PgPool, id: LinkId) -> Result<Option<LinkRow>, DbError> {
    let row = sqlx::query_as::<_, LinkRow>(&format!(
        "SELECT {LINK_COLUMNS} FROM links WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Started links sharing `post_id`: the fan-out group of one fetch.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_links_by_post_id(pool: &PgPool, post_id: &str) -> Result<Vec<LinkRow>, DbError> {
    let rows = sqlx::query_as::<_, LinkRow>(&format!(
        "SELECT {LINK_COLUMNS} \
         FROM links \
         WHERE post_id = $1 AND status = 'started' \
         ORDER BY id"
    ))
    .bind(post_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Writes the engine-owned columns of `links` in one statement.
///
/// Only identity fields, the resolved flag and `last_comment_time` are
/// written. `status`, `hidden` and `delay_secs` belong to administrators and
/// are never overwritten from a possibly stale read. Rows deleted since they
/// were read match nothing and are skipped.
///
/// Returns the number of rows updated.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the statement fails.
pub async fn update_links<'e, E>(executor: E, links: &[Link]) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    if links.is_empty() {
        return Ok(0);
    }

    let mut ids: Vec<i64> = Vec::with_capacity(links.len());
    let mut names: Vec<Option<String>> = Vec::with_capacity(links.len());
    let mut post_ids: Vec<Option<String>> = Vec::with_capacity(links.len());
    let mut post_ids_v1: Vec<Option<String>> = Vec::with_capacity(links.len());
    let mut link_types: Vec<String> = Vec::with_capacity(links.len());
    let mut resolved: Vec<bool> = Vec::with_capacity(links.len());
    let mut last_comment_times: Vec<Option<DateTime<Utc>>> = Vec::with_capacity(links.len());

    for link in links {
        ids.push(link.id);
        names.push(link.name.clone());
        post_ids.push(link.post_id.clone());
        post_ids_v1.push(link.post_id_v1.clone());
        link_types.push(link.link_type.as_str().to_string());
        resolved.push(link.resolved);
        last_comment_times.push(link.last_comment_time);
    }

    let result = sqlx::query(
        "UPDATE links AS l SET \
             name              = u.name, \
             post_id           = u.post_id, \
             post_id_v1        = u.post_id_v1, \
             link_type         = u.link_type, \
             resolved          = u.resolved, \
             last_comment_time = u.last_comment_time, \
             updated_at        = NOW() \
         FROM UNNEST(\
              $1::bigint[], $2::text[], $3::text[], $4::text[], $5::text[], $6::bool[], \
              $7::timestamptz[]) \
              AS u(id, name, post_id, post_id_v1, link_type, resolved, last_comment_time) \
         WHERE l.id = u.id",
    )
    .bind(&ids)
    .bind(&names)
    .bind(&post_ids)
    .bind(&post_ids_v1)
    .bind(&link_types)
    .bind(&resolved)
    .bind(&last_comment_times)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}
