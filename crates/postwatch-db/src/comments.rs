//! Database operations for the `comments` table.

use chrono::{DateTime, Utc};
use postwatch_core::{Comment, CommentKey};
use sqlx::{PgExecutor, PgPool};

use crate::DbError;

/// A row from the `comments` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommentRow {
    pub id: i64,
    pub link_id: i64,
    pub post_id: String,
    pub owner_id: i64,
    pub external_comment_id: String,
    pub external_author_id: String,
    pub author_name: Option<String>,
    pub phone_number: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: Some(row.id),
            external_comment_id: row.external_comment_id,
            link_id: row.link_id,
            post_id: row.post_id,
            owner_id: row.owner_id,
            external_author_id: row.external_author_id,
            author_name: row.author_name,
            phone_number: row.phone_number,
            message: row.message,
            created_at: row.created_at,
        }
    }
}

/// Returns the comment stored under `key`, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_comment_by_key(
    pool: &PgPool,
    key: &CommentKey,
) -> Result<Option<CommentRow>, DbError> {
    let row = sqlx::query_as::<_, CommentRow>(
        "SELECT id, link_id, post_id, owner_id, external_comment_id, external_author_id, \
                author_name, phone_number, message, created_at \
         FROM comments \
         WHERE link_id = $1 AND external_author_id = $2 AND external_comment_id = $3",
    )
    .bind(key.link_id)
    .bind(&key.external_author_id)
    .bind(&key.external_comment_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Upserts a batch of comments keyed by
/// `(link_id, external_author_id, external_comment_id)` in one statement.
///
/// Comments whose link has been deleted are dropped rather than failing the
/// batch on the foreign key. A `NULL` author name, phone number or message
/// keeps the stored value.
///
/// Returns `(inserted, updated)`.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the statement fails.
pub async fn upsert_comments<'e, E>(
    executor: E,
    comments: &[Comment],
) -> Result<(u64, u64), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    if comments.is_empty() {
        return Ok((0, 0));
    }

    let mut link_ids: Vec<i64> = Vec::with_capacity(comments.len());
    let mut post_ids: Vec<String> = Vec::with_capacity(comments.len());
    let mut owner_ids: Vec<i64> = Vec::with_capacity(comments.len());
    let mut comment_ids: Vec<String> = Vec::with_capacity(comments.len());
    let mut author_ids: Vec<String> = Vec::with_capacity(comments.len());
    let mut author_names: Vec<Option<String>> = Vec::with_capacity(comments.len());
    let mut phone_numbers: Vec<Option<String>> = Vec::with_capacity(comments.len());
    let mut messages: Vec<Option<String>> = Vec::with_capacity(comments.len());
    let mut created_ats: Vec<DateTime<Utc>> = Vec::with_capacity(comments.len());

    for c in comments {
        link_ids.push(c.link_id);
        post_ids.push(c.post_id.clone());
        owner_ids.push(c.owner_id);
        comment_ids.push(c.external_comment_id.clone());
        author_ids.push(c.external_author_id.clone());
        author_names.push(c.author_name.clone());
        phone_numbers.push(c.phone_number.clone());
        messages.push(c.message.clone());
        created_ats.push(c.created_at);
    }

    let rows: Vec<bool> = sqlx::query_scalar::<_, bool>(
        "INSERT INTO comments \
             (link_id, post_id, owner_id, external_comment_id, external_author_id, \
              author_name, phone_number, message, created_at) \
         SELECT u.* FROM UNNEST(\
              $1::bigint[], $2::text[], $3::bigint[], $4::text[], $5::text[], \
              $6::text[], $7::text[], $8::text[], $9::timestamptz[]) \
              AS u(link_id, post_id, owner_id, external_comment_id, external_author_id, \
                   author_name, phone_number, message, created_at) \
         WHERE EXISTS (SELECT 1 FROM links l WHERE l.id = u.link_id) \
         ON CONFLICT (link_id, external_author_id, external_comment_id) DO UPDATE SET \
             post_id      = EXCLUDED.post_id, \
             owner_id     = EXCLUDED.owner_id, \
             author_name  = COALESCE(EXCLUDED.author_name, comments.author_name), \
             phone_number = COALESCE(EXCLUDED.phone_number, comments.phone_number), \
             message      = COALESCE(EXCLUDED.message, comments.message), \
             created_at   = EXCLUDED.created_at, \
             updated_at   = NOW() \
         RETURNING (xmax = 0) AS is_new",
    )
    .bind(&link_ids)
    .bind(&post_ids)
    .bind(&owner_ids)
    .bind(&comment_ids)
    .bind(&author_ids)
    .bind(&author_names)
    .bind(&phone_numbers)
    .bind(&messages)
    .bind(&created_ats)
    .fetch_all(executor)
    .await?;

    let inserted = rows.iter().filter(|&&is_new| is_new).count() as u64;
    let updated = rows.len() as u64 - inserted;

    Ok((inserted, updated))
}
