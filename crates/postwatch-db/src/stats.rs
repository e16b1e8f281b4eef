//! Read-only counts logged once at startup.

use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, sqlx::FromRow)]
pub struct StartupCounts {
    pub eligible_links: i64,
    pub unresolved_links: i64,
    pub active_proxies: i64,
    pub active_tokens: i64,
    pub limited_tokens: i64,
    pub active_cookies: i64,
}

/// Counts the records the engine will pick up on its first ticks.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn load_startup_counts(pool: &PgPool) -> Result<StartupCounts, DbError> {
    let counts = sqlx::query_as::<_, StartupCounts>(
        "SELECT \
             (SELECT COUNT(*) FROM links \
                WHERE status = 'started' AND link_type <> 'dead')        AS eligible_links, \
             (SELECT COUNT(*) FROM links \
                WHERE post_id IS NULL AND resolved = false)              AS unresolved_links, \
             (SELECT COUNT(*) FROM proxies WHERE status = 'active')      AS active_proxies, \
             (SELECT COUNT(*) FROM tokens  WHERE status = 'active')      AS active_tokens, \
             (SELECT COUNT(*) FROM tokens  WHERE status = 'limit')       AS limited_tokens, \
             (SELECT COUNT(*) FROM cookies WHERE status = 'active')      AS active_cookies",
    )
    .fetch_one(pool)
    .await?;

    Ok(counts)
}
