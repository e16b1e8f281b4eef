//! Database operations for the `proxies`, `tokens` and `cookies` pools.

use postwatch_core::{Cookie, CredentialStatus, Proxy, Token, UnknownVariant};
use sqlx::{PgExecutor, PgPool};

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProxyRow {
    pub id: i64,
    pub address: String,
    pub status: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TokenRow {
    pub id: i64,
    pub value: String,
    pub status: String,
    pub retry_count: i32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CookieRow {
    pub id: i64,
    pub value: String,
    pub status: String,
}

impl TryFrom<ProxyRow> for Proxy {
    type Error = UnknownVariant;

    fn try_from(row: ProxyRow) -> Result<Self, Self::Error> {
        Ok(Proxy {
            id: row.id,
            address: row.address,
            status: row.status.parse()?,
        })
    }
}

impl TryFrom<TokenRow> for Token {
    type Error = UnknownVariant;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        Ok(Token {
            id: row.id,
            value: row.value,
            status: row.status.parse()?,
            retry_count: row.retry_count,
        })
    }
}

impl TryFrom<CookieRow> for Cookie {
    type Error = UnknownVariant;

    fn try_from(row: CookieRow) -> Result<Self, Self::Error> {
        Ok(Cookie {
            id: row.id,
            value: row.value,
            status: row.status.parse()?,
        })
    }
}

/// All proxies in `status`, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_proxies_with_status(
    pool: &PgPool,
    status: CredentialStatus,
) -> Result<Vec<ProxyRow>, DbError> {
    let rows = sqlx::query_as::<_, ProxyRow>(
        "SELECT id, address, status FROM proxies WHERE status = $1 ORDER BY id",
    )
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// All tokens in `status`, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_tokens_with_status(
    pool: &PgPool,
    status: CredentialStatus,
) -> Result<Vec<TokenRow>, DbError> {
    let rows = sqlx::query_as::<_, TokenRow>(
        "SELECT id, value, status, retry_count FROM tokens WHERE status = $1 ORDER BY id",
    )
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// The lowest-id active token.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_first_active_token(pool: &PgPool) -> Result<Option<TokenRow>, DbError> {
    let row = sqlx::query_as::<_, TokenRow>(
        "SELECT id, value, status, retry_count FROM tokens \
         WHERE status = 'active' ORDER BY id LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// The lowest-id active cookie.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_first_active_cookie(pool: &PgPool) -> Result<Option<CookieRow>, DbError> {
    let row = sqlx::query_as::<_, CookieRow>(
        "SELECT id, value, status FROM cookies \
         WHERE status = 'active' ORDER BY id LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Writes status and retry count for each token in one statement.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the statement fails.
pub async fn update_tokens<'e, E>(executor: E, tokens: &[Token]) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    if tokens.is_empty() {
        return Ok(0);
    }

    let ids: Vec<i64> = tokens.iter().map(|t| t.id).collect();
    let statuses: Vec<&str> = tokens.iter().map(|t| t.status.as_str()).collect();
    let retry_counts: Vec<i32> = tokens.iter().map(|t| t.retry_count).collect();

    let result = sqlx::query(
        "UPDATE tokens AS t SET \
             status      = u.status, \
             retry_count = u.retry_count, \
             updated_at  = NOW() \
         FROM UNNEST($1::bigint[], $2::text[], $3::int4[]) AS u(id, status, retry_count) \
         WHERE t.id = u.id",
    )
    .bind(&ids)
    .bind(&statuses)
    .bind(&retry_counts)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}
