//! Postgres implementation of the engine's store interfaces.

use async_trait::async_trait;
use postwatch_core::{
    Comment, CommentKey, CommentStore, Cookie, CookieStore, CredentialStatus, FanOutWriter, Link,
    LinkId, LinkStore, Proxy, ProxyStore, StoreError, Token, TokenStore,
};
use sqlx::PgPool;

use crate::{comments, credentials, links, DbError};

/// Every store trait over one connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        StoreError::backend(err)
    }
}

fn sqlx_err(err: sqlx::Error) -> StoreError {
    StoreError::backend(DbError::from(err))
}

fn convert<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = postwatch_core::UnknownVariant>,
{
    rows.into_iter()
        .map(|row| T::try_from(row).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl LinkStore for PgStore {
    async fn find_eligible_for_polling(&self) -> Result<Vec<Link>, StoreError> {
        convert(links::list_links_eligible_for_polling(&self.pool).await?)
    }

    async fn find_eligible_for_resolution(&self) -> Result<Vec<Link>, StoreError> {
        convert(links::list_links_eligible_for_resolution(&self.pool).await?)
    }

    async fn find_by_id(&self, id: LinkId) -> Result<Option<Link>, StoreError> {
        links::get_link(&self.pool, id)
            .await?
            .map(Link::try_from)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn find_by_shared_post_id(&self, post_id: &str) -> Result<Vec<Link>, StoreError> {
        convert(links::list_links_by_post_id(&self.pool, post_id).await?)
    }

    async fn save_many(&self, links: &[Link]) -> Result<(), StoreError> {
        let updated = links::update_links(&self.pool, links)
            .await
            .map_err(sqlx_err)?;
        if updated < links.len() as u64 {
            tracing::debug!(
                requested = links.len(),
                updated,
                "store: some links were deleted before their update"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl CommentStore for PgStore {
    async fn find_by_natural_key(&self, key: &CommentKey) -> Result<Option<Comment>, StoreError> {
        Ok(comments::find_comment_by_key(&self.pool, key)
            .await?
            .map(Comment::from))
    }

    async fn save_many(&self, comments: &[Comment]) -> Result<(), StoreError> {
        comments::upsert_comments(&self.pool, comments)
            .await
            .map_err(sqlx_err)?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn find_one_active(&self) -> Result<Option<Token>, StoreError> {
        credentials::find_first_active_token(&self.pool)
            .await?
            .map(Token::try_from)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn find_all_with_status(
        &self,
        status: CredentialStatus,
    ) -> Result<Vec<Token>, StoreError> {
        convert(credentials::list_tokens_with_status(&self.pool, status).await?)
    }

    async fn save_many(&self, tokens: &[Token]) -> Result<(), StoreError> {
        credentials::update_tokens(&self.pool, tokens)
            .await
            .map_err(sqlx_err)?;
        Ok(())
    }
}

#[async_trait]
impl CookieStore for PgStore {
    async fn find_one_active(&self) -> Result<Option<Cookie>, StoreError> {
        credentials::find_first_active_cookie(&self.pool)
            .await?
            .map(Cookie::try_from)
            .transpose()
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl ProxyStore for PgStore {
    async fn find_all_with_status(
        &self,
        status: CredentialStatus,
    ) -> Result<Vec<Proxy>, StoreError> {
        convert(credentials::list_proxies_with_status(&self.pool, status).await?)
    }
}

#[async_trait]
impl FanOutWriter for PgStore {
    async fn save_fan_out(&self, comments: &[Comment], links: &[Link]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(sqlx_err)?;

        comments::upsert_comments(&mut *tx, comments)
            .await
            .map_err(sqlx_err)?;
        links::update_links(&mut *tx, links)
            .await
            .map_err(sqlx_err)?;

        tx.commit().await.map_err(sqlx_err)?;
        Ok(())
    }
}
