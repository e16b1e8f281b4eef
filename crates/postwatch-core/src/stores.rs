//! Persistence interfaces consumed by the monitoring engine.
//!
//! Implemented against Postgres by `postwatch-db`; the engine's tests use
//! in-memory fakes.

use async_trait::async_trait;
use thiserror::Error;

use crate::comments::{Comment, CommentKey};
use crate::credentials::{Cookie, CredentialStatus, Proxy, Token};
use crate::links::{Link, LinkId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid stored value: {0}")]
    InvalidValue(#[from] crate::UnknownVariant),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Links with status `started` and a type other than `dead`.
    async fn find_eligible_for_polling(&self) -> Result<Vec<Link>, StoreError>;

    /// Links with no canonical post id that have not been marked resolved.
    async fn find_eligible_for_resolution(&self) -> Result<Vec<Link>, StoreError>;

    async fn find_by_id(&self, id: LinkId) -> Result<Option<Link>, StoreError>;

    /// Started links sharing `post_id` (the fan-out group).
    async fn find_by_shared_post_id(&self, post_id: &str) -> Result<Vec<Link>, StoreError>;

    /// Persists the given links. Links deleted since they were read are
    /// skipped rather than recreated.
    async fn save_many(&self, links: &[Link]) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn find_by_natural_key(&self, key: &CommentKey) -> Result<Option<Comment>, StoreError>;

    async fn save_many(&self, comments: &[Comment]) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn find_one_active(&self) -> Result<Option<Token>, StoreError>;

    async fn find_all_with_status(
        &self,
        status: CredentialStatus,
    ) -> Result<Vec<Token>, StoreError>;

    async fn save_many(&self, tokens: &[Token]) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CookieStore: Send + Sync {
    async fn find_one_active(&self) -> Result<Option<Cookie>, StoreError>;
}

#[async_trait]
pub trait ProxyStore: Send + Sync {
    async fn find_all_with_status(
        &self,
        status: CredentialStatus,
    ) -> Result<Vec<Proxy>, StoreError>;
}

/// Writes one fan-out group's comments and links in a single transaction.
///
/// Alternative to the default pair of independent batch writes.
#[async_trait]
pub trait FanOutWriter: Send + Sync {
    async fn save_fan_out(&self, comments: &[Comment], links: &[Link]) -> Result<(), StoreError>;
}
