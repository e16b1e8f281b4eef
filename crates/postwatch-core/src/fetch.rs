//! Interface to the external platform that hosts the monitored posts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::comments::CommentResult;
use crate::credentials::{Cookie, Proxy, Token};
use crate::links::LinkType;

/// What a raw URL resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedProfile {
    pub link_type: LinkType,
    pub name: Option<String>,
    pub post_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Network, TLS or timeout failure from the HTTP client.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid proxy {proxy_id}: {reason}")]
    InvalidProxy { proxy_id: i64, reason: String },

    #[error("invalid endpoint URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl FetchError {
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        FetchError::Transport(Box::new(err))
    }
}

/// Calls against the external platform. Every fetch is routed through the
/// proxy chosen by the caller.
///
/// Comment fetches return `Ok(None)` when the post has no comment to report.
#[async_trait]
pub trait FetchAdapter: Send + Sync {
    /// Most recent public comment for a post whose identity has already been
    /// encoded (see `postwatch_monitor::worker::encode_public_post_id`).
    async fn fetch_public_comment(
        &self,
        encoded_post_id: &str,
        proxy: &Proxy,
    ) -> Result<Option<CommentResult>, FetchError>;

    async fn fetch_private_comment_by_cookie(
        &self,
        proxy: &Proxy,
        cookie: &Cookie,
        post_identity: &str,
    ) -> Result<Option<CommentResult>, FetchError>;

    async fn fetch_private_comment_by_token(
        &self,
        post_id: &str,
        proxy: &Proxy,
        token: &Token,
    ) -> Result<Option<CommentResult>, FetchError>;

    async fn resolve_profile(
        &self,
        raw_url: &str,
        proxy: &Proxy,
        token: &Token,
    ) -> Result<Option<ResolvedProfile>, FetchError>;

    /// Alternate identity for a private post, used by the cookie strategy.
    async fn resolve_alternate_post_id(&self, raw_url: &str)
        -> Result<Option<String>, FetchError>;
}
