//! Comments captured from monitored posts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::links::{Link, LinkId};

/// The newest comment returned by one fetch against the external platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentResult {
    pub external_comment_id: String,
    pub message: Option<String>,
    pub phone_number: Option<String>,
    pub external_author_id: String,
    pub author_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CommentResult {
    /// A fetch result is only worth ingesting when it identifies both the
    /// comment and its author.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.external_comment_id.trim().is_empty() && !self.external_author_id.trim().is_empty()
    }
}

/// Natural key of a stored comment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommentKey {
    pub link_id: LinkId,
    pub external_author_id: String,
    pub external_comment_id: String,
}

/// A comment row as persisted against one link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Database id; `None` for rows not yet inserted.
    pub id: Option<i64>,
    pub external_comment_id: String,
    pub link_id: LinkId,
    pub post_id: String,
    pub owner_id: i64,
    pub external_author_id: String,
    pub author_name: Option<String>,
    pub phone_number: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Builds the row for `link` from a fetched result, merging onto
    /// `existing` when a row with the same natural key is already stored.
    ///
    /// Optional fields the fetch did not report keep their stored values.
    #[must_use]
    pub fn upsert_from(
        existing: Option<Comment>,
        link: &Link,
        post_id: &str,
        fetched: &CommentResult,
    ) -> Comment {
        let (id, author_name, phone_number, message) = match existing {
            Some(stored) => (
                stored.id,
                fetched.author_name.clone().or(stored.author_name),
                fetched.phone_number.clone().or(stored.phone_number),
                fetched.message.clone().or(stored.message),
            ),
            None => (
                None,
                fetched.author_name.clone(),
                fetched.phone_number.clone(),
                fetched.message.clone(),
            ),
        };

        Comment {
            id,
            external_comment_id: fetched.external_comment_id.clone(),
            link_id: link.id,
            post_id: link.post_id.clone().unwrap_or_else(|| post_id.to_string()),
            owner_id: link.owner_id,
            external_author_id: fetched.external_author_id.clone(),
            author_name,
            phone_number,
            message,
            created_at: fetched.created_at,
        }
    }

    #[must_use]
    pub fn key(&self) -> CommentKey {
        CommentKey {
            link_id: self.link_id,
            external_author_id: self.external_author_id.clone(),
            external_comment_id: self.external_comment_id.clone(),
        }
    }
}
