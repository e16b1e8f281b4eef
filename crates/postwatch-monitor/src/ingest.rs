//! Fan-out of one fetched comment to every link sharing its post.

use std::sync::Arc;

use postwatch_core::{
    Comment, CommentKey, CommentResult, CommentStore, FanOutWriter, Link, LinkStore,
};

use crate::MonitorError;

/// How the comment and link batches of one fan-out are persisted.
#[derive(Clone)]
pub enum FanOutWrites {
    /// Two independent batch writes issued together. A failure in one does
    /// not roll back or block the other.
    Independent,
    /// Both batches in a single transaction.
    Transactional(Arc<dyn FanOutWriter>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestReport {
    pub links_updated: usize,
    pub comments_inserted: usize,
    pub comments_updated: usize,
}

pub struct CommentIngestor {
    links: Arc<dyn LinkStore>,
    comments: Arc<dyn CommentStore>,
    writes: FanOutWrites,
}

impl CommentIngestor {
    pub fn new(
        links: Arc<dyn LinkStore>,
        comments: Arc<dyn CommentStore>,
        writes: FanOutWrites,
    ) -> Self {
        Self {
            links,
            comments,
            writes,
        }
    }

    /// Upserts `fetched` against every started link whose post id is
    /// `post_id`, and stamps each link's `last_comment_time`.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Store`] if the group or existing comments
    /// cannot be read, or if either batch write fails. With
    /// [`FanOutWrites::Independent`] the other batch is still written.
    pub async fn ingest(
        &self,
        fetched: &CommentResult,
        post_id: &str,
    ) -> Result<IngestReport, MonitorError> {
        let group = self.links.find_by_shared_post_id(post_id).await?;
        if group.is_empty() {
            tracing::debug!(post_id, "ingest: no started links share this post");
            return Ok(IngestReport::default());
        }

        let mut report = IngestReport::default();
        let mut comments = Vec::with_capacity(group.len());
        let mut links = Vec::with_capacity(group.len());

        for link in group {
            let key = CommentKey {
                link_id: link.id,
                external_author_id: fetched.external_author_id.clone(),
                external_comment_id: fetched.external_comment_id.clone(),
            };
            let existing = self.comments.find_by_natural_key(&key).await?;
            if existing.is_some() {
                report.comments_updated += 1;
            } else {
                report.comments_inserted += 1;
            }
            comments.push(Comment::upsert_from(existing, &link, post_id, fetched));
            links.push(Link {
                last_comment_time: Some(fetched.created_at),
                ..link
            });
        }
        report.links_updated = links.len();

        match &self.writes {
            FanOutWrites::Independent => {
                self.write_independently(post_id, &comments, &links).await?;
            }
            FanOutWrites::Transactional(writer) => writer.save_fan_out(&comments, &links).await?,
        }

        tracing::debug!(
            post_id,
            links = report.links_updated,
            inserted = report.comments_inserted,
            updated = report.comments_updated,
            "ingest: fan-out written"
        );
        Ok(report)
    }

    async fn write_independently(
        &self,
        post_id: &str,
        comments: &[Comment],
        links: &[Link],
    ) -> Result<(), MonitorError> {
        let (comment_write, link_write) = tokio::join!(
            self.comments.save_many(comments),
            self.links.save_many(links)
        );

        if let Err(e) = &comment_write {
            tracing::warn!(post_id, error = %e, "ingest: comment batch write failed");
        }
        if let Err(e) = &link_write {
            tracing::warn!(post_id, error = %e, "ingest: link batch write failed");
        }

        comment_write?;
        link_write?;
        Ok(())
    }
}
