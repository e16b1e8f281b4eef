//! Per-link polling loop.
//!
//! A worker repeats liveness check, proxy pick, fetch, ingest and sleep until
//! it sees that it is no longer wanted. It is never cancelled from outside;
//! the reconciler only withdraws the link from the tracked set and the worker
//! notices at the top of its next pass.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use postwatch_core::{CommentResult, FetchAdapter, Link, LinkId, LinkStore, LinkType, Proxy};

use crate::ingest::CommentIngestor;
use crate::outcome::IterationOutcome;
use crate::rotator::CredentialRotator;
use crate::tracked::{Generation, TrackedSnapshot};
use crate::MonitorError;

/// Collaborators shared by every worker.
pub struct WorkerDeps {
    pub links: Arc<dyn LinkStore>,
    pub fetch: Arc<dyn FetchAdapter>,
    pub rotator: Arc<CredentialRotator>,
    pub ingestor: Arc<CommentIngestor>,
    /// Sleep after a pass that found no active proxy. Zero retries at once.
    pub no_credential_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The link left the tracked set, or was re-tracked under a newer worker.
    Untracked,
    /// The link record no longer exists.
    Deleted,
}

#[derive(Debug)]
enum Step {
    Stop(StopReason),
    Continue(IterationOutcome),
}

/// Identity the public comment endpoint expects: base64 of `feedback:<post id>`.
#[must_use]
pub fn encode_public_post_id(post_id: &str) -> String {
    STANDARD.encode(format!("feedback:{post_id}"))
}

pub struct Worker {
    link: Link,
    generation: Generation,
    tracked: TrackedSnapshot,
    deps: Arc<WorkerDeps>,
    live: Arc<AtomicUsize>,
}

impl Worker {
    pub(crate) fn new(
        link: Link,
        generation: Generation,
        tracked: TrackedSnapshot,
        deps: Arc<WorkerDeps>,
        live: Arc<AtomicUsize>,
    ) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            link,
            generation,
            tracked,
            deps,
            live,
        }
    }

    #[must_use]
    pub fn link_id(&self) -> LinkId {
        self.link.id
    }

    /// Runs until the link is untracked or deleted.
    pub async fn run(mut self) -> StopReason {
        tracing::info!(
            link_id = self.link.id,
            link_type = %self.link.link_type,
            generation = self.generation,
            "worker: started"
        );
        loop {
            match self.iterate().await {
                Step::Stop(reason) => {
                    tracing::info!(link_id = self.link.id, ?reason, "worker: stopped");
                    return reason;
                }
                Step::Continue(outcome) => {
                    let delay =
                        outcome.delay(self.link.poll_delay(), self.deps.no_credential_delay);
                    tracing::trace!(
                        link_id = self.link.id,
                        outcome = outcome.as_str(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "worker: pass complete"
                    );
                    if delay.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    async fn iterate(&mut self) -> Step {
        if !self.tracked.is_current(self.link.id, self.generation) {
            return Step::Stop(StopReason::Untracked);
        }

        match self.deps.links.find_by_id(self.link.id).await {
            Ok(Some(fresh)) => self.link = fresh,
            Ok(None) => return Step::Stop(StopReason::Deleted),
            Err(e) => {
                tracing::warn!(link_id = self.link.id, error = %e, "worker: failed to reload link");
                return Step::Continue(IterationOutcome::TransientError);
            }
        }

        Step::Continue(self.poll_once().await)
    }

    async fn poll_once(&self) -> IterationOutcome {
        let proxy = match self.deps.rotator.pick_proxy().await {
            Ok(Some(proxy)) => proxy,
            Ok(None) => {
                tracing::debug!(link_id = self.link.id, "worker: no active proxy");
                return IterationOutcome::NoCredential;
            }
            Err(e) => {
                tracing::warn!(
                    link_id = self.link.id,
                    error = %e,
                    "worker: proxy pool unavailable"
                );
                return IterationOutcome::TransientError;
            }
        };

        let Some(post_id) = self.link.post_id.as_deref() else {
            tracing::debug!(link_id = self.link.id, "worker: link has no post id yet");
            return IterationOutcome::NoNewData;
        };

        let fetched = match self.link.link_type {
            LinkType::Public => self.fetch_public(post_id, &proxy).await,
            LinkType::Private => self.fetch_private(post_id, &proxy).await,
            LinkType::Unresolved | LinkType::Dead => Ok(None),
        };

        let comment = match fetched {
            Ok(Some(comment)) => comment,
            Ok(None) => return IterationOutcome::NoNewData,
            Err(e) => {
                tracing::warn!(
                    link_id = self.link.id,
                    post_id,
                    error = %e,
                    "worker: crawl comment failed"
                );
                return IterationOutcome::TransientError;
            }
        };

        match self.deps.ingestor.ingest(&comment, post_id).await {
            Ok(report) => {
                tracing::debug!(
                    link_id = self.link.id,
                    post_id,
                    comment_id = %comment.external_comment_id,
                    links = report.links_updated,
                    "worker: comment ingested"
                );
                IterationOutcome::Ingested
            }
            Err(e) => {
                tracing::warn!(
                    link_id = self.link.id,
                    post_id,
                    error = %e,
                    "worker: ingest failed"
                );
                IterationOutcome::TransientError
            }
        }
    }

    async fn fetch_public(
        &self,
        post_id: &str,
        proxy: &Proxy,
    ) -> Result<Option<CommentResult>, MonitorError> {
        let encoded = encode_public_post_id(post_id);
        let fetched = self
            .deps
            .fetch
            .fetch_public_comment(&encoded, proxy)
            .await?;
        Ok(fetched.filter(CommentResult::is_usable))
    }

    /// Tries cookie by alternate id, cookie by canonical id, then token by
    /// canonical id, stopping at the first usable comment. A strategy whose
    /// credential is unavailable is skipped. Errors only surface when no
    /// strategy completed cleanly.
    async fn fetch_private(
        &self,
        post_id: &str,
        proxy: &Proxy,
    ) -> Result<Option<CommentResult>, MonitorError> {
        let mut last_err: Option<MonitorError> = None;
        let mut completed = false;

        match self.deps.rotator.pick_cookie().await {
            Ok(Some(cookie)) => {
                let alternate = self.link.post_id_v1.as_deref();
                for identity in alternate.into_iter().chain([post_id]) {
                    match self
                        .deps
                        .fetch
                        .fetch_private_comment_by_cookie(proxy, &cookie, identity)
                        .await
                    {
                        Ok(Some(c)) if c.is_usable() => return Ok(Some(c)),
                        Ok(_) => completed = true,
                        Err(e) => {
                            tracing::debug!(
                                link_id = self.link.id,
                                identity,
                                error = %e,
                                "worker: cookie fetch failed"
                            );
                            last_err = Some(e.into());
                        }
                    }
                }
            }
            Ok(None) => tracing::debug!(link_id = self.link.id, "worker: no active cookie"),
            Err(e) => last_err = Some(e),
        }

        match self.deps.rotator.pick_token().await {
            Ok(Some(token)) => match self
                .deps
                .fetch
                .fetch_private_comment_by_token(post_id, proxy, &token)
                .await
            {
                Ok(Some(c)) if c.is_usable() => return Ok(Some(c)),
                Ok(_) => completed = true,
                Err(e) => last_err = Some(e.into()),
            },
            Ok(None) => tracing::debug!(link_id = self.link.id, "worker: no active token"),
            Err(e) => last_err = Some(e),
        }

        match last_err {
            Some(e) if !completed => Err(e),
            _ => Ok(None),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
