//! Turns raw link URLs into canonical post identities.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use postwatch_core::{FetchAdapter, Link, LinkStore, LinkType, Proxy, ResolvedProfile, Token};

use crate::rotator::CredentialRotator;
use crate::MonitorError;

/// Mutual exclusion between resolution runs.
///
/// Each acquisition is stamped with a fresh epoch. Releasing only clears the
/// guard if it still holds that epoch, so a permit from an earlier run can
/// never free a guard that a later run has since taken.
#[derive(Debug, Default)]
pub struct RunGuard {
    holder: AtomicU64,
    epochs: AtomicU64,
}

impl RunGuard {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.holder.load(Ordering::SeqCst) != 0
    }

    /// Takes the guard, or returns `None` if another run holds it.
    #[must_use]
    pub fn try_acquire(self: &Arc<Self>) -> Option<RunPermit> {
        let epoch = self.epochs.fetch_add(1, Ordering::SeqCst) + 1;
        self.holder
            .compare_exchange(0, epoch, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(RunPermit {
            guard: Arc::clone(self),
            epoch,
            released: AtomicBool::new(false),
        })
    }
}

/// Proof of holding a [`RunGuard`]. Released on drop, or earlier through
/// [`RunPermit::release`].
#[derive(Debug)]
pub struct RunPermit {
    guard: Arc<RunGuard>,
    epoch: u64,
    released: AtomicBool,
}

impl RunPermit {
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            // A newer epoch in the holder means this run was already released.
            let _ = self.guard.holder.compare_exchange(
                self.epoch,
                0,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.release();
    }
}

/// What happens to the run guard when one link in a run cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SiblingFailurePolicy {
    /// Release the guard immediately; siblings keep running. The next tick
    /// may start a new run while they are still in flight.
    #[default]
    ReleaseEarly,
    /// Record the failure and hold the guard until every sibling settles.
    HoldUntilSettled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveReport {
    AlreadyRunning,
    NothingToResolve,
    NoProxy,
    NoToken,
    Completed {
        resolved: usize,
        unresolved: usize,
        failed: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkOutcome {
    Resolved,
    Unresolved,
    Failed,
}

pub struct ProfileResolver {
    links: Arc<dyn LinkStore>,
    fetch: Arc<dyn FetchAdapter>,
    rotator: Arc<CredentialRotator>,
    policy: SiblingFailurePolicy,
    guard: Arc<RunGuard>,
}

impl ProfileResolver {
    pub fn new(
        links: Arc<dyn LinkStore>,
        fetch: Arc<dyn FetchAdapter>,
        rotator: Arc<CredentialRotator>,
        policy: SiblingFailurePolicy,
    ) -> Self {
        Self {
            links,
            fetch,
            rotator,
            policy,
            guard: RunGuard::new(),
        }
    }

    /// True while a resolution run holds the guard.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.guard.is_held()
    }

    /// One resolution tick.
    ///
    /// Returns without taking the guard when a run is in flight, nothing is
    /// unresolved, or no proxy or active token is available. Otherwise every
    /// unresolved link is resolved concurrently with the same proxy and token.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Store`] if the unresolved links or credential
    /// pools cannot be read. Per-link failures are counted, not returned.
    pub async fn run_once(&self) -> Result<ResolveReport, MonitorError> {
        if self.guard.is_held() {
            tracing::debug!("resolver: previous run still in flight; skipping");
            return Ok(ResolveReport::AlreadyRunning);
        }

        let pending = self.links.find_eligible_for_resolution().await?;
        if pending.is_empty() {
            return Ok(ResolveReport::NothingToResolve);
        }
        let Some(proxy) = self.rotator.pick_proxy().await? else {
            tracing::debug!(pending = pending.len(), "resolver: no active proxy");
            return Ok(ResolveReport::NoProxy);
        };
        let Some(token) = self.rotator.pick_token().await? else {
            tracing::debug!(pending = pending.len(), "resolver: no active token");
            return Ok(ResolveReport::NoToken);
        };

        let Some(permit) = self.guard.try_acquire() else {
            return Ok(ResolveReport::AlreadyRunning);
        };

        tracing::info!(count = pending.len(), "resolver: run started");
        let outcomes = join_all(
            pending
                .into_iter()
                .map(|link| self.resolve_link(link, &proxy, &token, &permit)),
        )
        .await;
        drop(permit);

        let count = |wanted: LinkOutcome| outcomes.iter().filter(|o| **o == wanted).count();
        let report = ResolveReport::Completed {
            resolved: count(LinkOutcome::Resolved),
            unresolved: count(LinkOutcome::Unresolved),
            failed: count(LinkOutcome::Failed),
        };
        tracing::info!(?report, "resolver: run finished");
        Ok(report)
    }

    async fn resolve_link(
        &self,
        link: Link,
        proxy: &Proxy,
        token: &Token,
        permit: &RunPermit,
    ) -> LinkOutcome {
        let outcome = self.try_resolve(link, proxy, token).await;
        if outcome != LinkOutcome::Resolved && self.policy == SiblingFailurePolicy::ReleaseEarly {
            if !permit.is_released() {
                tracing::warn!("resolver: releasing run guard early; siblings still in flight");
            }
            permit.release();
        }
        outcome
    }

    async fn try_resolve(&self, link: Link, proxy: &Proxy, token: &Token) -> LinkOutcome {
        let profile = match self
            .fetch
            .resolve_profile(&link.raw_url, proxy, token)
            .await
        {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(link_id = link.id, error = %e, "resolver: profile lookup failed");
                return LinkOutcome::Failed;
            }
        };
        let Some(ResolvedProfile {
            link_type,
            name: fetched_name,
            post_id: Some(post_id),
        }) = profile
        else {
            tracing::warn!(
                link_id = link.id,
                raw_url = %link.raw_url,
                "resolver: no post id returned"
            );
            return LinkOutcome::Unresolved;
        };

        let post_id_v1 = if link_type == LinkType::Private {
            match self.fetch.resolve_alternate_post_id(&link.raw_url).await {
                Ok(alternate) => alternate,
                Err(e) => {
                    tracing::warn!(
                        link_id = link.id,
                        error = %e,
                        "resolver: alternate id lookup failed"
                    );
                    None
                }
            }
        } else {
            None
        };

        let name = match link.name {
            Some(name) if !name.trim().is_empty() => Some(name),
            _ => fetched_name,
        };
        let resolved = Link {
            name,
            link_type,
            post_id: Some(post_id),
            post_id_v1,
            resolved: true,
            ..link
        };

        match self.links.save_many(std::slice::from_ref(&resolved)).await {
            Ok(()) => {
                tracing::info!(
                    link_id = resolved.id,
                    link_type = %resolved.link_type,
                    post_id = resolved.post_id.as_deref().unwrap_or_default(),
                    "resolver: link resolved"
                );
                LinkOutcome::Resolved
            }
            Err(e) => {
                tracing::warn!(
                    link_id = resolved.id,
                    error = %e,
                    "resolver: failed to save resolved link"
                );
                LinkOutcome::Failed
            }
        }
    }
}
