//! Keeps the live worker population in step with link eligibility.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};

use postwatch_core::{Link, LinkType};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::tracked::{Generation, TrackedSet, TrackedSnapshot};
use crate::worker::{StopReason, Worker, WorkerDeps};
use crate::MonitorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub public_tracked: usize,
    pub private_tracked: usize,
    pub spawned: usize,
    /// Ids that left a tracked set this tick. Their workers stop on their own.
    pub withdrawn: usize,
    /// Still-tracked ids whose worker had exited and was started again.
    pub respawned: usize,
    /// The previous tick was still running, so nothing was done.
    pub skipped: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct PartitionDiff {
    tracked: usize,
    spawned: usize,
    withdrawn: usize,
    respawned: usize,
}

pub struct Reconciler {
    deps: Arc<WorkerDeps>,
    public: TrackedSet,
    private: TrackedSet,
    next_generation: AtomicU64,
    live: Arc<AtomicUsize>,
    /// Join handles of spawned workers, keyed by generation.
    workers: std::sync::Mutex<HashMap<Generation, JoinHandle<StopReason>>>,
    tick_lock: Mutex<()>,
}

impl Reconciler {
    #[must_use]
    pub fn new(deps: Arc<WorkerDeps>) -> Self {
        Self {
            deps,
            public: TrackedSet::new(),
            private: TrackedSet::new(),
            next_generation: AtomicU64::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            workers: std::sync::Mutex::new(HashMap::new()),
            tick_lock: Mutex::new(()),
        }
    }

    /// Loads eligible links, replaces each type's tracked set wholesale, and
    /// spawns one worker per newly tracked id.
    ///
    /// A tick that overlaps a still-running tick is skipped. If the store
    /// cannot be read, the previous tracked sets are kept untouched.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Store`] if the eligible links cannot be loaded.
    pub async fn tick(&self) -> Result<TickReport, MonitorError> {
        let Ok(_running) = self.tick_lock.try_lock() else {
            tracing::debug!("reconciler: previous tick still running; skipping");
            return Ok(TickReport {
                skipped: true,
                ..TickReport::default()
            });
        };

        let eligible = self.deps.links.find_eligible_for_polling().await?;

        let mut public = Vec::new();
        let mut private = Vec::new();
        for link in eligible {
            match link.link_type {
                LinkType::Public => public.push(link),
                LinkType::Private => private.push(link),
                LinkType::Unresolved | LinkType::Dead => {}
            }
        }

        let public = self.reconcile(&self.public, public);
        let private = self.reconcile(&self.private, private);

        let report = TickReport {
            public_tracked: public.tracked,
            private_tracked: private.tracked,
            spawned: public.spawned + private.spawned,
            withdrawn: public.withdrawn + private.withdrawn,
            respawned: public.respawned + private.respawned,
            skipped: false,
        };
        if report.spawned > 0 || report.withdrawn > 0 {
            tracing::info!(
                public = report.public_tracked,
                private = report.private_tracked,
                spawned = report.spawned,
                withdrawn = report.withdrawn,
                respawned = report.respawned,
                "reconciler: tracked sets changed"
            );
        }
        Ok(report)
    }

    /// A worker that exits while its id is still tracked under the same
    /// generation did not stop cooperatively (it panicked), so the id gets a
    /// fresh generation and a new worker.
    fn reconcile(&self, set: &TrackedSet, eligible: Vec<Link>) -> PartitionDiff {
        let previous = set.current();
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next: HashMap<_, Generation> = HashMap::with_capacity(eligible.len());
        let mut fresh = Vec::new();
        let mut respawned = 0;

        for link in eligible {
            if next.contains_key(&link.id) {
                continue;
            }
            if let Some(&generation) = previous.get(&link.id) {
                let exited = match workers.get(&generation) {
                    Some(handle) => handle.is_finished(),
                    None => true,
                };
                if !exited {
                    next.insert(link.id, generation);
                    continue;
                }
                tracing::warn!(
                    link_id = link.id,
                    generation,
                    "reconciler: worker exited while still tracked; respawning"
                );
                workers.remove(&generation);
                respawned += 1;
            }
            let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
            next.insert(link.id, generation);
            fresh.push((link, generation));
        }

        let withdrawn: Vec<Generation> = previous
            .iter()
            .filter(|(id, _)| !next.contains_key(*id))
            .map(|(_, &generation)| generation)
            .collect();
        for generation in &withdrawn {
            workers.remove(generation);
        }

        let diff = PartitionDiff {
            tracked: next.len(),
            spawned: fresh.len(),
            withdrawn: withdrawn.len(),
            respawned,
        };

        // Publish before spawning so new workers pass their first liveness check.
        set.replace(next);
        for (link, generation) in fresh {
            let worker = Worker::new(
                link,
                generation,
                set.snapshot(),
                Arc::clone(&self.deps),
                Arc::clone(&self.live),
            );
            workers.insert(generation, tokio::spawn(worker.run()));
        }
        diff
    }

    /// Read-only view of the tracked set for a pollable link type.
    #[must_use]
    pub fn snapshot(&self, link_type: LinkType) -> Option<TrackedSnapshot> {
        match link_type {
            LinkType::Public => Some(self.public.snapshot()),
            LinkType::Private => Some(self.private.snapshot()),
            LinkType::Unresolved | LinkType::Dead => None,
        }
    }

    /// Number of worker tasks that have not yet stopped.
    #[must_use]
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use postwatch_core::{LinkId, LinkStatus};

    use super::*;
    use crate::testing::{link, settle, unresolved, worker_deps, FakeFetch, MemoryStore};

    const RETRY: Duration = Duration::from_secs(1);

    fn reconciler(store: &Arc<MemoryStore>) -> Reconciler {
        let fetch = Arc::new(FakeFetch::default());
        Reconciler::new(worker_deps(store, &fetch, RETRY))
    }

    fn tracked(reconciler: &Reconciler, link_type: LinkType) -> Vec<LinkId> {
        reconciler.snapshot(link_type).unwrap().ids()
    }

    async fn let_workers_notice() {
        tokio::time::advance(RETRY + Duration::from_millis(100)).await;
        settle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_ticks_keep_one_worker_per_link() {
        let store = MemoryStore::with_links([
            link(1, "P", LinkType::Public),
            link(2, "Q", LinkType::Private),
        ]);
        let reconciler = reconciler(&store);

        let first = reconciler.tick().await.unwrap();
        assert_eq!(first.spawned, 2);
        settle().await;

        for _ in 0..5 {
            let report = reconciler.tick().await.unwrap();
            assert_eq!(report.spawned, 0);
            assert_eq!(report.withdrawn, 0);
            settle().await;
        }
        assert_eq!(reconciler.live_workers(), 2);
        assert_eq!(tracked(&reconciler, LinkType::Public), vec![1]);
        assert_eq!(tracked(&reconciler, LinkType::Private), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_link_is_withdrawn_and_its_worker_stops() {
        let store = MemoryStore::with_links([link(1, "P", LinkType::Public)]);
        let reconciler = reconciler(&store);
        reconciler.tick().await.unwrap();
        settle().await;
        assert_eq!(reconciler.live_workers(), 1);

        store.set_status(1, LinkStatus::Pending);
        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.withdrawn, 1);
        assert_eq!(report.spawned, 0);
        assert!(tracked(&reconciler, LinkType::Public).is_empty());

        let_workers_notice().await;
        assert_eq!(reconciler.live_workers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn readded_link_retires_the_earlier_worker() {
        let store = MemoryStore::with_links([link(1, "P", LinkType::Public)]);
        let reconciler = reconciler(&store);
        reconciler.tick().await.unwrap();
        settle().await;

        store.set_status(1, LinkStatus::Pending);
        reconciler.tick().await.unwrap();
        store.set_status(1, LinkStatus::Started);
        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.spawned, 1);
        settle().await;

        let_workers_notice().await;
        assert_eq!(reconciler.live_workers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn only_public_and_private_links_get_workers() {
        let mut dead = link(2, "D", LinkType::Dead);
        dead.status = LinkStatus::Started;
        let store = MemoryStore::with_links([
            link(1, "P", LinkType::Public),
            dead,
            unresolved(3, "https://www.facebook.com/some/post"),
        ]);
        let reconciler = reconciler(&store);

        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.spawned, 1);
        assert_eq!(report.public_tracked, 1);
        assert_eq!(report.private_tracked, 0);
        assert!(reconciler.snapshot(LinkType::Dead).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn store_failure_keeps_the_previous_sets() {
        let store = MemoryStore::with_links([link(1, "P", LinkType::Public)]);
        let reconciler = reconciler(&store);
        reconciler.tick().await.unwrap();
        settle().await;

        store.fail_link_reads.store(true, Ordering::SeqCst);
        assert!(reconciler.tick().await.is_err());
        assert_eq!(tracked(&reconciler, LinkType::Public), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_link_worker_stops_on_its_own() {
        let store = MemoryStore::with_links([link(1, "P", LinkType::Public)]);
        let reconciler = reconciler(&store);
        reconciler.tick().await.unwrap();
        settle().await;

        store.remove_link(1);
        let_workers_notice().await;
        assert_eq!(reconciler.live_workers(), 0);
        assert_eq!(
            tracked(&reconciler, LinkType::Public),
            vec![1],
            "the set only changes on the next tick"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn panicked_worker_is_respawned_on_the_next_tick() {
        let store = MemoryStore::with_links([link(1, "P", LinkType::Public)]);
        let reconciler = reconciler(&store);
        reconciler.tick().await.unwrap();
        settle().await;

        store.panic_link_lookups.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(11)).await;
        settle().await;
        assert_eq!(reconciler.live_workers(), 0);

        store.panic_link_lookups.store(false, Ordering::SeqCst);
        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.respawned, 1);
        assert_eq!(report.spawned, 1);
        assert_eq!(report.withdrawn, 0);
        settle().await;
        assert_eq!(reconciler.live_workers(), 1);

        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.respawned, 0);
        assert_eq!(report.spawned, 0);
    }
}
