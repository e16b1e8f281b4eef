//! The set of links the reconciler currently wants polled, per link type.
//!
//! Only the reconciler can replace a set (through [`TrackedSet`]); workers
//! and the status endpoint hold read-only [`TrackedSnapshot`]s.

use std::collections::HashMap;
use std::sync::Arc;

use postwatch_core::LinkId;
use tokio::sync::watch;

/// Identifies one spawn of a worker for a link. A link that leaves the set and
/// comes back is given a new generation, which retires the earlier worker.
pub type Generation = u64;

type Members = Arc<HashMap<LinkId, Generation>>;

pub(crate) struct TrackedSet {
    tx: watch::Sender<Members>,
}

impl TrackedSet {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(Members::default());
        Self { tx }
    }

    pub(crate) fn current(&self) -> Members {
        Arc::clone(&self.tx.borrow())
    }

    /// Publishes `members` as the whole new set.
    pub(crate) fn replace(&self, members: HashMap<LinkId, Generation>) {
        self.tx.send_replace(Arc::new(members));
    }

    pub(crate) fn snapshot(&self) -> TrackedSnapshot {
        TrackedSnapshot {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Clone)]
pub struct TrackedSnapshot {
    rx: watch::Receiver<Members>,
}

impl TrackedSnapshot {
    /// True while `link_id` is tracked under exactly `generation`.
    #[must_use]
    pub fn is_current(&self, link_id: LinkId, generation: Generation) -> bool {
        self.rx.borrow().get(&link_id) == Some(&generation)
    }

    #[must_use]
    pub fn contains(&self, link_id: LinkId) -> bool {
        self.rx.borrow().contains_key(&link_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.borrow().is_empty()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<LinkId> {
        let mut ids: Vec<LinkId> = self.rx.borrow().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
