//! Monitoring and reconciliation engine.
//!
//! Keeps one polling [`Worker`] alive per eligible link, rotates network
//! credentials for their fetches, fans discovered comments out to every link
//! sharing the same post, and resolves raw URLs into post identities.
//!
//! Capacity note: there is no cap on live workers. The population grows
//! linearly with the number of started links, each holding one task and
//! issuing one fetch per delay interval.

pub mod error;
pub mod ingest;
pub mod outcome;
pub mod reconciler;
pub mod resolver;
pub mod rotator;
pub mod tracked;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use error::MonitorError;
pub use ingest::{CommentIngestor, FanOutWrites, IngestReport};
pub use outcome::IterationOutcome;
pub use reconciler::{Reconciler, TickReport};
pub use resolver::{ProfileResolver, ResolveReport, RunGuard, RunPermit, SiblingFailurePolicy};
pub use rotator::CredentialRotator;
pub use tracked::{Generation, TrackedSnapshot};
pub use worker::{encode_public_post_id, StopReason, Worker, WorkerDeps};
