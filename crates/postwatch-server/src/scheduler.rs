//! Periodic engine jobs.
//!
//! Three repeated jobs drive the engine: the reconciliation tick, the
//! profile-resolution tick, and token recovery. Each run logs its outcome and
//! never propagates an error, so a failed run only affects that run.

use std::sync::Arc;
use std::time::Duration;

use postwatch_core::AppConfig;
use postwatch_monitor::{CredentialRotator, ProfileResolver, Reconciler, ResolveReport};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::engine::Engine;

/// Builds and starts the job scheduler.
///
/// The returned handle must be kept alive for the lifetime of the process.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, a
/// job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    engine: &Engine,
    config: &AppConfig,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_reconcile_job(
        &scheduler,
        Arc::clone(&engine.reconciler),
        config.reconcile_interval(),
    )
    .await?;
    register_resolve_job(
        &scheduler,
        Arc::clone(&engine.resolver),
        config.resolve_interval(),
    )
    .await?;
    register_token_recovery_job(
        &scheduler,
        Arc::clone(&engine.rotator),
        config.token_recovery_interval(),
    )
    .await?;

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_reconcile_job(
    scheduler: &JobScheduler,
    reconciler: Arc<Reconciler>,
    every: Duration,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_repeated_async(every, move |_uuid, _lock| {
        let reconciler = Arc::clone(&reconciler);
        Box::pin(async move {
            run_reconcile(&reconciler).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(
        interval_secs = every.as_secs(),
        "scheduler: registered reconcile job"
    );
    Ok(())
}

async fn register_resolve_job(
    scheduler: &JobScheduler,
    resolver: Arc<ProfileResolver>,
    every: Duration,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_repeated_async(every, move |_uuid, _lock| {
        let resolver = Arc::clone(&resolver);
        Box::pin(async move {
            run_resolve(&resolver).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(
        interval_secs = every.as_secs(),
        "scheduler: registered resolve job"
    );
    Ok(())
}

async fn register_token_recovery_job(
    scheduler: &JobScheduler,
    rotator: Arc<CredentialRotator>,
    every: Duration,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_repeated_async(every, move |_uuid, _lock| {
        let rotator = Arc::clone(&rotator);
        Box::pin(async move {
            run_token_recovery(&rotator).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(
        interval_secs = every.as_secs(),
        "scheduler: registered token recovery job"
    );
    Ok(())
}

async fn run_reconcile(reconciler: &Reconciler) {
    match reconciler.tick().await {
        Ok(report) if report.skipped => {
            tracing::debug!("scheduler: reconcile tick skipped; previous tick still running");
        }
        Ok(report) => {
            tracing::debug!(
                public = report.public_tracked,
                private = report.private_tracked,
                spawned = report.spawned,
                withdrawn = report.withdrawn,
                "scheduler: reconcile tick complete"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, "scheduler: reconcile tick failed; tracked sets unchanged");
        }
    }
}

async fn run_resolve(resolver: &ProfileResolver) {
    match resolver.run_once().await {
        Ok(ResolveReport::Completed {
            resolved,
            unresolved,
            failed,
        }) => {
            tracing::info!(
                resolved,
                unresolved,
                failed,
                "scheduler: resolution run complete"
            );
        }
        Ok(ResolveReport::NoProxy) => {
            tracing::debug!("scheduler: resolution skipped; no active proxy");
        }
        Ok(ResolveReport::NoToken) => {
            tracing::debug!("scheduler: resolution skipped; no active token");
        }
        Ok(ResolveReport::AlreadyRunning | ResolveReport::NothingToResolve) => {}
        Err(e) => {
            tracing::warn!(error = %e, "scheduler: resolution run failed");
        }
    }
}

async fn run_token_recovery(rotator: &CredentialRotator) {
    match rotator.recover_limited_tokens().await {
        Ok(0) => tracing::debug!("scheduler: no limited tokens to recover"),
        Ok(count) => tracing::info!(count, "scheduler: token recovery complete"),
        Err(e) => tracing::warn!(error = %e, "scheduler: token recovery failed"),
    }
}
