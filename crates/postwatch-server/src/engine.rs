//! Assembles the monitoring engine over the Postgres store and the HTTP
//! fetch adapter.

use std::sync::Arc;

use postwatch_core::{AppConfig, FetchAdapter, FetchError};
use postwatch_db::PgStore;
use postwatch_fetch::{FetchSettings, HttpFetchAdapter};
use postwatch_monitor::{
    CommentIngestor, CredentialRotator, FanOutWrites, ProfileResolver, Reconciler,
    SiblingFailurePolicy, WorkerDeps,
};
use sqlx::PgPool;

/// The long-lived engine components driven by the scheduler and read by the
/// status endpoint.
pub struct Engine {
    pub reconciler: Arc<Reconciler>,
    pub resolver: Arc<ProfileResolver>,
    pub rotator: Arc<CredentialRotator>,
}

impl Engine {
    /// # Errors
    ///
    /// Returns [`FetchError`] if the fetch adapter cannot be built from the
    /// configured endpoints.
    pub fn build(config: &AppConfig, pool: PgPool) -> Result<Self, FetchError> {
        let store = Arc::new(PgStore::new(pool));
        let settings = FetchSettings::from_app_config(config);
        let fetch: Arc<dyn FetchAdapter> = Arc::new(HttpFetchAdapter::new(&settings)?);

        let rotator = Arc::new(CredentialRotator::new(
            store.clone(),
            store.clone(),
            store.clone(),
        ));

        let writes = if config.ingest_transactional {
            FanOutWrites::Transactional(store.clone())
        } else {
            FanOutWrites::Independent
        };
        let ingestor = Arc::new(CommentIngestor::new(store.clone(), store.clone(), writes));

        let deps = Arc::new(WorkerDeps {
            links: store.clone(),
            fetch: Arc::clone(&fetch),
            rotator: Arc::clone(&rotator),
            ingestor,
            no_credential_delay: config.no_proxy_retry(),
        });

        let policy = if config.resolver_release_early {
            SiblingFailurePolicy::ReleaseEarly
        } else {
            SiblingFailurePolicy::HoldUntilSettled
        };
        let resolver = Arc::new(ProfileResolver::new(
            store,
            fetch,
            Arc::clone(&rotator),
            policy,
        ));

        Ok(Self {
            reconciler: Arc::new(Reconciler::new(deps)),
            resolver,
            rotator,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;

    use postwatch_core::{AppConfig, Environment};
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;

    pub(crate) fn app_config() -> AppConfig {
        AppConfig {
            database_url: "postgres://postwatch@127.0.0.1:1/postwatch".to_string(),
            env: Environment::Test,
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            log_level: "info".to_string(),
            db_max_connections: 1,
            db_min_connections: 0,
            db_acquire_timeout_secs: 1,
            reconcile_interval_secs: 5,
            resolve_interval_secs: 5,
            token_recovery_interval_secs: 3600,
            no_proxy_retry_ms: 0,
            resolver_release_early: true,
            ingest_transactional: false,
            fetch_gateway_url: "http://gateway.local".to_string(),
            graph_api_url: "https://graph.facebook.com/v19.0".to_string(),
            fetch_timeout_secs: 5,
            fetch_user_agent: "postwatch-test".to_string(),
        }
    }

    /// A pool that never connects: nothing listens on port 1.
    pub(crate) fn unreachable_pool() -> PgPool {
        PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(250))
            .connect_lazy(&app_config().database_url)
            .expect("lazy pool from a well-formed url")
    }
}
