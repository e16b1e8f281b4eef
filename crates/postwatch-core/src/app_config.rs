use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub reconcile_interval_secs: u64,
    pub resolve_interval_secs: u64,
    pub token_recovery_interval_secs: u64,
    pub no_proxy_retry_ms: u64,
    pub resolver_release_early: bool,
    pub ingest_transactional: bool,
    pub fetch_gateway_url: String,
    pub graph_api_url: String,
    pub fetch_timeout_secs: u64,
    pub fetch_user_agent: String,
}

impl AppConfig {
    #[must_use]
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    #[must_use]
    pub fn resolve_interval(&self) -> Duration {
        Duration::from_secs(self.resolve_interval_secs)
    }

    #[must_use]
    pub fn token_recovery_interval(&self) -> Duration {
        Duration::from_secs(self.token_recovery_interval_secs)
    }

    #[must_use]
    pub fn no_proxy_retry(&self) -> Duration {
        Duration::from_millis(self.no_proxy_retry_ms)
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("reconcile_interval_secs", &self.reconcile_interval_secs)
            .field("resolve_interval_secs", &self.resolve_interval_secs)
            .field(
                "token_recovery_interval_secs",
                &self.token_recovery_interval_secs,
            )
            .field("no_proxy_retry_ms", &self.no_proxy_retry_ms)
            .field("resolver_release_early", &self.resolver_release_early)
            .field("ingest_transactional", &self.ingest_transactional)
            .field("fetch_gateway_url", &self.fetch_gateway_url)
            .field("graph_api_url", &self.graph_api_url)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("fetch_user_agent", &self.fetch_user_agent)
            .finish()
    }
}
