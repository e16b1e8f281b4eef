use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so tests can drive it with a
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    // Tick intervals drive repeated jobs; zero would spin the scheduler.
    let parse_interval = |var: &str, default: &str| -> Result<u64, ConfigError> {
        match parse_u64(var, default)? {
            0 => Err(invalid(
                var,
                "interval must be at least 1 second".to_string(),
            )),
            secs => Ok(secs),
        }
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        match or_default(var, default).to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got {other:?}"))),
        }
    };

    let database_url = require("DATABASE_URL")?;
    let fetch_gateway_url = require("POSTWATCH_FETCH_GATEWAY_URL")?;

    let env = parse_environment(&or_default("POSTWATCH_ENV", "development"))?;
    let bind_addr = parse_addr("POSTWATCH_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("POSTWATCH_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("POSTWATCH_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("POSTWATCH_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("POSTWATCH_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let reconcile_interval_secs = parse_interval("POSTWATCH_RECONCILE_INTERVAL_SECS", "5")?;
    let resolve_interval_secs = parse_interval("POSTWATCH_RESOLVE_INTERVAL_SECS", "5")?;
    let token_recovery_interval_secs =
        parse_interval("POSTWATCH_TOKEN_RECOVERY_INTERVAL_SECS", "3600")?;
    let no_proxy_retry_ms = parse_u64("POSTWATCH_NO_PROXY_RETRY_MS", "0")?;
    let resolver_release_early = parse_bool("POSTWATCH_RESOLVER_RELEASE_EARLY", "true")?;
    let ingest_transactional = parse_bool("POSTWATCH_INGEST_TRANSACTIONAL", "false")?;

    let graph_api_url = or_default(
        "POSTWATCH_GRAPH_API_URL",
        "https://graph.facebook.com/v19.0",
    );
    let fetch_timeout_secs = parse_u64("POSTWATCH_FETCH_TIMEOUT_SECS", "30")?;
    let fetch_user_agent = or_default(
        "POSTWATCH_FETCH_USER_AGENT",
        "postwatch/0.1 (comment-monitor)",
    );

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        reconcile_interval_secs,
        resolve_interval_secs,
        token_recovery_interval_secs,
        no_proxy_retry_ms,
        resolver_release_early,
        ingest_transactional,
        fetch_gateway_url,
        graph_api_url,
        fetch_timeout_secs,
        fetch_user_agent,
    })
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "POSTWATCH_ENV".to_string(),
            reason: format!("unknown environment {other:?}"),
        }),
    }
}
