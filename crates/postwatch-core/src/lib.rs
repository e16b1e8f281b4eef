//! Shared domain types, persistence/fetch interfaces, and configuration for
//! the postwatch comment monitor.

pub mod app_config;
pub mod comments;
pub mod config;
pub mod credentials;
pub mod fetch;
pub mod links;
pub mod stores;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use comments::{Comment, CommentKey, CommentResult};
pub use config::{load_app_config, load_app_config_from_env};
pub use credentials::{Cookie, CredentialStatus, Proxy, Token};
pub use fetch::{FetchAdapter, FetchError, ResolvedProfile};
pub use links::{Link, LinkId, LinkStatus, LinkType};
pub use stores::{
    CommentStore, CookieStore, FanOutWriter, LinkStore, ProxyStore, StoreError, TokenStore,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// Error produced when a stored enum column holds an unknown value.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind} value: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
