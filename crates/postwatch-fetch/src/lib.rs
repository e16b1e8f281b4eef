//! HTTP implementation of the fetch adapter.
//!
//! Comment fetches and profile resolution go through a comment gateway;
//! token-based private fetches call the Graph API directly. Every request is
//! routed through the proxy the engine picked for it.

pub mod client;
pub mod normalize;
pub mod types;

pub use client::{FetchSettings, HttpFetchAdapter};
