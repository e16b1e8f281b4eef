//! Credential selection for outbound fetches.
//!
//! Pools are re-read on every call; nothing is cached between picks, so admin
//! changes to proxy/token/cookie status apply to the very next fetch.

use std::sync::Arc;

use postwatch_core::{Cookie, CookieStore, CredentialStatus, Proxy, ProxyStore, Token, TokenStore};
use rand::seq::IndexedRandom;

use crate::MonitorError;

pub struct CredentialRotator {
    proxies: Arc<dyn ProxyStore>,
    tokens: Arc<dyn TokenStore>,
    cookies: Arc<dyn CookieStore>,
}

impl CredentialRotator {
    pub fn new(
        proxies: Arc<dyn ProxyStore>,
        tokens: Arc<dyn TokenStore>,
        cookies: Arc<dyn CookieStore>,
    ) -> Self {
        Self {
            proxies,
            tokens,
            cookies,
        }
    }

    /// Picks one active proxy uniformly at random, or `None` if the pool is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Store`] if the proxy pool cannot be read.
    pub async fn pick_proxy(&self) -> Result<Option<Proxy>, MonitorError> {
        let active = self
            .proxies
            .find_all_with_status(CredentialStatus::Active)
            .await?;
        Ok(active.choose(&mut rand::rng()).cloned())
    }

    /// Returns whichever active token the store yields first.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Store`] if the token pool cannot be read.
    pub async fn pick_token(&self) -> Result<Option<Token>, MonitorError> {
        Ok(self.tokens.find_one_active().await?)
    }

    /// Returns whichever active cookie the store yields first.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Store`] if the cookie pool cannot be read.
    pub async fn pick_cookie(&self) -> Result<Option<Cookie>, MonitorError> {
        Ok(self.cookies.find_one_active().await?)
    }

    /// Flips every rate-limited token back to active and bumps its retry
    /// counter. Returns the number of tokens recovered.
    ///
    /// Recovery is unconditional: the job cadence alone sets the cooldown.
    /// Running it twice is harmless because only `limit` tokens are touched.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Store`] if the tokens cannot be read or saved.
    pub async fn recover_limited_tokens(&self) -> Result<usize, MonitorError> {
        let limited = self
            .tokens
            .find_all_with_status(CredentialStatus::Limit)
            .await?;
        if limited.is_empty() {
            return Ok(0);
        }

        let recovered: Vec<Token> = limited.into_iter().map(Token::recovered).collect();
        self.tokens.save_many(&recovered).await?;
        tracing::info!(count = recovered.len(), "rotator: recovered limited tokens");
        Ok(recovered.len())
    }
}
