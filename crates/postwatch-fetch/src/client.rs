//! HTTP client for the comment gateway and the Graph API.
//!
//! One `reqwest::Client` is built per proxy address and reused for every
//! request routed through that proxy.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use postwatch_core::{
    AppConfig, CommentResult, Cookie, FetchAdapter, FetchError, Proxy, ResolvedProfile, Token,
};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;

use crate::normalize;
use crate::types::{
    GatewayComment, GatewayEnvelope, GatewayPostId, GatewayProfile, GraphCommentPage,
    PrivateCommentRequest, ProfileRequest,
};

const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub gateway_url: String,
    pub graph_api_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl FetchSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            gateway_url: config.fetch_gateway_url.clone(),
            graph_api_url: config.graph_api_url.clone(),
            timeout_secs: config.fetch_timeout_secs,
            user_agent: config.fetch_user_agent.clone(),
        }
    }
}

pub struct HttpFetchAdapter {
    gateway_url: Url,
    graph_api_url: Url,
    timeout: Duration,
    user_agent: String,
    direct: Client,
    clients: Mutex<HashMap<String, Client>>,
}

impl HttpFetchAdapter {
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] if either base URL does not parse,
    /// or [`FetchError::Transport`] if the HTTP client cannot be built.
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let timeout = Duration::from_secs(settings.timeout_secs);
        let direct = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(FetchError::transport)?;

        Ok(Self {
            gateway_url: parse_base_url(&settings.gateway_url)?,
            graph_api_url: parse_base_url(&settings.graph_api_url)?,
            timeout,
            user_agent: settings.user_agent.clone(),
            direct,
            clients: Mutex::new(HashMap::new()),
        })
    }

    fn client_for(&self, proxy: &Proxy) -> Result<Client, FetchError> {
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(client) = clients.get(&proxy.address) {
            return Ok(client.clone());
        }

        let route = reqwest::Proxy::all(&proxy.address).map_err(|e| FetchError::InvalidProxy {
            proxy_id: proxy.id,
            reason: e.without_url().to_string(),
        })?;
        let client = Client::builder()
            .proxy(route)
            .timeout(self.timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| FetchError::InvalidProxy {
                proxy_id: proxy.id,
                reason: e.without_url().to_string(),
            })?;
        clients.insert(proxy.address.clone(), client.clone());
        tracing::debug!(proxy_id = proxy.id, "fetch: built client for proxy");
        Ok(client)
    }

    fn gateway_endpoint(&self, path: &str) -> Url {
        join(&self.gateway_url, path)
    }

    /// Sends the request and parses a 2xx JSON body. Query strings are left
    /// out of error messages since they may carry access tokens.
    async fn send_json<T: DeserializeOwned>(
        request: RequestBuilder,
        url: &Url,
    ) -> Result<T, FetchError> {
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::transport(e.without_url()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus {
                status: status.as_u16(),
                url: redacted(url),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::transport(e.without_url()))?;
        serde_json::from_str(&body).map_err(|e| FetchError::Deserialize {
            context: redacted(url),
            source: e,
        })
    }

    async fn gateway_comment(
        request: RequestBuilder,
        url: &Url,
    ) -> Result<Option<CommentResult>, FetchError> {
        let envelope: GatewayEnvelope<GatewayComment> = Self::send_json(request, url).await?;
        envelope
            .data
            .map(|c| normalize::from_gateway(c, url.path()))
            .transpose()
    }
}

#[async_trait]
impl FetchAdapter for HttpFetchAdapter {
    async fn fetch_public_comment(
        &self,
        encoded_post_id: &str,
        proxy: &Proxy,
    ) -> Result<Option<CommentResult>, FetchError> {
        let client = self.client_for(proxy)?;
        let mut url = self.gateway_endpoint("v1/comments/public");
        url.query_pairs_mut()
            .append_pair("feedback_id", encoded_post_id);

        Self::gateway_comment(client.get(url.clone()), &url).await
    }

    async fn fetch_private_comment_by_cookie(
        &self,
        proxy: &Proxy,
        cookie: &Cookie,
        post_identity: &str,
    ) -> Result<Option<CommentResult>, FetchError> {
        let client = self.client_for(proxy)?;
        let url = self.gateway_endpoint("v1/comments/private");
        let body = PrivateCommentRequest {
            post_id: post_identity,
            cookie: &cookie.value,
        };

        Self::gateway_comment(client.post(url.clone()).json(&body), &url).await
    }

    async fn fetch_private_comment_by_token(
        &self,
        post_id: &str,
        proxy: &Proxy,
        token: &Token,
    ) -> Result<Option<CommentResult>, FetchError> {
        let client = self.client_for(proxy)?;
        let mut url = self.graph_api_url.clone();
        url.path_segments_mut()
            .map_err(|()| FetchError::InvalidUrl {
                url: self.graph_api_url.to_string(),
                reason: "cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend([post_id, "comments"]);
        url.query_pairs_mut()
            .append_pair("access_token", &token.value)
            .append_pair("order", "reverse_chronological")
            .append_pair("limit", "1")
            .append_pair("fields", "id,message,created_time,from{id,name}");

        let page: GraphCommentPage = Self::send_json(client.get(url.clone()), &url).await?;
        normalize::from_graph(page, url.path())
    }

    async fn resolve_profile(
        &self,
        raw_url: &str,
        proxy: &Proxy,
        token: &Token,
    ) -> Result<Option<ResolvedProfile>, FetchError> {
        let client = self.client_for(proxy)?;
        let url = self.gateway_endpoint("v1/profile");
        let body = ProfileRequest {
            url: raw_url,
            access_token: &token.value,
        };

        let envelope: GatewayEnvelope<GatewayProfile> =
            Self::send_json(client.post(url.clone()).json(&body), &url).await?;
        Ok(envelope.data.map(|p| ResolvedProfile {
            link_type: p.link_type,
            name: p.name.filter(|n| !n.trim().is_empty()),
            post_id: p.post_id.filter(|id| !id.trim().is_empty()),
        }))
    }

    async fn resolve_alternate_post_id(&self, raw_url: &str) -> Result<Option<String>, FetchError> {
        // This lookup is not given a proxy; it goes out directly.
        let mut url = self.gateway_endpoint("v1/post-id");
        url.query_pairs_mut().append_pair("url", raw_url);

        let envelope: GatewayEnvelope<GatewayPostId> =
            Self::send_json(self.direct.get(url.clone()), &url).await?;
        Ok(envelope
            .data
            .and_then(|d| d.post_id)
            .filter(|id| !id.trim().is_empty()))
    }
}

fn parse_base_url(raw: &str) -> Result<Url, FetchError> {
    // Exactly one trailing slash so relative joins append rather than replace.
    let normalised = format!("{}/", raw.trim_end_matches('/'));
    Url::parse(&normalised).map_err(|e| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

fn join(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let joined = format!("{}{}", base.path(), path);
    url.set_path(&joined);
    url
}

fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
