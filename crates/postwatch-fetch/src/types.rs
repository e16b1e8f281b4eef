//! Wire types for the comment gateway and the Graph API.

use postwatch_core::LinkType;
use serde::{Deserialize, Serialize};

/// Envelope for every gateway response: `{ "data": ... }`, with `null` when
/// there is nothing to report.
#[derive(Debug, Deserialize)]
pub struct GatewayEnvelope<T> {
    pub data: Option<T>,
}

/// Newest comment on a post as reported by the gateway.
#[derive(Debug, Deserialize)]
pub struct GatewayComment {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct PrivateCommentRequest<'a> {
    pub post_id: &'a str,
    pub cookie: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ProfileRequest<'a> {
    pub url: &'a str,
    pub access_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct GatewayProfile {
    #[serde(rename = "type")]
    pub link_type: LinkType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub post_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GatewayPostId {
    #[serde(default)]
    pub post_id: Option<String>,
}

/// `GET /{post-id}/comments` response.
#[derive(Debug, Deserialize)]
pub struct GraphCommentPage {
    #[serde(default)]
    pub data: Vec<GraphComment>,
}

#[derive(Debug, Deserialize)]
pub struct GraphComment {
    pub id: String,
    #[serde(default)]
    pub message: Option<String>,
    pub created_time: String,
    #[serde(default)]
    pub from: Option<GraphAuthor>,
}

#[derive(Debug, Deserialize)]
pub struct GraphAuthor {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}
