//! Monitored links and the eligibility rules the engine derives from them.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UnknownVariant;

pub type LinkId = i64;

/// What the profile resolver decided a raw URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Unresolved,
    Public,
    Private,
    Dead,
}

impl LinkType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LinkType::Unresolved => "unresolved",
            LinkType::Public => "public",
            LinkType::Private => "private",
            LinkType::Dead => "dead",
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unresolved" => Ok(LinkType::Unresolved),
            "public" => Ok(LinkType::Public),
            "private" => Ok(LinkType::Private),
            "dead" => Ok(LinkType::Dead),
            other => Err(UnknownVariant {
                kind: "link type",
                value: other.to_string(),
            }),
        }
    }
}

/// Administrative monitoring switch. Only `Started` links are polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Started,
    Pending,
}

impl LinkStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LinkStatus::Started => "started",
            LinkStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(LinkStatus::Started),
            "pending" => Ok(LinkStatus::Pending),
            other => Err(UnknownVariant {
                kind: "link status",
                value: other.to_string(),
            }),
        }
    }
}

/// One externally-hosted post tracked for new comments.
///
/// Several links may share the same `post_id`; together they form a fan-out
/// group that is updated as a unit whenever any member is polled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub owner_id: i64,
    pub raw_url: String,
    pub name: Option<String>,
    /// Canonical post identity, `None` until the profile resolver fills it.
    pub post_id: Option<String>,
    /// Alternate identity used by the cookie strategy for private posts.
    pub post_id_v1: Option<String>,
    pub link_type: LinkType,
    pub status: LinkStatus,
    pub resolved: bool,
    pub delay_secs: u32,
    pub last_comment_time: Option<DateTime<Utc>>,
    pub hidden: bool,
}

impl Link {
    /// A link is polled iff it is started and not dead.
    #[must_use]
    pub fn is_eligible_for_polling(&self) -> bool {
        self.status == LinkStatus::Started && self.link_type != LinkType::Dead
    }

    /// A link is handed to the profile resolver iff it has no canonical
    /// identity and has never been marked resolved.
    #[must_use]
    pub fn is_eligible_for_resolution(&self) -> bool {
        self.post_id.is_none() && !self.resolved
    }

    #[must_use]
    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.delay_secs))
    }
}
