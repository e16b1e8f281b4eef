//! Conversion of gateway and Graph API payloads into [`CommentResult`]s.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use postwatch_core::{CommentResult, FetchError};
use regex::Regex;
use serde::de::Error as _;

use crate::types::{GatewayComment, GraphCommentPage};

// Local mobile numbers: 0 or +84 prefix, nine more digits, optional separators.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+84|\b0)(?:[\s.\-]?\d){9}\b").expect("valid phone regex")
});

/// Parses RFC 3339, Graph-style `+0000` offsets, or unix seconds.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(ts.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// First phone number in `message`, digits only (a leading `+` is kept).
#[must_use]
pub fn extract_phone_number(message: &str) -> Option<String> {
    PHONE_RE.find(message).map(|m| {
        m.as_str()
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '+')
            .collect()
    })
}

fn bad_timestamp(context: &str, raw: &str) -> FetchError {
    FetchError::Deserialize {
        context: context.to_string(),
        source: serde_json::Error::custom(format!("unrecognised timestamp {raw:?}")),
    }
}

/// Missing ids become empty strings; the engine discards such results as
/// unusable.
///
/// # Errors
///
/// Returns [`FetchError::Deserialize`] if `created_at` cannot be parsed.
pub fn from_gateway(comment: GatewayComment, context: &str) -> Result<CommentResult, FetchError> {
    let created_at = parse_timestamp(&comment.created_at)
        .ok_or_else(|| bad_timestamp(context, &comment.created_at))?;
    let phone_number = comment
        .phone_number
        .filter(|p| !p.trim().is_empty())
        .or_else(|| comment.message.as_deref().and_then(extract_phone_number));

    Ok(CommentResult {
        external_comment_id: comment.id.unwrap_or_default(),
        message: comment.message,
        phone_number,
        external_author_id: comment.author_id.unwrap_or_default(),
        author_name: comment.author_name,
        created_at,
    })
}

/// Newest comment of a reverse-chronological Graph page.
///
/// # Errors
///
/// Returns [`FetchError::Deserialize`] if `created_time` cannot be parsed.
pub fn from_graph(
    page: GraphCommentPage,
    context: &str,
) -> Result<Option<CommentResult>, FetchError> {
    let Some(newest) = page.data.into_iter().next() else {
        return Ok(None);
    };
    let created_at = parse_timestamp(&newest.created_time)
        .ok_or_else(|| bad_timestamp(context, &newest.created_time))?;
    let (author_id, author_name) = newest.from.map(|a| (a.id, a.name)).unwrap_or_default();

    Ok(Some(CommentResult {
        external_comment_id: newest.id,
        phone_number: newest.message.as_deref().and_then(extract_phone_number),
        message: newest.message,
        external_author_id: author_id,
        author_name,
        created_at,
    }))
}
