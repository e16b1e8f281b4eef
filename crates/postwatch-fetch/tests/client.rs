//! Integration tests for `HttpFetchAdapter` using wiremock HTTP mocks.
//!
//! The mock server doubles as the proxy: requests arrive in absolute form and
//! the path and query matchers still apply.

use postwatch_core::{Cookie, CredentialStatus, FetchAdapter, FetchError, LinkType, Proxy, Token};
use postwatch_fetch::{FetchSettings, HttpFetchAdapter};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_adapter(base_url: &str) -> HttpFetchAdapter {
    HttpFetchAdapter::new(&FetchSettings {
        gateway_url: base_url.to_string(),
        graph_api_url: format!("{base_url}/v19.0"),
        timeout_secs: 5,
        user_agent: "postwatch-test".to_string(),
    })
    .expect("adapter construction should not fail")
}

fn proxy_for(server: &MockServer) -> Proxy {
    Proxy {
        id: 1,
        address: server.uri(),
        status: CredentialStatus::Active,
    }
}

fn token() -> Token {
    Token {
        id: 3,
        value: "tok-abc".to_string(),
        status: CredentialStatus::Active,
        retry_count: 0,
    }
}

#[tokio::test]
async fn public_comment_is_parsed() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "data": {
            "id": "c-100",
            "message": "inbox me 0912 345 678",
            "author_id": "u-7",
            "author_name": "Minh",
            "created_at": "2024-05-01T08:30:00Z"
        }
    });

    Mock::given(method("GET"))
        .and(path("/v1/comments/public"))
        .and(query_param("feedback_id", "ZmVlZGJhY2s6MTIz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let adapter = test_adapter(&server.uri());
    let comment = adapter
        .fetch_public_comment("ZmVlZGJhY2s6MTIz", &proxy_for(&server))
        .await
        .expect("should fetch")
        .expect("should have a comment");

    assert_eq!(comment.external_comment_id, "c-100");
    assert_eq!(comment.external_author_id, "u-7");
    assert_eq!(comment.author_name.as_deref(), Some("Minh"));
    assert_eq!(comment.phone_number.as_deref(), Some("0912345678"));
}

#[tokio::test]
async fn null_data_means_no_comment() {
    let server = MockServer::start().await;

    let body = serde_json::json!({ "data": null });
    Mock::given(method("GET"))
        .and(path("/v1/comments/public"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let adapter = test_adapter(&server.uri());
    let result = adapter
        .fetch_public_comment("eA==", &proxy_for(&server))
        .await
        .expect("should fetch");

    assert!(result.is_none());
}

#[tokio::test]
async fn private_comment_posts_the_cookie() {
    let server = MockServer::start().await;

    let expected = serde_json::json!({ "post_id": "555", "cookie": "c_user=1" });
    Mock::given(method("POST"))
        .and(path("/v1/comments/private"))
        .and(body_json(expected))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "id": "c-9",
                "author_id": "u-1",
                "phone_number": "0988000111",
                "created_at": "1714552200"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = test_adapter(&server.uri());
    let cookie = Cookie {
        id: 2,
        value: "c_user=1".to_string(),
        status: CredentialStatus::Active,
    };
    let comment = adapter
        .fetch_private_comment_by_cookie(&proxy_for(&server), &cookie, "555")
        .await
        .expect("should fetch")
        .expect("should have a comment");

    assert_eq!(comment.external_comment_id, "c-9");
    assert_eq!(comment.phone_number.as_deref(), Some("0988000111"));
}

#[tokio::test]
async fn private_comment_by_token_reads_the_graph_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v19.0/555/comments"))
        .and(query_param("access_token", "tok-abc"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{
                "id": "555_1",
                "message": "sdt 0901234567",
                "created_time": "2024-05-01T08:30:00+0000",
                "from": { "id": "42", "name": "Lan" }
            }]
        })))
        .mount(&server)
        .await;

    let adapter = test_adapter(&server.uri());
    let comment = adapter
        .fetch_private_comment_by_token("555", &proxy_for(&server), &token())
        .await
        .expect("should fetch")
        .expect("should have a comment");

    assert_eq!(comment.external_comment_id, "555_1");
    assert_eq!(comment.external_author_id, "42");
    assert_eq!(comment.phone_number.as_deref(), Some("0901234567"));
}

#[tokio::test]
async fn error_status_does_not_leak_the_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v19.0/555/comments"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let adapter = test_adapter(&server.uri());
    let err = adapter
        .fetch_private_comment_by_token("555", &proxy_for(&server), &token())
        .await
        .expect_err("500 should fail");

    match err {
        FetchError::UnexpectedStatus { status, url } => {
            assert_eq!(status, 500);
            assert!(!url.contains("tok-abc"), "url leaked the token: {url}");
        }
        other => panic!("expected UnexpectedStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_is_a_deserialize_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/comments/public"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>blocked</html>"))
        .mount(&server)
        .await;

    let adapter = test_adapter(&server.uri());
    let err = adapter
        .fetch_public_comment("eA==", &proxy_for(&server))
        .await
        .expect_err("html should not parse");

    assert!(matches!(err, FetchError::Deserialize { .. }));
}

#[tokio::test]
async fn profile_resolution_returns_type_and_post_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/profile"))
        .and(body_json(serde_json::json!({
            "url": "https://example.com/posts/1",
            "access_token": "tok-abc"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "type": "private", "name": "  ", "post_id": "987" }
        })))
        .mount(&server)
        .await;

    let adapter = test_adapter(&server.uri());
    let profile = adapter
        .resolve_profile("https://example.com/posts/1", &proxy_for(&server), &token())
        .await
        .expect("should resolve")
        .expect("should have a profile");

    assert_eq!(profile.link_type, LinkType::Private);
    assert_eq!(profile.post_id.as_deref(), Some("987"));
    assert_eq!(profile.name, None, "blank names are dropped");
}

#[tokio::test]
async fn alternate_post_id_lookup() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/post-id"))
        .and(query_param("url", "https://example.com/posts/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "post_id": "123456" }
        })))
        .mount(&server)
        .await;

    let adapter = test_adapter(&server.uri());
    let id = adapter
        .resolve_alternate_post_id("https://example.com/posts/1")
        .await
        .expect("should resolve");

    assert_eq!(id.as_deref(), Some("123456"));
}
