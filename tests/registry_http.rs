//! HTTP tests for the registry client against a local mock server

use std::time::Duration;

use fishsync::{ApiError, Category, Error, Permission, RegistryApi, RegistryClient};
use mockito::{Matcher, Server};

fn client(server: &Server, primary_token: &str) -> RegistryClient {
    RegistryClient::new(primary_token)
        .unwrap()
        .with_endpoints(&server.url(), "ws://127.0.0.1:9/stream")
}

#[tokio::test]
async fn request_credential_posts_permissions_with_primary_token() {
    //* Given
    let mut server = Server::new_async().await;
    let token_mock = server
        .mock("POST", "/users/@me/tokens")
        .match_header("authorization", "primary-key")
        .match_body(Matcher::Json(serde_json::json!({
            "permissions": ["domains", "urls"]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"token": "session-abc", "expires": 4102444800}"#)
        .expect(1)
        .create_async()
        .await;

    //* When
    let credential = client(&server, "primary-key")
        .request_credential(&[Permission::Domains, Permission::Urls])
        .await
        .expect("credential request should succeed");

    //* Then
    token_mock.assert_async().await;
    assert_eq!(credential.token, "session-abc");
    assert_eq!(credential.expires_at.timestamp(), 4102444800);
}

#[tokio::test]
async fn request_credential_forbidden_names_permissions() {
    //* Given
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/users/@me/tokens")
        .with_status(403)
        .create_async()
        .await;

    //* When
    let err = client(&server, "primary-key")
        .request_credential(&[Permission::Admin])
        .await
        .unwrap_err();

    //* Then
    match err {
        Error::Api(ApiError::Forbidden(msg)) => {
            assert_eq!(msg, "unauthorized for specified permission(s)")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn request_credential_rejected_primary_token() {
    //* Given
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/users/@me/tokens")
        .with_status(401)
        .create_async()
        .await;

    //* When
    let err = client(&server, "revoked")
        .request_credential(&[Permission::Domains])
        .await
        .unwrap_err();

    //* Then
    assert!(matches!(err, Error::Api(ApiError::Unauthorized)));
}

#[tokio::test]
async fn fetch_domains_requests_full_records_with_session_token() {
    //* Given
    let mut server = Server::new_async().await;
    let domains_mock = server
        .mock("GET", "/domains")
        .match_query(Matcher::UrlEncoded("full".into(), "true".into()))
        .match_header("authorization", "session-abc")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
                {
                    "domain": "fishfish.gg",
                    "category": "safe",
                    "description": "",
                    "added": 1667617118,
                    "checked": 1667617118
                },
                {
                    "domain": "steamcommunnity.ru",
                    "category": "phishing",
                    "description": "fake steam login",
                    "added": 1667617000,
                    "checked": 1667618000,
                    "target": "steamcommunity.com"
                }
            ]"#,
        )
        .expect(1)
        .create_async()
        .await;

    let credential = serde_json::from_str(r#"{"token": "session-abc", "expires": 4102444800}"#)
        .unwrap();

    //* When
    let domains = client(&server, "primary-key")
        .fetch_domains(&credential)
        .await
        .expect("fetch should succeed");

    //* Then
    domains_mock.assert_async().await;
    assert_eq!(domains.len(), 2);
    assert_eq!(domains[0].domain, "fishfish.gg");
    assert_eq!(domains[0].fields.category, Category::Safe);
    assert_eq!(domains[0].fields.target, None);
    assert_eq!(domains[1].fields.category, Category::Phishing);
    assert_eq!(domains[1].fields.checked, 1667618000);
    assert_eq!(
        domains[1].fields.target.as_deref(),
        Some("steamcommunity.com")
    );
}

#[tokio::test]
async fn fetch_urls_decodes_records() {
    //* Given
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/urls")
        .match_query(Matcher::UrlEncoded("full".into(), "true".into()))
        .with_status(200)
        .with_body(
            r#"[{"url": "https://x.com/free-nitro", "category": "malware", "description": "", "added": 1, "checked": 2}]"#,
        )
        .create_async()
        .await;

    let credential = serde_json::from_str(r#"{"token": "s", "expires": 4102444800}"#).unwrap();

    //* When
    let urls = client(&server, "primary-key")
        .fetch_urls(&credential)
        .await
        .unwrap();

    //* Then
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].url, "https://x.com/free-nitro");
    assert_eq!(urls[0].fields.category, Category::Malware);
}

#[tokio::test]
async fn fetch_maps_error_statuses() {
    //* Given
    let mut server = Server::new_async().await;
    let _domains = server
        .mock("GET", "/domains")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_header("retry-after", "7")
        .create_async()
        .await;
    let _urls = server
        .mock("GET", "/urls")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;

    let registry = client(&server, "primary-key");
    let credential = serde_json::from_str(r#"{"token": "s", "expires": 4102444800}"#).unwrap();

    //* When
    let rate_limited = registry.fetch_domains(&credential).await.unwrap_err();
    let unavailable = registry.fetch_urls(&credential).await.unwrap_err();

    //* Then
    assert!(matches!(
        rate_limited,
        Error::Api(ApiError::RateLimit(d)) if d == Duration::from_secs(7)
    ));
    assert!(matches!(
        unavailable,
        Error::Api(ApiError::ServerError(ref msg)) if msg == "maintenance"
    ));
    assert_eq!(unavailable.class(), fishsync::ErrorClass::Transient);
}

#[tokio::test]
async fn fetch_rejects_malformed_body() {
    //* Given
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/domains")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"[{"domain": "x.com", "category": "unknown"}]"#)
        .create_async()
        .await;

    let credential = serde_json::from_str(r#"{"token": "s", "expires": 4102444800}"#).unwrap();

    //* When
    let err = client(&server, "primary-key")
        .fetch_domains(&credential)
        .await
        .unwrap_err();

    //* Then
    assert!(matches!(err, Error::Api(ApiError::InvalidResponse(_))));
}
