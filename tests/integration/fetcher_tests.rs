//! Integration tests for the HTTP fetcher
//!
//! These tests use wiremock to stand in for the community site and check
//! how pages and status codes map onto records and fetch errors.

use std::time::Duration;
use steam_ripple::config::UserAgentConfig;
use steam_ripple::fetcher::{build_http_client, BanKind, FetchError, NodeFetcher, SteamFetcher};
use steam_ripple::NodeId;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OWNER: u64 = 76561197960287930;
const FRIEND_A: u64 = 76561197960265729;
const FRIEND_B: u64 = 76561197960265730;

fn create_test_fetcher(base_url: &str, max_friends: usize) -> SteamFetcher {
    let user_agent = UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    };
    let client = build_http_client(&user_agent, Duration::from_secs(5)).unwrap();
    SteamFetcher::new(client, base_url, max_friends)
}

fn profile_page(level: u32, extra: &str) -> String {
    format!(
        r#"<html><body><div class="profile_page">
            <div class="playerAvatarAutoSizeInner"><img src="https://cdn.example/avatar.jpg"></div>
            <span class="friendPlayerLevelNum">{}</span>
            {}
        </div></body></html>"#,
        level, extra
    )
}

fn friends_page(ids: &[u64]) -> String {
    let links: String = ids
        .iter()
        .map(|id| format!(r#"<a class="selectable_overlay" href="https://steamcommunity.com/profiles/{}"></a>"#, id))
        .collect();
    format!("<html><body>{}</body></html>", links)
}

async fn mount_page(server: &MockServer, route: String, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_profile_with_friends() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        format!("/profiles/{}", OWNER),
        ResponseTemplate::new(200).set_body_string(profile_page(12, "")),
    )
    .await;
    mount_page(
        &server,
        format!("/profiles/{}/friends/", OWNER),
        ResponseTemplate::new(200).set_body_string(friends_page(&[FRIEND_A, FRIEND_B, OWNER])),
    )
    .await;

    let fetcher = create_test_fetcher(&server.uri(), 100);
    let record = fetcher.fetch(NodeId::new(OWNER)).await.unwrap();

    assert_eq!(record.id, NodeId::new(OWNER));
    assert_eq!(record.profile_url, format!("{}/profiles/{}", server.uri(), OWNER));
    assert_eq!(record.level, 12);
    assert_eq!(record.avatar_url.as_deref(), Some("https://cdn.example/avatar.jpg"));
    assert!(!record.is_banned());
    assert_eq!(
        record.neighbors.into_iter().collect::<Vec<_>>(),
        vec![NodeId::new(FRIEND_A), NodeId::new(FRIEND_B)]
    );
}

#[tokio::test]
async fn test_friend_cap_applied() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        format!("/profiles/{}", OWNER),
        ResponseTemplate::new(200).set_body_string(profile_page(1, "")),
    )
    .await;
    mount_page(
        &server,
        format!("/profiles/{}/friends/", OWNER),
        ResponseTemplate::new(200).set_body_string(friends_page(&[FRIEND_A, FRIEND_B])),
    )
    .await;

    let fetcher = create_test_fetcher(&server.uri(), 1);
    let record = fetcher.fetch(NodeId::new(OWNER)).await.unwrap();

    assert_eq!(record.neighbors.len(), 1);
}

#[tokio::test]
async fn test_banned_profile() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        format!("/profiles/{}", OWNER),
        ResponseTemplate::new(200).set_body_string(profile_page(
            3,
            r#"<div class="profile_ban_status">1 game ban on record</div>"#,
        )),
    )
    .await;

    let fetcher = create_test_fetcher(&server.uri(), 100);
    let record = fetcher.fetch(NodeId::new(OWNER)).await.unwrap();

    assert_eq!(record.ban.map(|b| b.kind), Some(BanKind::Game));
}

#[tokio::test]
async fn test_missing_friends_page_gives_no_neighbors() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        format!("/profiles/{}", OWNER),
        ResponseTemplate::new(200).set_body_string(profile_page(5, "")),
    )
    .await;
    mount_page(
        &server,
        format!("/profiles/{}/friends/", OWNER),
        ResponseTemplate::new(403),
    )
    .await;

    let fetcher = create_test_fetcher(&server.uri(), 100);
    let record = fetcher.fetch(NodeId::new(OWNER)).await.unwrap();

    assert!(record.neighbors.is_empty());
}

#[tokio::test]
async fn test_status_codes_map_to_errors() {
    let cases = [
        (404, FetchError::NotFound),
        (429, FetchError::RateLimited),
        (503, FetchError::Transient("HTTP 503".to_string())),
    ];

    for (status, expected) in cases {
        let server = MockServer::start().await;
        mount_page(
            &server,
            format!("/profiles/{}", OWNER),
            ResponseTemplate::new(status),
        )
        .await;

        let fetcher = create_test_fetcher(&server.uri(), 100);
        let result = fetcher.fetch(NodeId::new(OWNER)).await;
        assert_eq!(result.unwrap_err(), expected, "status {}", status);
    }
}

#[tokio::test]
async fn test_friends_page_throttled() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        format!("/profiles/{}", OWNER),
        ResponseTemplate::new(200).set_body_string(profile_page(5, "")),
    )
    .await;
    mount_page(
        &server,
        format!("/profiles/{}/friends/", OWNER),
        ResponseTemplate::new(429),
    )
    .await;

    let fetcher = create_test_fetcher(&server.uri(), 100);
    let result = fetcher.fetch(NodeId::new(OWNER)).await;

    assert_eq!(result.unwrap_err(), FetchError::RateLimited);
}

#[tokio::test]
async fn test_private_profile() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        format!("/profiles/{}", OWNER),
        ResponseTemplate::new(200).set_body_string(profile_page(
            0,
            r#"<div class="profile_private_info">This profile is private.</div>"#,
        )),
    )
    .await;

    let fetcher = create_test_fetcher(&server.uri(), 100);
    let result = fetcher.fetch(NodeId::new(OWNER)).await;

    assert_eq!(result.unwrap_err(), FetchError::PrivateOrInaccessible);
}

#[tokio::test]
async fn test_resolve_alias() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/id/gaben".to_string(),
        ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><script>g_rgProfileData = {{"url":"x","steamid":"{}"}};</script></html>"#,
            OWNER
        )),
    )
    .await;
    mount_page(
        &server,
        "/id/ghost".to_string(),
        ResponseTemplate::new(200).set_body_string("<html><body>nothing</body></html>"),
    )
    .await;

    let fetcher = create_test_fetcher(&server.uri(), 100);

    assert_eq!(
        fetcher.resolve_alias("gaben").await.unwrap(),
        NodeId::new(OWNER)
    );
    assert_eq!(
        fetcher.resolve_alias("ghost").await.unwrap_err(),
        FetchError::NotFound
    );
}

#[tokio::test]
async fn test_unreachable_host_is_transient() {
    let fetcher = create_test_fetcher("http://127.0.0.1:9", 100);
    let result = fetcher.fetch(NodeId::new(OWNER)).await;

    assert!(matches!(result, Err(FetchError::Transient(_))));
}
