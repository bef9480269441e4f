//! Integration tests for the HTTP side of the crawler
//!
//! These tests use wiremock to create mock HTTP servers and exercise the real
//! fetcher, the robots source and full crawls end-to-end.

use ripple_crawl::config::{Config, CrawlerConfig, OutputConfig, UserAgentConfig};
use ripple_crawl::crawler::{build_http_client, FetchError, Fetcher, HttpFetcher};
use ripple_crawl::output::StopReason;
use ripple_crawl::robots::{HttpRobotsSource, RobotsSource};
use ripple_crawl::sink::{ChannelSink, SqliteOutbox};
use ripple_crawl::Coordinator;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

fn crawler_config() -> CrawlerConfig {
    CrawlerConfig {
        max_depth: 2,
        worker_count: 4,
        per_host_min_interval: 0,
        fetch_timeout: 2_000,
        max_retries: 1,
        backoff_base: 10,
        backoff_cap: 50,
        ..CrawlerConfig::default()
    }
}

fn fetcher() -> HttpFetcher {
    HttpFetcher::from_config(&user_agent()).expect("Failed to build fetcher")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_owned(), "text/html")
}

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_success() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html("<html><body>hi</body></html>"))
        .mount(&mock_server)
        .await;

    let url = Url::parse(&format!("{}/page", mock_server.uri())).unwrap();
    let response = fetcher()
        .fetch(&url, Duration::from_secs(5))
        .await
        .expect("Fetch failed");

    assert_eq!(response.status, 200);
    assert!(response.is_html());
    assert_eq!(response.final_url, url);
    assert_eq!(response.text(), "<html><body>hi</body></html>");
}

#[tokio::test]
async fn test_fetch_error_status_is_not_an_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let url = Url::parse(&format!("{}/missing", mock_server.uri())).unwrap();
    let response = fetcher().fetch(&url, Duration::from_secs(5)).await.unwrap();

    assert_eq!(response.status, 404);
    assert!(!response.is_success());
}

#[tokio::test]
async fn test_fetch_timeout() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("late").set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let url = Url::parse(&format!("{}/slow", mock_server.uri())).unwrap();
    let result = fetcher().fetch(&url, Duration::from_millis(200)).await;

    assert_eq!(result.unwrap_err(), FetchError::Timeout);
}

#[tokio::test]
async fn test_fetch_follows_redirects() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", format!("{}/new", base_url).as_str()),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html("moved"))
        .mount(&mock_server)
        .await;

    let url = Url::parse(&format!("{}/old", base_url)).unwrap();
    let response = fetcher().fetch(&url, Duration::from_secs(5)).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.final_url.path(), "/new");
}

#[tokio::test]
async fn test_fetch_connection_refused() {
    // Nothing listens on port 9 of the loopback interface
    let url = Url::parse("http://127.0.0.1:9/").unwrap();
    let result = fetcher().fetch(&url, Duration::from_secs(5)).await;

    assert!(matches!(result, Err(FetchError::ConnectionFailed(_))));
}

#[tokio::test]
async fn test_robots_source_parses_rules() {
    let mock_server = MockServer::start().await;
    mount_robots(&mock_server, "User-agent: *\nDisallow: /admin\nCrawl-delay: 2").await;

    let client = build_http_client(&user_agent()).unwrap();
    let source = HttpRobotsSource::new(client);
    let url = Url::parse(&format!("{}/anything", mock_server.uri())).unwrap();

    let rules = source.rules(&url).await.expect("Robots fetch failed");
    let admin = format!("{}/admin/panel", mock_server.uri());
    let public = format!("{}/public", mock_server.uri());

    assert!(!rules.is_allowed(&admin, "TestBot"));
    assert!(rules.is_allowed(&public, "TestBot"));
    assert_eq!(rules.crawl_delay("TestBot"), Some(Duration::from_secs(2)));
}

#[tokio::test]
async fn test_robots_source_missing_file_allows_all() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let source = HttpRobotsSource::new(build_http_client(&user_agent()).unwrap());
    let url = Url::parse(&mock_server.uri()).unwrap();

    let rules = source.rules(&url).await.unwrap();
    assert!(rules.is_allowed(&format!("{}/admin", mock_server.uri()), "TestBot"));
}

#[tokio::test]
async fn test_robots_source_server_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let source = HttpRobotsSource::new(build_http_client(&user_agent()).unwrap());
    let url = Url::parse(&mock_server.uri()).unwrap();

    assert!(source.rules(&url).await.is_err());
}

#[tokio::test]
async fn test_full_crawl_single_host() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_robots(&mock_server, "User-agent: *\nAllow: /").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&format!(
            r#"<html><head><title>Home</title></head><body>
            <a href="{}/page1">Page 1</a>
            <a href="/page2">Page 2</a>
            </body></html>"#,
            base_url
        )))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(html(
            r#"<html><head><title>Page 1</title></head><body>Content 1</body></html>"#,
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(html(
            r#"<html><head><title>Page 2</title></head><body>Content 2</body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    let client = build_http_client(&user_agent()).unwrap();
    let (sink, mut rx) = ChannelSink::new(16);
    let mut coordinator = Coordinator::new(
        crawler_config(),
        "TestBot",
        Arc::new(HttpFetcher::new(client.clone())),
        Arc::new(HttpRobotsSource::new(client)),
        Arc::new(sink),
    );

    let summary = coordinator
        .run(&[format!("{}/", base_url)])
        .await
        .expect("Crawl failed");

    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.links_discovered, 2);
    assert_eq!(summary.hosts_seen, 1);
    assert_eq!(summary.stop_reason, StopReason::Completed);

    let mut titles = Vec::new();
    while let Ok(record) = rx.try_recv() {
        titles.extend(record.title);
    }
    titles.sort();
    assert_eq!(titles, vec!["Home", "Page 1", "Page 2"]);
}

#[tokio::test]
async fn test_robots_txt_respect() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_robots(&mock_server, "User-agent: *\nDisallow: /admin").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<a href="/allowed">Allowed Page</a><a href="/admin">Admin Page</a>"#,
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/allowed"))
        .respond_with(html("Allowed content"))
        .mount(&mock_server)
        .await;
    // The admin page must never be requested
    Mock::given(method("GET"))
        .and(path("/admin"))
        .respond_with(html("secret"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = build_http_client(&user_agent()).unwrap();
    let (sink, _rx) = ChannelSink::new(16);
    let mut coordinator = Coordinator::new(
        crawler_config(),
        "TestBot",
        Arc::new(HttpFetcher::new(client.clone())),
        Arc::new(HttpRobotsSource::new(client)),
        Arc::new(sink),
    );

    let summary = coordinator.run(&[format!("{}/", base_url)]).await.unwrap();

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.skipped, 1);
    assert!(summary.skipped_urls[0].url.ends_with("/admin"));
}

#[tokio::test]
async fn test_server_errors_become_dead_urls() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_robots(&mock_server, "").await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = build_http_client(&user_agent()).unwrap();
    let (sink, _rx) = ChannelSink::new(16);
    let mut coordinator = Coordinator::new(
        crawler_config(),
        "TestBot",
        Arc::new(HttpFetcher::new(client.clone())),
        Arc::new(HttpRobotsSource::new(client)),
        Arc::new(sink),
    );

    let summary = coordinator.run(&[format!("{}/", base_url)]).await.unwrap();

    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retries, 1);
    assert_eq!(summary.dead[0].retries, 1);
}

#[tokio::test]
async fn test_crawl_from_config_writes_outbox() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_robots(&mock_server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<title>Root</title><a href="/leaf">leaf</a>"#))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/leaf"))
        .respond_with(html("<title>Leaf</title>"))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let outbox_path = dir.path().join("outbox.db");
    let config = Config {
        crawler: crawler_config(),
        user_agent: user_agent(),
        output: OutputConfig {
            outbox_path: outbox_path.to_string_lossy().into_owned(),
            summary_path: dir.path().join("summary.md").to_string_lossy().into_owned(),
        },
        seeds: vec![format!("{}/", base_url)],
    };

    let mut coordinator =
        Coordinator::from_config(&config, "test-hash").expect("Failed to create coordinator");
    let summary = coordinator.run(&config.seeds).await.expect("Crawl failed");

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.config_hash, "test-hash");
    drop(coordinator);

    let outbox = SqliteOutbox::open(&outbox_path).unwrap();
    assert_eq!(outbox.pending_count().unwrap(), 2);

    let entries = outbox.pending(10).unwrap();
    let root = entries
        .iter()
        .find(|entry| entry.record.title.as_deref() == Some("Root"))
        .expect("root document missing");
    assert_eq!(root.record.link_count, 1);
    assert_eq!(root.record.status, 200);
}
