//! End-to-end crawl scenarios against an in-memory web
//!
//! The fetcher double records every request with the (paused) tokio clock, so
//! ordering, spacing and retry behavior can be asserted exactly.

use async_trait::async_trait;
use ripple_crawl::config::CrawlerConfig;
use ripple_crawl::crawler::{FetchError, FetchResponse, Fetcher};
use ripple_crawl::output::StopReason;
use ripple_crawl::robots::{ParsedRobots, StaticRobotsSource};
use ripple_crawl::sink::{ChannelSink, DocumentRecord};
use ripple_crawl::Coordinator;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

/// A canned response
#[derive(Clone)]
enum Page {
    Html(String),
    Binary(&'static str, Vec<u8>),
    Status(u16),
}

/// In-memory web; every request is logged with the time it was made
#[derive(Default)]
struct FakeWeb {
    pages: HashMap<String, Page>,
    requests: parking_lot::Mutex<Vec<(String, Instant)>>,
}

impl FakeWeb {
    fn html(mut self, url: &str, body: &str) -> Self {
        self.pages
            .insert(url.to_string(), Page::Html(body.to_string()));
        self
    }

    fn binary(mut self, url: &str, content_type: &'static str, body: &[u8]) -> Self {
        self.pages
            .insert(url.to_string(), Page::Binary(content_type, body.to_vec()));
        self
    }

    fn status(mut self, url: &str, status: u16) -> Self {
        self.pages.insert(url.to_string(), Page::Status(status));
        self
    }

    fn requested(&self) -> Vec<String> {
        self.requests.lock().iter().map(|(url, _)| url.clone()).collect()
    }

    fn request_times(&self) -> Vec<Instant> {
        self.requests.lock().iter().map(|(_, at)| *at).collect()
    }

    fn count(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|(u, _)| u == url).count()
    }
}

#[async_trait]
impl Fetcher for FakeWeb {
    async fn fetch(&self, url: &Url, _timeout: Duration) -> Result<FetchResponse, FetchError> {
        self.requests
            .lock()
            .push((url.to_string(), Instant::now()));

        let (status, content_type, body) = match self.pages.get(url.as_str()) {
            Some(Page::Html(body)) => (200, "text/html", body.clone().into_bytes()),
            Some(Page::Binary(content_type, body)) => (200, *content_type, body.clone()),
            Some(Page::Status(status)) => (*status, "text/html", Vec::new()),
            None => (404, "text/html", Vec::new()),
        };

        Ok(FetchResponse {
            status,
            final_url: url.clone(),
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body,
        })
    }
}

fn config(worker_count: u32, min_interval_ms: u64) -> CrawlerConfig {
    CrawlerConfig {
        max_depth: 3,
        worker_count,
        per_host_min_interval: min_interval_ms,
        max_retries: 3,
        backoff_base: 100,
        backoff_cap: 1_000,
        ..CrawlerConfig::default()
    }
}

fn coordinator(
    config: CrawlerConfig,
    web: Arc<FakeWeb>,
    robots: StaticRobotsSource,
) -> (Coordinator, mpsc::Receiver<DocumentRecord>) {
    let (sink, rx) = ChannelSink::new(256);
    let coordinator = Coordinator::new(config, "RippleBot", web, Arc::new(robots), Arc::new(sink));
    (coordinator, rx)
}

fn seeds(urls: &[&str]) -> Vec<String> {
    urls.iter().map(|url| url.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_spelling_variants_are_fetched_once() {
    let web = Arc::new(
        FakeWeb::default()
            .html(
                "http://a.test/",
                r#"<a href="/b?y=2&x=1">one</a>
                <a href="HTTP://A.TEST:80/b?x=1&y=2#top">two</a>
                <a href="http://a.test/b?x=1&y=2">three</a>"#,
            )
            .html("http://a.test/b?x=1&y=2", "<p>child</p>"),
    );
    let (mut coordinator, mut rx) = coordinator(config(4, 0), web.clone(), StaticRobotsSource::new());

    let summary = coordinator.run(&seeds(&["http://a.test/"])).await.unwrap();

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.links_discovered, 1);
    assert_eq!(summary.stop_reason, StopReason::Completed);
    assert_eq!(web.count("http://a.test/b?x=1&y=2"), 1);

    let first = rx.recv().await.unwrap();
    assert_eq!(first.url, "http://a.test/");
    assert_eq!(first.link_count, 3);
}

#[tokio::test(start_paused = true)]
async fn test_robots_disallowed_url_is_never_fetched() {
    let web = Arc::new(
        FakeWeb::default()
            .html(
                "http://a.test/",
                r#"<a href="/private/x">hidden</a><a href="/public">open</a>"#,
            )
            .html("http://a.test/private/x", "<p>secret</p>")
            .html("http://a.test/public", "<p>open</p>"),
    );
    let robots = StaticRobotsSource::new().with_rules(
        "a.test",
        ParsedRobots::from_content("User-agent: *\nDisallow: /private\n"),
    );
    let (mut coordinator, _rx) = coordinator(config(2, 0), web.clone(), robots);

    let summary = coordinator.run(&seeds(&["http://a.test/"])).await.unwrap();

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.skipped_urls[0].url, "http://a.test/private/x");
    assert_eq!(web.count("http://a.test/private/x"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_single_worker_dispatches_breadth_first() {
    let web = Arc::new(
        FakeWeb::default()
            .html("http://a.test/", r#"<a href="/a">a</a><a href="/b">b</a>"#)
            .html("http://a.test/a", r#"<a href="/a1">a1</a>"#)
            .html("http://a.test/b", r#"<a href="/b1">b1</a>"#)
            .html("http://a.test/a1", "leaf")
            .html("http://a.test/b1", "leaf too"),
    );
    let (mut coordinator, _rx) = coordinator(config(1, 0), web.clone(), StaticRobotsSource::new());

    let summary = coordinator.run(&seeds(&["http://a.test/"])).await.unwrap();

    assert_eq!(summary.fetched, 5);
    assert_eq!(
        web.requested(),
        vec![
            "http://a.test/",
            "http://a.test/a",
            "http://a.test/b",
            "http://a.test/a1",
            "http://a.test/b1",
        ]
    );
    assert_eq!(summary.depth_breakdown.get(&0), Some(&1));
    assert_eq!(summary.depth_breakdown.get(&1), Some(&2));
    assert_eq!(summary.depth_breakdown.get(&2), Some(&2));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_stop_at_retry_cap() {
    let web = Arc::new(FakeWeb::default().status("http://a.test/flaky", 503));
    let (mut coordinator, mut rx) = coordinator(config(2, 0), web.clone(), StaticRobotsSource::new());

    let summary = coordinator
        .run(&seeds(&["http://a.test/flaky"]))
        .await
        .unwrap();

    // One initial attempt plus three retries
    assert_eq!(web.count("http://a.test/flaky"), 4);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retries, 3);
    assert_eq!(summary.dead.len(), 1);
    assert_eq!(summary.dead[0].retries, 3);
    assert!(rx.try_recv().is_err());

    // Backoff doubles: 100ms, 200ms, 400ms
    let times = web.request_times();
    let gaps: Vec<Duration> = times.windows(2).map(|pair| pair[1] - pair[0]).collect();
    assert!(gaps[0] >= Duration::from_millis(100));
    assert!(gaps[1] >= Duration::from_millis(200));
    assert!(gaps[2] >= Duration::from_millis(400));
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_is_not_retried() {
    let web = Arc::new(FakeWeb::default().status("http://a.test/gone", 410));
    let (mut coordinator, _rx) = coordinator(config(2, 0), web.clone(), StaticRobotsSource::new());

    let summary = coordinator.run(&seeds(&["http://a.test/gone"])).await.unwrap();

    assert_eq!(web.count("http://a.test/gone"), 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_same_host_fetches_are_spaced() {
    let mut web = FakeWeb::default().html(
        "http://a.test/",
        r#"<a href="/1">1</a><a href="/2">2</a><a href="/3">3</a><a href="/4">4</a><a href="/5">5</a>"#,
    );
    for i in 1..=5 {
        web = web.html(&format!("http://a.test/{}", i), &format!("<p>page {}</p>", i));
    }
    let web = Arc::new(web);
    let (mut coordinator, _rx) =
        coordinator(config(4, 1_000), web.clone(), StaticRobotsSource::new());

    let summary = coordinator.run(&seeds(&["http://a.test/"])).await.unwrap();

    assert_eq!(summary.fetched, 6);
    let times = web.request_times();
    assert_eq!(times.len(), 6);
    for pair in times.windows(2) {
        assert!(
            pair[1] - pair[0] >= Duration::from_millis(1_000),
            "fetches {:?} apart",
            pair[1] - pair[0]
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_crawl_delay_overrides_shorter_interval() {
    let web = Arc::new(
        FakeWeb::default()
            .html("http://a.test/", r#"<a href="/next">next</a>"#)
            .html("http://a.test/next", "<p>end</p>"),
    );
    let robots = StaticRobotsSource::new().with_rules(
        "a.test",
        ParsedRobots::from_content("User-agent: RippleBot\nCrawl-delay: 3\n"),
    );
    let (mut coordinator, _rx) = coordinator(config(2, 100), web.clone(), robots);

    coordinator.run(&seeds(&["http://a.test/"])).await.unwrap();

    let times = web.request_times();
    assert_eq!(times.len(), 2);
    assert!(times[1] - times[0] >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_hosts_do_not_wait_for_each_other() {
    let web = Arc::new(
        FakeWeb::default()
            .html("http://a.test/", "<p>a</p>")
            .html("http://b.test/", "<p>b</p>")
            .html("http://c.test/", "<p>c</p>"),
    );
    let (mut coordinator, _rx) =
        coordinator(config(3, 10_000), web.clone(), StaticRobotsSource::new());

    let started = Instant::now();
    let summary = coordinator
        .run(&seeds(&["http://a.test/", "http://b.test/", "http://c.test/"]))
        .await
        .unwrap();

    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.hosts_seen, 3);
    for at in web.request_times() {
        assert!(at - started < Duration::from_secs(1));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_url_dispatched_at_most_once() {
    let hosts = ["a.test", "b.test", "c.test", "d.test"];
    let urls: Vec<String> = hosts
        .iter()
        .flat_map(|host| (0..5).map(move |i| format!("http://{}/{}", host, i)))
        .collect();

    // Every page links to every other page
    let links: String = urls
        .iter()
        .map(|url| format!(r#"<a href="{}">x</a>"#, url))
        .collect();
    let mut web = FakeWeb::default();
    for (i, url) in urls.iter().enumerate() {
        web = web.html(url, &format!("<p>{}</p>{}", i, links));
    }
    let web = Arc::new(web);

    let (mut coordinator, _rx) = coordinator(config(8, 0), web.clone(), StaticRobotsSource::new());
    let seed_refs: Vec<&str> = urls.iter().take(4).map(String::as_str).collect();

    let summary = coordinator.run(&seeds(&seed_refs)).await.unwrap();

    assert_eq!(summary.fetched, urls.len() as u64);
    assert_eq!(summary.duplicate_content, 0);
    for url in &urls {
        assert_eq!(web.count(url), 1, "{} fetched more than once", url);
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_drains_and_reports() {
    let mut web = FakeWeb::default();
    let mut index = String::new();
    for i in 0..20 {
        index.push_str(&format!(r#"<a href="/{}">{}</a>"#, i, i));
        web = web.html(&format!("http://a.test/{}", i), "<p>slow host</p>");
    }
    let web = Arc::new(web.html("http://a.test/", &index));
    let (mut coordinator, _rx) =
        coordinator(config(2, 1_000), web.clone(), StaticRobotsSource::new());

    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        cancel.cancel();
    });

    let summary = coordinator.run(&seeds(&["http://a.test/"])).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::Cancelled);
    assert!(summary.fetched < 21);
    assert_eq!(summary.fetched + summary.abandoned, 21);
    assert_eq!(web.requested().len() as u64, summary.fetched);
}

#[tokio::test(start_paused = true)]
async fn test_binary_document_keeps_its_bytes() {
    let web = Arc::new(
        FakeWeb::default()
            .html("http://a.test/", r#"<a href="/report.pdf">report</a>"#)
            .binary("http://a.test/report.pdf", "application/pdf", b"%PDF-1.4 payload"),
    );
    let (mut coordinator, mut rx) = coordinator(config(2, 0), web.clone(), StaticRobotsSource::new());

    let summary = coordinator.run(&seeds(&["http://a.test/"])).await.unwrap();
    assert_eq!(summary.fetched, 2);

    let mut records = Vec::new();
    while let Ok(record) = rx.try_recv() {
        records.push(record);
    }
    let pdf = records
        .iter()
        .find(|record| record.url == "http://a.test/report.pdf")
        .expect("pdf record missing");

    assert_eq!(pdf.body, b"%PDF-1.4 payload".to_vec());
    assert_eq!(pdf.content, "");
    assert_eq!(pdf.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(pdf.link_count, 0);
}
