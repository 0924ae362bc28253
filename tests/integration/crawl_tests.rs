//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end against SQLite stores on disk.

use depthcrawl::crawler::{
    Engine, EngineSettings, HtmlLinkExtractor, HttpFetcher, DEFAULT_USER_AGENT,
};
use depthcrawl::storage::{RecordStore, SqliteRecordStore, SqliteVisitedSet, VisitedSet};
use depthcrawl::{CrawlError, CrawlSummary};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SET_KEY: &str = "crawler:visited_urls";

/// Record and visited stores sharing one database file
struct Stores {
    records: Arc<SqliteRecordStore>,
    visited: Arc<SqliteVisitedSet>,
}

impl Stores {
    fn open(db_path: &Path) -> Self {
        Self {
            records: Arc::new(SqliteRecordStore::open(db_path).expect("open record store")),
            visited: Arc::new(SqliteVisitedSet::open(db_path, SET_KEY).expect("open visited set")),
        }
    }

    async fn close(&self) {
        self.records.close().await.unwrap();
        self.visited.close().await.unwrap();
    }

    /// Persisted URLs, relative to `base`, mapped to their depth
    async fn persisted(&self, base: &str) -> BTreeMap<String, u32> {
        self.records
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.url.replacen(base, "", 1), r.depth))
            .collect()
    }
}

fn settings(max_depth: u32, same_host: bool) -> EngineSettings {
    EngineSettings {
        worker_count: 4,
        max_depth,
        same_host,
        ..EngineSettings::default()
    }
}

async fn crawl(
    settings: EngineSettings,
    stores: &Stores,
    seed: &str,
    cancel: &CancellationToken,
) -> Result<CrawlSummary, CrawlError> {
    let fetcher = HttpFetcher::new(DEFAULT_USER_AGENT, Duration::from_secs(5)).unwrap();
    let engine = Engine::new(
        settings,
        Arc::new(fetcher),
        Arc::new(HtmlLinkExtractor::new()),
        stores.records.clone(),
        stores.visited.clone(),
    );

    tokio::time::timeout(Duration::from_secs(30), engine.run(cancel, seed))
        .await
        .expect("crawl should finish")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!("<html><body>{}</body></html>", body))
        .insert_header("content-type", "text/html")
}

async fn mount_page(server: &MockServer, page: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(response)
        .mount(server)
        .await;
}

/// `/` -> `/a`, `/b`; `/a` -> `/a1`; `/b` -> `/b1`, `{other}/x`
async fn mount_site(site: &MockServer, other: &MockServer) {
    mount_page(site, "/", html(r#"<a href="/a">A</a> <a href="/b">B</a>"#)).await;
    mount_page(site, "/a", html(r#"<a href="/a1">A1</a>"#)).await;
    mount_page(
        site,
        "/b",
        html(&format!(
            r#"<a href="/b1">B1</a> <a href="{}/x">X</a>"#,
            other.uri()
        )),
    )
    .await;
    mount_page(site, "/a1", html(r#"<a href="/a2">deeper</a>"#)).await;
    mount_page(site, "/b1", html("leaf")).await;
    mount_page(other, "/x", html("elsewhere")).await;
}

fn expected(entries: &[(&str, u32)]) -> BTreeMap<String, u32> {
    entries
        .iter()
        .map(|(url, depth)| (url.to_string(), *depth))
        .collect()
}

#[tokio::test]
async fn test_crawl_persists_reachable_pages_within_depth() {
    let site = MockServer::start().await;
    let other = MockServer::start().await;
    mount_site(&site, &other).await;

    let dir = TempDir::new().unwrap();
    let stores = Stores::open(&dir.path().join("crawl.db"));
    let seed = format!("{}/", site.uri());

    let summary = crawl(settings(2, true), &stores, &seed, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        stores.persisted(&site.uri()).await,
        expected(&[("/", 0), ("/a", 1), ("/b", 1), ("/a1", 2), ("/b1", 2)])
    );
    assert_eq!(summary.pages_saved, 5);
    assert_eq!(stores.visited.len().await.unwrap(), 5);

    // Out of scope links never reach the visited set
    let x = format!("{}/x", other.uri());
    assert!(!stores.visited.contains(&x).await.unwrap());

    let a1 = stores
        .records
        .get(&format!("{}/a1", site.uri()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a1.found_on, format!("{}/a", site.uri()));
    assert_eq!(a1.found_links, vec![format!("{}/a2", site.uri())]);
}

#[tokio::test]
async fn test_crawl_with_depth_one_records_links_without_descending() {
    let site = MockServer::start().await;
    let other = MockServer::start().await;
    mount_site(&site, &other).await;

    let dir = TempDir::new().unwrap();
    let stores = Stores::open(&dir.path().join("crawl.db"));
    let seed = format!("{}/", site.uri());

    crawl(settings(1, true), &stores, &seed, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        stores.persisted(&site.uri()).await,
        expected(&[("/", 0), ("/a", 1), ("/b", 1)])
    );

    let b = stores
        .records
        .get(&format!("{}/b", site.uri()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        b.found_links,
        vec![format!("{}/b1", site.uri()), format!("{}/x", other.uri())]
    );
}

#[tokio::test]
async fn test_crawl_with_depth_zero_fetches_only_seed() {
    let site = MockServer::start().await;
    let other = MockServer::start().await;
    mount_site(&site, &other).await;

    let dir = TempDir::new().unwrap();
    let stores = Stores::open(&dir.path().join("crawl.db"));
    let seed = format!("{}/", site.uri());

    let summary = crawl(settings(0, true), &stores, &seed, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stores.persisted(&site.uri()).await, expected(&[("/", 0)]));
    assert_eq!(summary.links_admitted, 0);
    assert_eq!(stores.visited.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_crawl_follows_other_hosts_when_allowed() {
    let site = MockServer::start().await;
    let other = MockServer::start().await;
    mount_site(&site, &other).await;

    let dir = TempDir::new().unwrap();
    let stores = Stores::open(&dir.path().join("crawl.db"));
    let seed = format!("{}/", site.uri());

    crawl(settings(2, false), &stores, &seed, &CancellationToken::new())
        .await
        .unwrap();

    let x = stores
        .records
        .get(&format!("{}/x", other.uri()))
        .await
        .unwrap()
        .expect("other host page should be persisted");
    assert_eq!(x.depth, 2);
    assert_eq!(stores.records.count().await.unwrap(), 6);
}

#[tokio::test]
async fn test_fragments_collapse_before_admission() {
    let site = MockServer::start().await;
    mount_page(
        &site,
        "/",
        html(r#"<a href="/a#section">S</a> <a href="/a">A</a> <a href="/a?q=1">Q</a>"#),
    )
    .await;
    // Matches both /a and /a?q=1
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html("leaf"))
        .expect(2)
        .mount(&site)
        .await;

    let dir = TempDir::new().unwrap();
    let stores = Stores::open(&dir.path().join("crawl.db"));
    let seed = format!("{}/", site.uri());

    let summary = crawl(settings(2, true), &stores, &seed, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.links_admitted, 2);
    assert_eq!(
        stores.persisted(&site.uri()).await,
        expected(&[("/", 0), ("/a", 1), ("/a?q=1", 1)])
    );

    let root = stores.records.get(&seed).await.unwrap().unwrap();
    assert_eq!(
        root.found_links,
        vec![format!("{}/a", site.uri()), format!("{}/a?q=1", site.uri())]
    );
    assert!(root.found_links.iter().all(|link| !link.contains('#')));
}

#[tokio::test]
async fn test_server_error_drops_page_and_its_subtree() {
    let site = MockServer::start().await;
    mount_page(&site, "/", html(r#"<a href="/a">A</a> <a href="/b">B</a>"#)).await;
    mount_page(&site, "/a", html(r#"<a href="/a1">A1</a>"#)).await;
    mount_page(&site, "/a1", html("leaf")).await;
    mount_page(&site, "/b", ResponseTemplate::new(500)).await;
    Mock::given(method("GET"))
        .and(path("/b1"))
        .respond_with(html("never discovered"))
        .expect(0)
        .mount(&site)
        .await;

    let dir = TempDir::new().unwrap();
    let stores = Stores::open(&dir.path().join("crawl.db"));
    let seed = format!("{}/", site.uri());

    let summary = crawl(settings(2, true), &stores, &seed, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        stores.persisted(&site.uri()).await,
        expected(&[("/", 0), ("/a", 1), ("/a1", 2)])
    );
    assert_eq!(summary.pages_dropped, 1);
}

#[tokio::test]
async fn test_empty_body_yields_record_without_links() {
    let site = MockServer::start().await;
    mount_page(&site, "/", ResponseTemplate::new(200)).await;

    let dir = TempDir::new().unwrap();
    let stores = Stores::open(&dir.path().join("crawl.db"));
    let seed = format!("{}/", site.uri());

    crawl(settings(2, true), &stores, &seed, &CancellationToken::new())
        .await
        .unwrap();

    let root = stores.records.get(&seed).await.unwrap().unwrap();
    assert!(root.found_links.is_empty());
    assert_eq!(root.found_on, "");
}

#[tokio::test]
async fn test_second_run_persists_nothing_new() {
    let site = MockServer::start().await;
    let other = MockServer::start().await;
    mount_site(&site, &other).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");
    let seed = format!("{}/", site.uri());

    let stores = Stores::open(&db_path);
    let first = crawl(settings(2, true), &stores, &seed, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.pages_saved, 5);
    stores.close().await;

    // A fresh process would reopen the same files
    let stores = Stores::open(&db_path);
    let second = crawl(settings(2, true), &stores, &seed, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(second.pages_saved, 0);
    assert_eq!(second.links_admitted, 0);
    assert_eq!(stores.records.count().await.unwrap(), 5);

    // Only the first run fetched anything
    let requests = site.received_requests().await.unwrap();
    assert_eq!(requests.len(), 5);
}

#[tokio::test]
async fn test_force_recrawl_reproduces_first_run() {
    let site = MockServer::start().await;
    let other = MockServer::start().await;
    mount_site(&site, &other).await;

    let dir = TempDir::new().unwrap();
    let stores = Stores::open(&dir.path().join("crawl.db"));
    let seed = format!("{}/", site.uri());
    let cancel = CancellationToken::new();

    crawl(settings(2, true), &stores, &seed, &cancel).await.unwrap();
    let first = stores.persisted(&site.uri()).await;

    stores.visited.clear().await.unwrap();
    let second = crawl(settings(2, true), &stores, &seed, &cancel).await.unwrap();

    assert_eq!(second.pages_saved, 5);
    assert_eq!(stores.persisted(&site.uri()).await, first);
}

#[tokio::test]
async fn test_cancellation_before_seed_writes_nothing() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("unreachable"))
        .expect(0)
        .mount(&site)
        .await;

    let dir = TempDir::new().unwrap();
    let stores = Stores::open(&dir.path().join("crawl.db"));
    let seed = format!("{}/", site.uri());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = crawl(settings(2, true), &stores, &seed, &cancel).await;

    assert!(matches!(result, Err(CrawlError::Cancelled)));
    assert_eq!(stores.records.count().await.unwrap(), 0);
    assert_eq!(stores.visited.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_cancellation_mid_crawl_stops_workers() {
    let site = MockServer::start().await;
    mount_page(
        &site,
        "/",
        html(r#"<a href="/slow1">1</a> <a href="/slow2">2</a>"#),
    )
    .await;
    for page in ["/slow1", "/slow2"] {
        mount_page(
            &site,
            page,
            html("slow").set_delay(Duration::from_secs(3)),
        )
        .await;
    }

    let dir = TempDir::new().unwrap();
    let stores = Stores::open(&dir.path().join("crawl.db"));
    let seed = format!("{}/", site.uri());

    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            cancel.cancel();
        })
    };

    let started = std::time::Instant::now();
    let result = crawl(settings(2, true), &stores, &seed, &cancel).await;
    canceller.await.unwrap();

    assert!(matches!(result, Err(CrawlError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(stores.persisted(&site.uri()).await, expected(&[("/", 0)]));
}

#[tokio::test]
async fn test_non_http_links_are_never_admitted() {
    let site = MockServer::start().await;
    mount_page(
        &site,
        "/",
        html(
            r#"<a href="mailto:someone@example.com">mail</a>
               <a href="javascript:void(0)">js</a>
               <a href="ftp://files.example.com/f">ftp</a>
               <a href="">empty</a>
               <a href="/ok">ok</a>"#,
        ),
    )
    .await;
    mount_page(&site, "/ok", html("leaf")).await;

    let dir = TempDir::new().unwrap();
    let stores = Stores::open(&dir.path().join("crawl.db"));
    let seed = format!("{}/", site.uri());

    crawl(settings(2, true), &stores, &seed, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        stores.persisted(&site.uri()).await,
        expected(&[("/", 0), ("/ok", 1)])
    );
    let root = stores.records.get(&seed).await.unwrap().unwrap();
    assert_eq!(root.found_links, vec![format!("{}/ok", site.uri())]);
}
