//! Integration tests for feed ingestion: HTTP feed, reader service, record store.
//!
//! The feed document, the article pages and the reader service are served by
//! wiremock; each test gets its own in-memory SQLite database.

use chrono::{Duration, Utc};
use feedsync::config::Config;
use feedsync::content::{DisabledTagger, PageExtractor, ReaderClient, BROWSER_USER_AGENT};
use feedsync::feed::{FeedIngestor, FetchError, HttpFeedSource, KnownGuids};
use feedsync::handler::{handle, InvocationError, InvocationRequest, Services};
use feedsync::snapshot::FsBlobStore;
use feedsync::storage::{Database, RecordStore};
use feedsync::util::validate_feed_url;
use std::time::Duration as StdDuration;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTICLE: &str = "Title: Ignored\nURL Source: https://example.com/\n\nMarkdown Content:\n\
# A new release\n\nThis release brings faster cold starts, a smaller memory footprint, \
and a new configuration format that is easier to review. Existing deployments keep \
working without changes.\n";

fn rss(items: &[(&str, i64)]) -> String {
    rss_linking_to("https://example.com", items)
}

fn rss_linking_to(link_base: &str, items: &[(&str, i64)]) -> String {
    let mut body = String::from(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Blog</title>"#);
    for (guid, age_hours) in items {
        let date = (Utc::now() - Duration::hours(*age_hours)).to_rfc2822();
        body.push_str(&format!(
            "<item><guid>{guid}</guid><title>Post \"{guid}\"</title>\
             <link>{link_base}/{guid}</link><pubDate>{date}</pubDate>\
             <description>&lt;p&gt;About {guid}&lt;/p&gt;</description>\
             <category>Launch</category></item>"
        ));
    }
    body.push_str("</channel></rss>");
    body
}

async fn feed_server(body: String) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

async fn reader_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(".*"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE))
        .mount(&server)
        .await;
    server
}

fn feeds() -> HttpFeedSource {
    HttpFeedSource::new(reqwest::Client::new()).with_backoff(StdDuration::from_millis(1))
}

fn reader(server: &MockServer) -> ReaderClient {
    ReaderClient::new(&server.uri(), None)
        .unwrap()
        .with_retry_base(StdDuration::from_millis(1))
}

async fn stored_guids(db: &Database, category: &str) -> Vec<String> {
    let query = feedsync::storage::RecordQuery {
        partition: feedsync::storage::Partition::Source(category.to_string()),
        since: 0,
        limit: 50,
    };
    db.query_page(&query, None)
        .await
        .unwrap()
        .items
        .into_iter()
        .map(|p| p.guid)
        .collect()
}

#[tokio::test]
async fn test_feed_ingested_end_to_end() {
    let feed = feed_server(rss(&[("p1", 2), ("p2", 1), ("ancient", 24 * 90)])).await;
    let reader_srv = reader_server().await;
    let db = Database::open(":memory:").await.unwrap();
    let source = feeds();
    let extractor = reader(&reader_srv);

    let ingestor = FeedIngestor::new(&source, &extractor, &DisabledTagger, &db);
    let report = ingestor
        .ingest(&format!("{}/feed.xml", feed.uri()), "compute", &KnownGuids::new())
        .await
        .unwrap();

    assert!(report.updated());
    assert_eq!(report.ingested, 2);
    assert_eq!(report.stale, 1);

    let record = db.get_post("compute", "p1").await.unwrap().unwrap();
    assert_eq!(record.title, "Post 'p1'");
    assert_eq!(record.description, "About p1");
    assert_eq!(record.categories, "Launch");
    assert_eq!(record.tags, "none");
    assert!(record.raw_html.contains("<h1>A new release</h1>"));
    assert!(record.full_text.contains("faster cold starts"));
}

#[tokio::test]
async fn test_article_page_fetched_directly_with_browser_user_agent() {
    let server = MockServer::start().await;
    let page = "<html><head><title>Blog</title></head><body><nav>Home</nav>\
                <article><h1>A new release</h1><p>Faster cold starts.</p></article></body></html>";
    Mock::given(method("GET"))
        .and(path("/posts/p1"))
        .and(header("user-agent", BROWSER_USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .expect(1)
        .mount(&server)
        .await;
    let feed_body = rss_linking_to(&format!("{}/posts", server.uri()), &[("p1", 2)]);
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed_body))
        .mount(&server)
        .await;

    let db = Database::open(":memory:").await.unwrap();
    let source = feeds();
    // The mock server listens on loopback, which the default link check refuses
    let extractor = PageExtractor::new(reqwest::Client::new())
        .with_link_check(validate_feed_url)
        .with_retry_base(StdDuration::from_millis(1));

    let report = FeedIngestor::new(&source, &extractor, &DisabledTagger, &db)
        .ingest(&format!("{}/feed.xml", server.uri()), "compute", &KnownGuids::new())
        .await
        .unwrap();

    assert_eq!(report.ingested, 1);
    let record = db.get_post("compute", "p1").await.unwrap().unwrap();
    assert_eq!(record.full_text, "A new release\nFaster cold starts.");
    assert_eq!(record.raw_html, "<h1>A new release</h1><p>Faster cold starts.</p>");
}

#[tokio::test]
async fn test_second_run_with_known_guids_not_updated() {
    let feed = feed_server(rss(&[("p1", 2), ("p2", 1)])).await;
    let reader_srv = reader_server().await;
    let db = Database::open(":memory:").await.unwrap();
    let source = feeds();
    let extractor = reader(&reader_srv);
    let url = format!("{}/feed.xml", feed.uri());
    let ingestor = FeedIngestor::new(&source, &extractor, &DisabledTagger, &db);

    ingestor.ingest(&url, "compute", &KnownGuids::new()).await.unwrap();

    let known: KnownGuids = stored_guids(&db, "compute").await.into_iter().collect();
    let report = ingestor.ingest(&url, "compute", &known).await.unwrap();

    assert!(!report.updated());
    assert_eq!(report.duplicates, 2);
}

#[tokio::test]
async fn test_rerun_without_known_guids_is_idempotent() {
    let feed = feed_server(rss(&[("p1", 2), ("p2", 1)])).await;
    let reader_srv = reader_server().await;
    let db = Database::open(":memory:").await.unwrap();
    let source = feeds();
    let extractor = reader(&reader_srv);
    let url = format!("{}/feed.xml", feed.uri());
    let ingestor = FeedIngestor::new(&source, &extractor, &DisabledTagger, &db);

    ingestor.ingest(&url, "compute", &KnownGuids::new()).await.unwrap();
    let before = db.get_post("compute", "p2").await.unwrap();
    ingestor.ingest(&url, "compute", &KnownGuids::new()).await.unwrap();

    assert_eq!(db.count_posts("compute").await.unwrap(), 2);
    assert_eq!(db.get_post("compute", "p2").await.unwrap(), before);
}

#[tokio::test]
async fn test_article_failure_skips_only_that_entry() {
    let feed = feed_server(rss(&[("p1", 2), ("p2", 1)])).await;
    let reader_srv = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(".*/p1$"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&reader_srv)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE))
        .mount(&reader_srv)
        .await;

    let db = Database::open(":memory:").await.unwrap();
    let source = feeds();
    let extractor = reader(&reader_srv);
    let report = FeedIngestor::new(&source, &extractor, &DisabledTagger, &db)
        .ingest(&format!("{}/feed.xml", feed.uri()), "compute", &KnownGuids::new())
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.ingested, 1);
    assert_eq!(stored_guids(&db, "compute").await, vec!["p2"]);
}

#[tokio::test]
async fn test_handler_feed_mode() {
    let feed = feed_server(rss(&[("p1", 2)])).await;
    let reader_srv = reader_server().await;
    let db = Database::open(":memory:").await.unwrap();
    let blob_dir = std::env::temp_dir().join(format!("feedsync-ingest-{}", std::process::id()));
    let blobs = FsBlobStore::open(&blob_dir).await.unwrap();
    let source = feeds();
    let extractor = reader(&reader_srv);
    let services = Services {
        feeds: &source,
        extractor: &extractor,
        tagger: &DisabledTagger,
        store: &db,
        blobs: &blobs,
        notifier: None,
    };

    let request: InvocationRequest = serde_json::from_value(serde_json::json!({
        "mode": "feed",
        "url": format!("{}/feed.xml", feed.uri()),
        "category": "compute",
        "knownGuids": ["p1"]
    }))
    .unwrap();
    let outcome = handle(request, &services, &Config::default()).await.unwrap();
    assert_eq!(serde_json::to_string(&outcome).unwrap(), r#"["compute",false]"#);

    let request = InvocationRequest::Feed {
        url: format!("{}/feed.xml", feed.uri()),
        category: "compute".to_string(),
        known_guids: Vec::new(),
    };
    let outcome = handle(request, &services, &Config::default()).await.unwrap();
    assert!(outcome.updated);

    let _ = std::fs::remove_dir_all(&blob_dir);
}

#[tokio::test]
async fn test_unreachable_feed_fails_invocation() {
    let feed = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&feed)
        .await;
    let reader_srv = reader_server().await;
    let db = Database::open(":memory:").await.unwrap();
    let blob_dir = std::env::temp_dir().join(format!("feedsync-unreachable-{}", std::process::id()));
    let blobs = FsBlobStore::open(&blob_dir).await.unwrap();
    let source = feeds();
    let extractor = reader(&reader_srv);
    let services = Services {
        feeds: &source,
        extractor: &extractor,
        tagger: &DisabledTagger,
        store: &db,
        blobs: &blobs,
        notifier: None,
    };

    let request = InvocationRequest::Feed {
        url: format!("{}/feed.xml", feed.uri()),
        category: "compute".to_string(),
        known_guids: Vec::new(),
    };
    let result = handle(request, &services, &Config::default()).await;
    assert!(matches!(
        result,
        Err(InvocationError::Feed(FetchError::HttpStatus(404)))
    ));

    let _ = std::fs::remove_dir_all(&blob_dir);
}
