//! End-to-end scan tests: mocked feeds and images, a real in-memory SQLite
//! store, and the scheduler driving a single cycle at a time.

use chrono::DateTime;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reaper::ingest::images::partition_dir;
use reaper::storage::{Category, Database, Source, SourceStatus};
use reaper::{Config, ScanContext, ScanError, ScanScheduler};

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn media_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("reaper_pipeline_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn test_config(media: PathBuf) -> Config {
    Config {
        media_cache_path: media,
        minimum_image_size_bytes: 1000,
        allow_private_hosts: true,
        request_timeout_seconds: 5,
        probe_timeout_seconds: 5,
        ..Config::default()
    }
}

fn scheduler(db: &Database, config: Config) -> ScanScheduler {
    let db = Arc::new(db.clone());
    let context = ScanContext::new(config, db.clone(), db).unwrap();
    ScanScheduler::new(Arc::new(context))
}

async fn add_source(db: &Database, name: &str, server: &MockServer, route: &str) -> i64 {
    db.insert_source(&Source::new(
        name,
        &server.uri(),
        &format!("{}{}", server.uri(), route),
    ))
    .await
    .unwrap()
}

async fn serve_feed(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn rss_feed(base: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Systems Weekly</title>
    <pubDate>Tue, 02 Jan 2024 08:00:00 GMT</pubDate>
    <item>
      <title>Rust in the kernel</title>
      <link>https://news.example/rust-kernel</link>
      <description><![CDATA[<p>Why <b>Rust</b> matters &amp; what changes.</p>]]></description>
      <pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate>
      <category>Programming</category>
      <enclosure url="{base}/cover.png" type="image/png" length="5000"/>
    </item>
    <item>
      <title>Garden notes</title>
      <link>https://news.example/garden</link>
      <description>Tomatoes and beans</description>
    </item>
    <item>
      <title>No link here</title>
      <description>dropped</description>
    </item>
  </channel>
</rss>"#
    )
}

async fn serve_image(server: &MockServer, route: &str, body: Vec<u8>) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .insert_header("content-length", body.len().to_string().as_str())
                .set_body_bytes(body.clone()),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "image/png"))
        .expect(1)
        .mount(server)
        .await;
}

// ============================================================================
// Full cycle
// ============================================================================

#[tokio::test]
async fn test_scan_stores_categorised_items_with_images() {
    let server = MockServer::start().await;
    let image: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();
    serve_feed(&server, "/feed.xml", rss_feed(&server.uri())).await;
    serve_image(&server, "/cover.png", image.clone()).await;

    let db = test_db().await;
    let general = db.insert_category(&Category::new(0, "General")).await.unwrap();
    let tech = db
        .insert_category(&Category::new(0, "Tech").with_tags(["rust", "kernel"]))
        .await
        .unwrap();
    let source_id = add_source(&db, "Systems Weekly", &server, "/feed.xml").await;

    let media = media_dir("full");
    let summary = scheduler(&db, test_config(media.clone()))
        .run_once()
        .await
        .unwrap();

    assert_eq!(summary.sources_fetched, 1);
    assert_eq!(summary.items_persisted, 2);

    let rust = db
        .get_item_by_url("https://news.example/rust-kernel")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rust.source_id, source_id);
    assert_eq!(rust.description, "Why Rust matters & what changes.");
    assert_eq!(rust.category_id, Some(tech));
    assert_eq!(rust.tags, "rust, kernel");
    assert_eq!(rust.declared_categories, "programming");
    assert_eq!(rust.publication_time, 1704103200);
    assert_eq!(rust.image_filename.as_deref(), Some("cover.png"));

    let imported = DateTime::from_timestamp(rust.import_time, 0).unwrap();
    let written = std::fs::read(partition_dir(&media, imported).join("cover.png")).unwrap();
    assert_eq!(written, image);

    let garden = db
        .get_item_by_url("https://news.example/garden")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(garden.category_id, Some(general));
    assert_eq!(garden.tags, "");
    assert!(garden.image_filename.is_none());
    // Falls back to the channel date
    assert_eq!(garden.publication_time, 1704182400);

    std::fs::remove_dir_all(&media).ok();
}

#[tokio::test]
async fn test_second_scan_imports_nothing_new() {
    let server = MockServer::start().await;
    serve_feed(&server, "/feed.xml", rss_feed(&server.uri())).await;
    serve_image(&server, "/cover.png", vec![7u8; 4096]).await;

    let db = test_db().await;
    let source_id = add_source(&db, "Systems Weekly", &server, "/feed.xml").await;
    let media = media_dir("second");
    let scheduler = scheduler(&db, test_config(media.clone()));

    assert_eq!(scheduler.run_once().await.unwrap().items_persisted, 2);
    let again = scheduler.run_once().await.unwrap();

    assert_eq!(again.sources_fetched, 1);
    assert_eq!(again.items_persisted, 0);
    assert_eq!(db.get_items_for_source(source_id).await.unwrap().len(), 2);

    std::fs::remove_dir_all(&media).ok();
}

#[tokio::test]
async fn test_every_dialect_in_one_cycle() {
    let server = MockServer::start().await;
    serve_feed(
        &server,
        "/atom",
        r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom source</title>
  <updated>2024-02-01T00:00:00Z</updated>
  <entry>
    <title>Atom entry</title>
    <id>urn:uuid:1</id>
    <link rel="alternate" href="https://atom.example/1"/>
    <summary>Summary text</summary>
    <published>2024-01-31T12:00:00Z</published>
  </entry>
</feed>"#
            .to_owned(),
    )
    .await;
    serve_feed(
        &server,
        "/rdf",
        r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns="http://purl.org/rss/1.0/" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel><title>RDF source</title><dc:date>2024-03-01</dc:date></channel>
  <item>
    <title>RDF entry</title>
    <link>https://rdf.example/1</link>
    <description>Body</description>
  </item>
</rdf:RDF>"#
            .to_owned(),
    )
    .await;
    serve_feed(
        &server,
        "/old-rss",
        r#"<rss version="0.91"><channel><title>Old</title>
  <item><title>Old entry</title><link>https://old.example/1</link><description>Text</description></item>
</channel></rss>"#
            .to_owned(),
    )
    .await;

    let db = test_db().await;
    let atom = add_source(&db, "Atom", &server, "/atom").await;
    let rdf = add_source(&db, "RDF", &server, "/rdf").await;
    let old = add_source(&db, "Old", &server, "/old-rss").await;

    let media = media_dir("dialects");
    let summary = scheduler(&db, test_config(media)).run_once().await.unwrap();

    assert_eq!(summary.sources_fetched, 3);
    assert_eq!(summary.items_persisted, 3);

    let atom_items = db.get_items_for_source(atom).await.unwrap();
    assert_eq!(atom_items[0].content_url, "https://atom.example/1");
    assert_eq!(atom_items[0].guid, "urn:uuid:1");
    assert_eq!(atom_items[0].publication_time, 1706702400);

    let rdf_items = db.get_items_for_source(rdf).await.unwrap();
    assert_eq!(rdf_items[0].title, "RDF entry");
    assert_eq!(rdf_items[0].publication_time, 1709251200);

    assert_eq!(db.get_items_for_source(old).await.unwrap().len(), 1);
}

// ============================================================================
// Source health
// ============================================================================

#[tokio::test]
async fn test_failing_source_disabled_after_three_cycles() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(9)
        .mount(&server)
        .await;

    let db = test_db().await;
    let id = add_source(&db, "Flaky", &server, "/down").await;
    let scheduler = scheduler(&db, test_config(media_dir("health")));

    for expected in 1..=3u32 {
        let summary = scheduler.run_once().await.unwrap();
        assert_eq!(summary.sources_skipped, 1);
        let source = db.get_source(id).await.unwrap().unwrap();
        assert_eq!(source.failed_get_count, expected);
    }

    let source = db.get_source(id).await.unwrap().unwrap();
    assert_eq!(source.status, SourceStatus::NotResponding);
    assert!(db.get_active_sources().await.unwrap().is_empty());

    // A disabled source is no longer visited
    let summary = scheduler.run_once().await.unwrap();
    assert_eq!(summary.sources_skipped, 0);
}

// ============================================================================
// Escalation
// ============================================================================

#[tokio::test]
async fn test_unknown_atom_version_aborts_scan() {
    let server = MockServer::start().await;
    serve_feed(
        &server,
        "/atom",
        r#"<feed version="2.0"><title>Future</title></feed>"#.to_owned(),
    )
    .await;

    let db = test_db().await;
    add_source(&db, "Future", &server, "/atom").await;

    let result = scheduler(&db, test_config(media_dir("abort"))).start().await;

    match result {
        Err(ScanError::SourceScan { source_name, .. }) => assert_eq!(source_name, "Future"),
        other => panic!("expected the run to abort, got {:?}", other),
    }
}
