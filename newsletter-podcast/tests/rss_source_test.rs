mod common;

use common::{config, init_tracing, pipeline};
use newsletter_podcast::sources::RssFeedSource;
use newsletter_podcast::tts::MockSynthesizer;
use newsletter_podcast::{EpisodeMode, FetchConfig, NewsletterSource, PublisherError};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::info;

const AXIOS_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Axios</title>
    <link>https://www.axios.com</link>
    <description>Smart brevity</description>
    <item>
      <title>Axios AM: October 15, 2025</title>
      <link>https://www.axios.com/newsletters/axios-am-2025-10-15</link>
      <guid isPermaLink="false">axios-am-2025-10-15</guid>
      <pubDate>Wed, 15 Oct 2025 10:00:00 GMT</pubDate>
      <content:encoded><![CDATA[<p>The big thing today.</p><script>track()</script>]]></content:encoded>
    </item>
    <item>
      <title>Axios PM: October 15, 2025</title>
      <link>https://www.axios.com/newsletters/axios-pm-2025-10-15</link>
      <guid isPermaLink="false">axios-pm-2025-10-15</guid>
      <pubDate>Wed, 15 Oct 2025 21:00:00 GMT</pubDate>
      <description>Evening wrap.</description>
    </item>
  </channel>
</rss>"#;

/// Serves `status` and `body` to every connection until the test ends.
async fn serve(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/rss+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{}/feed.xml", addr)
}

fn fetch_config() -> FetchConfig {
    FetchConfig {
        user_agent: "Newsletter-Podcast-Test/1.0".to_string(),
        timeout_seconds: 5,
        max_retries: 0,
        retry_delay_seconds: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_rss_feed_source_pulls_items() {
    init_tracing();
    let url = serve("200 OK", AXIOS_RSS).await;
    let mut source = RssFeedSource::new(url, fetch_config()).unwrap();

    let items = source.pull().await.unwrap();
    info!("Pulled {} items", items.len());
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].guid.as_deref(), Some("axios-am-2025-10-15"));
    assert!(items[0].raw_content.contains("The big thing today."));
    assert_eq!(items[1].raw_content, "Evening wrap.");
    assert_eq!(source.source_name(), "Axios");
    assert!(source.last_fetch().is_some());
}

#[tokio::test]
async fn test_server_error_is_a_fetch_error() {
    init_tracing();
    let url = serve("500 Internal Server Error", "oops").await;
    let mut source = RssFeedSource::new(url, fetch_config()).unwrap();

    let err = source.pull().await.unwrap_err();
    assert!(matches!(err, PublisherError::Fetch(_)));
}

#[tokio::test]
async fn test_html_page_is_rejected() {
    init_tracing();
    let url = serve("200 OK", "just some text, no markup").await;
    let mut source = RssFeedSource::new(url, fetch_config()).unwrap();

    let err = source.pull().await.unwrap_err();
    assert!(matches!(err, PublisherError::Parse(_)));
}

#[tokio::test]
async fn test_feed_over_http_becomes_a_podcast() {
    init_tracing();
    let url = serve("200 OK", AXIOS_RSS).await;
    let dir = tempfile::tempdir().unwrap();
    let synth = Arc::new(MockSynthesizer::succeeding());
    let pipeline = pipeline(config(dir.path(), EpisodeMode::Compilation), synth.clone());
    let mut source = RssFeedSource::new(url, fetch_config()).unwrap();

    let report = pipeline.run(&mut source).await.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.episodes_created, 1);
    assert!(!synth.inputs()[0].contains("track()"));

    let feed = std::fs::read_to_string(dir.path().join("docs/feed.xml")).unwrap();
    assert!(feed.contains("<enclosure"));
    assert!(feed.contains("https://www.axios.com/newsletters/axios-am-2025-10-15"));
}

const GUIDLESS_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Axios</title>
    <item>
      <title>Axios AM: Octber 15, 2025</title>
      <link>https://www.axios.com/newsletters/am-1</link>
      <pubDate>Wed, 15 Oct 2025 10:00:00 GMT</pubDate>
      <description>The big thing today.</description>
    </item>
  </channel>
</rss>"#;

const GUIDLESS_RSS_RETITLED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Axios</title>
    <item>
      <title>Axios AM: October 15, 2025</title>
      <link>https://www.axios.com/newsletters/am-1</link>
      <pubDate>Wed, 15 Oct 2025 10:00:00 GMT</pubDate>
      <description>The big thing today.</description>
    </item>
  </channel>
</rss>"#;

#[tokio::test]
async fn test_guidless_items_are_deduplicated_by_link() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let synth = Arc::new(MockSynthesizer::succeeding());
    let pipeline = pipeline(config(dir.path(), EpisodeMode::Separate), synth.clone());

    let mut source = RssFeedSource::new(serve("200 OK", GUIDLESS_RSS).await, fetch_config()).unwrap();
    let first = pipeline.run(&mut source).await.unwrap();
    assert_eq!(first.episodes_created, 1);

    // A corrected title must not look like a new item
    let mut source =
        RssFeedSource::new(serve("200 OK", GUIDLESS_RSS_RETITLED).await, fetch_config()).unwrap();
    let second = pipeline.run(&mut source).await.unwrap();
    assert_eq!(second.fetched, 1);
    assert_eq!(second.new_items, 0);
    assert_eq!(synth.calls(), 1);

    let state = pipeline.state_manager().load().unwrap();
    let keys: Vec<_> = state.dedup.records().iter().map(|r| r.item_key.as_str()).collect();
    assert_eq!(keys, vec!["https://www.axios.com/newsletters/am-1"]);
}
