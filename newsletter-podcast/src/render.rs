use crate::types::{Episode, FeedMetadata, PodcastFeedState, PublisherError, Result};
use crate::utils::time::format_itunes_duration;
use html_escape::{encode_double_quoted_attribute, encode_text};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

const ITUNES_NS: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";
const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const PODCAST_NS: &str = "https://podcastindex.org/namespace/1.0";

struct XmlOut {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| PublisherError::Render(e.to_string()))
    }

    fn open(&mut self, tag: BytesStart<'_>) -> Result<()> {
        self.event(Event::Start(tag))
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, tag: BytesStart<'_>) -> Result<()> {
        self.event(Event::Empty(tag))
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.open(BytesStart::new(name))?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }

    fn finish(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner().into_inner())
            .map_err(|e| PublisherError::Render(e.to_string()))
    }
}

/// Renders the complete podcast RSS document. Only the newest `max_items`
/// episodes are written; the state itself keeps every episode.
pub fn render_rss(feed: &PodcastFeedState, feed_url: &str, max_items: usize) -> Result<String> {
    let meta = &feed.metadata;
    let mut out = XmlOut::new();

    out.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:itunes", ITUNES_NS));
    rss.push_attribute(("xmlns:atom", ATOM_NS));
    rss.push_attribute(("xmlns:podcast", PODCAST_NS));
    out.open(rss)?;
    out.open(BytesStart::new("channel"))?;

    write_channel_metadata(&mut out, meta, feed_url)?;
    // Episodes are already newest first, so the build date is stable across identical runs
    if let Some(latest) = feed.episodes.iter().map(|ep| ep.created_at).max() {
        out.text_element("lastBuildDate", &latest.to_rfc2822())?;
    }

    for episode in feed.episodes.iter().take(max_items) {
        write_item(&mut out, episode)?;
    }

    out.close("channel")?;
    out.close("rss")?;
    out.finish()
}

fn write_channel_metadata(out: &mut XmlOut, meta: &FeedMetadata, feed_url: &str) -> Result<()> {
    out.text_element("title", &meta.title)?;
    out.text_element("link", &meta.link)?;
    out.text_element("description", &meta.description)?;
    out.text_element("language", &meta.language)?;

    let mut self_link = BytesStart::new("atom:link");
    self_link.push_attribute(("href", feed_url));
    self_link.push_attribute(("rel", "self"));
    self_link.push_attribute(("type", "application/rss+xml"));
    out.empty(self_link)?;

    if !meta.author.is_empty() {
        out.text_element("itunes:author", &meta.author)?;
    }
    out.text_element("itunes:summary", &meta.description)?;
    out.text_element("itunes:explicit", "false")?;
    out.open(BytesStart::new("itunes:owner"))?;
    out.text_element("itunes:name", &meta.owner_name)?;
    out.text_element("itunes:email", &meta.owner_email)?;
    out.close("itunes:owner")?;

    if !meta.image_url.is_empty() {
        let mut image = BytesStart::new("itunes:image");
        image.push_attribute(("href", meta.image_url.as_str()));
        out.empty(image)?;

        out.open(BytesStart::new("image"))?;
        out.text_element("url", &meta.image_url)?;
        out.text_element("title", &meta.title)?;
        out.text_element("link", &meta.link)?;
        out.close("image")?;
    }
    Ok(())
}

fn write_item(out: &mut XmlOut, episode: &Episode) -> Result<()> {
    out.open(BytesStart::new("item"))?;
    out.text_element("title", &episode.title)?;
    if !episode.link.is_empty() {
        out.text_element("link", &episode.link)?;
    }

    let mut guid = BytesStart::new("guid");
    guid.push_attribute(("isPermaLink", "false"));
    out.open(guid)?;
    out.event(Event::Text(BytesText::new(&episode.episode_id)))?;
    out.close("guid")?;

    out.text_element("pubDate", &episode.published_at.to_rfc2822())?;
    out.text_element("description", &episode.description)?;
    out.text_element("itunes:episodeType", "full")?;

    if let Some(audio) = &episode.audio {
        let length = audio.byte_size.to_string();
        let mut enclosure = BytesStart::new("enclosure");
        enclosure.push_attribute(("url", audio.uri.as_str()));
        enclosure.push_attribute(("length", length.as_str()));
        enclosure.push_attribute(("type", "audio/mpeg"));
        out.empty(enclosure)?;
        out.text_element(
            "itunes:duration",
            &format_itunes_duration(audio.duration_seconds),
        )?;
    }

    if let Some(transcript) = &episode.transcript_uri {
        let mut tag = BytesStart::new("podcast:transcript");
        tag.push_attribute(("url", transcript.as_str()));
        tag.push_attribute(("type", "text/plain"));
        out.empty(tag)?;
    }

    out.close("item")
}

/// Static landing page that points listeners at the feed.
pub fn render_index_html(feed: &PodcastFeedState, feed_url: &str, max_items: usize) -> String {
    let meta = &feed.metadata;
    let mut episodes = String::new();
    for episode in feed.episodes.iter().take(max_items) {
        let listen = match &episode.audio {
            Some(audio) => format!(
                " <a href=\"{}\">listen</a>",
                encode_double_quoted_attribute(&audio.uri)
            ),
            None => " <em>(text only)</em>".to_string(),
        };
        episodes.push_str(&format!(
            "      <li>{} <small>{}</small>{}</li>\n",
            encode_text(&episode.title),
            episode.published_at.format("%Y-%m-%d"),
            listen
        ));
    }

    format!(
        r#"<!doctype html>
<html lang="{lang}">
  <head>
    <meta charset="utf-8">
    <title>{title}</title>
    <link rel="alternate" type="application/rss+xml" title="{title_attr}" href="{feed}">
  </head>
  <body>
    <h1>{title}</h1>
    <p>{description}</p>
    <p>Subscribe: <a href="{feed}">{feed_text}</a></p>
    <ul>
{episodes}    </ul>
  </body>
</html>
"#,
        lang = encode_double_quoted_attribute(&meta.language),
        title = encode_text(&meta.title),
        title_attr = encode_double_quoted_attribute(&meta.title),
        description = encode_text(&meta.description),
        feed = encode_double_quoted_attribute(feed_url),
        feed_text = encode_text(feed_url),
        episodes = episodes,
    )
}
