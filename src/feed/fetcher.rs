use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use feed_rs::model::Entry;
use feed_rs::parser;
use regex::{Captures, Regex};
use reqwest::Client;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::Source;

use super::entry::{MediaRef, RawEntry};
use super::normalize::parse_published;

/// Sent with every outgoing request; some origins block non-browser agents.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

pub struct FeedFetcher {
    client: Client,
    max_entries: usize,
}

impl FeedFetcher {
    pub fn new(timeout: Duration, max_entries: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .user_agent(BROWSER_USER_AGENT)
            .build()?;

        Ok(Self { client, max_entries })
    }

    /// Fetch and parse a source's feed, returning at most `max_entries`
    /// entries in feed order. Network errors, HTTP errors and unparseable
    /// documents are returned as errors.
    pub async fn fetch_entries(&self, source: &Source) -> Result<Vec<RawEntry>> {
        tracing::info!(source = %source.name, url = %source.feed_url, "Fetching feed");

        let response = self.client.get(&source.feed_url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::HttpStatus {
                url: source.feed_url.clone(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        let mut entries = parse_feed(&bytes).map_err(|e| {
            tracing::warn!(source = %source.name, error = %e, "Feed could not be parsed");
            e
        })?;
        entries.truncate(self.max_entries);

        tracing::debug!(source = %source.name, count = entries.len(), "Parsed feed entries");
        Ok(entries)
    }
}

/// Parse a feed document permissively. A document that only parses after
/// repair is accepted with a warning.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<RawEntry>> {
    let (feed, text) = match parse_document(bytes) {
        Ok(feed) => (feed, String::from_utf8_lossy(bytes).into_owned()),
        Err(original) => {
            let Some(repaired) = repair_document(bytes) else {
                return Err(original.into());
            };
            match parse_document(repaired.as_bytes()) {
                Ok(feed) => {
                    tracing::warn!(error = %original, "Malformed feed accepted after repair");
                    (feed, repaired)
                }
                Err(_) => return Err(original.into()),
            }
        }
    };

    let enclosures = enclosure_urls(&text);
    Ok(feed
        .entries
        .into_iter()
        .map(|entry| raw_entry(entry, &enclosures))
        .collect())
}

fn parse_document(bytes: &[u8]) -> std::result::Result<feed_rs::model::Feed, parser::ParseFeedError> {
    parser::Builder::new()
        .timestamp_parser(|text| parse_published(text).map(|dt| dt.and_utc()))
        // no synthesized ids: an item without a guid falls back to its link
        .id_generator(|_, _, _| String::new())
        .build()
        .parse(bytes)
}

fn enclosure_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<enclosure\b[^>]*?\burl\s*=\s*["']([^"']+)["']"#)
            .expect("static regex is valid")
    })
}

/// URLs of RSS `<enclosure>` elements. feed-rs folds enclosures into the
/// item's media objects, so they are told apart from `media:content` by URL.
fn enclosure_urls(text: &str) -> HashSet<String> {
    enclosure_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let raw = caps.get(1)?.as_str().trim().replace("&amp;", "&");
            Url::parse(&raw).ok().map(String::from)
        })
        .collect()
}

fn bare_ampersand_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"&([A-Za-z][A-Za-z0-9]*;|#[0-9]+;|#[xX][0-9A-Fa-f]+;)?")
            .expect("static regex is valid")
    })
}

/// Fix the usual breakage in hand-rolled feeds: a byte-order mark or junk
/// before the first tag, and unescaped ampersands. Returns `None` when there
/// is nothing to repair.
fn repair_document(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let start = text.find('<')?;
    let body = &text[start..];

    let repaired = bare_ampersand_re().replace_all(body, |caps: &Captures| match caps.get(1) {
        Some(entity) => format!("&{}", entity.as_str()),
        None => "&amp;".to_string(),
    });

    if start == 0 && repaired == body {
        None
    } else {
        Some(repaired.into_owned())
    }
}

fn raw_entry(entry: Entry, enclosure_urls: &HashSet<String>) -> RawEntry {
    let link = select_link(&entry);

    let mut media_content = Vec::new();
    let mut enclosures = Vec::new();
    let mut media_thumbnails = Vec::new();
    let mut description = None;
    for media in &entry.media {
        for content in &media.content {
            if let Some(url) = &content.url {
                let mime = content.content_type.as_ref().map(|m| m.to_string());
                let media = MediaRef::new(url.as_str(), mime.as_deref());
                if enclosure_urls.contains(url.as_str()) {
                    enclosures.push(media);
                } else {
                    media_content.push(media);
                }
            }
        }
        for thumbnail in &media.thumbnails {
            if !thumbnail.image.uri.trim().is_empty() {
                media_thumbnails.push(thumbnail.image.uri.clone());
            }
        }
        if description.is_none() {
            description = media.description.as_ref().map(|d| d.content.clone());
        }
    }

    enclosures.extend(
        entry
            .links
            .iter()
            .filter(|l| l.rel.as_deref().is_some_and(|r| r.eq_ignore_ascii_case("enclosure")))
            .map(|l| MediaRef::new(l.href.clone(), l.media_type.as_deref())),
    );

    let id = Some(entry.id).filter(|id| !id.trim().is_empty());

    RawEntry {
        id,
        title: entry.title.map(|t| t.content),
        link,
        summary: entry.summary.map(|s| s.content),
        description,
        content: entry.content.and_then(|c| c.body),
        published: entry.published.map(|dt| dt.naive_utc()),
        media_content,
        media_thumbnails,
        enclosures,
    }
}

/// The entry's article link: the first alternate (or rel-less) link, else
/// the first link that is not an enclosure.
fn select_link(entry: &Entry) -> Option<String> {
    let usable = |href: &str| !href.trim().is_empty();

    entry
        .links
        .iter()
        .find(|l| {
            usable(&l.href)
                && l.rel
                    .as_deref()
                    .map_or(true, |r| r.is_empty() || r.eq_ignore_ascii_case("alternate"))
        })
        .or_else(|| {
            entry.links.iter().find(|l| {
                usable(&l.href)
                    && !l.rel.as_deref().is_some_and(|r| r.eq_ignore_ascii_case("enclosure"))
            })
        })
        .map(|l| l.href.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Example News</title>
    <link>https://news.example.com/</link>
    <description>All the news</description>
    <item>
      <title>First story</title>
      <link>https://news.example.com/first</link>
      <guid>story-1</guid>
      <pubDate>Mon, 21 Oct 2024 07:28:00 +0300</pubDate>
      <description>&lt;p&gt;Summary &lt;b&gt;one&lt;/b&gt;&lt;/p&gt;</description>
      <media:content url="https://cdn.example.com/1.jpg" type="image/jpeg" />
    </item>
    <item>
      <title>Second story</title>
      <link>https://news.example.com/second</link>
      <description>Plain</description>
      <content:encoded><![CDATA[<p><img src="/img/2.png"> Body</p>]]></content:encoded>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <id>urn:example:feed</id>
  <updated>2024-10-21T10:00:00Z</updated>
  <entry>
    <title>Atom entry</title>
    <id>urn:example:1</id>
    <link rel="alternate" href="https://atom.example.com/1"/>
    <link rel="enclosure" type="image/png" href="https://atom.example.com/1.png"/>
    <updated>2024-10-21T10:00:00Z</updated>
    <published>2024-10-21T09:30:00+02:00</published>
    <summary>Atom summary</summary>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_entries_in_order() {
        let entries = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.title.as_deref(), Some("First story"));
        assert_eq!(first.link.as_deref(), Some("https://news.example.com/first"));
        assert_eq!(first.id.as_deref(), Some("story-1"));
        assert_eq!(
            first.published,
            NaiveDate::from_ymd_opt(2024, 10, 21).unwrap().and_hms_opt(4, 28, 0)
        );
        assert!(first.summary.as_deref().unwrap().contains("<b>one</b>"));
        assert_eq!(first.media_content[0].url, "https://cdn.example.com/1.jpg");
        assert!(first.media_content[0].is_image());

        let second = &entries[1];
        assert!(second.content.as_deref().unwrap().contains("/img/2.png"));
        assert_eq!(second.published, None);
    }

    #[test]
    fn parses_atom_links_and_enclosures() {
        let entries = parse_feed(ATOM.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.link.as_deref(), Some("https://atom.example.com/1"));
        assert_eq!(entry.enclosures.len(), 1);
        assert!(entry.enclosures[0].is_image());
        assert_eq!(
            entry.published,
            NaiveDate::from_ymd_opt(2024, 10, 21).unwrap().and_hms_opt(7, 30, 0)
        );
    }

    const PODCAST: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Example Cast</title>
    <link>https://x.example.com/</link>
    <description>Episodes</description>
    <item>
      <title>Episode one</title>
      <link>https://x.example.com/ep1</link>
      <enclosure url="https://x.example.com/ep1.mp3" length="1024" type="audio/mpeg"/>
    </item>
    <item>
      <title>Episode two</title>
      <link>https://x.example.com/ep2</link>
      <guid>ep-2</guid>
      <media:content url="https://x.example.com/ep2.mp4" type="video/mp4"/>
      <enclosure url="https://x.example.com/ep2.jpg?size=large&amp;v=2" type="image/jpeg"/>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn items_without_guid_have_no_id() {
        let entries = parse_feed(PODCAST.as_bytes()).unwrap();
        assert_eq!(entries[0].id, None);
        assert_eq!(entries[1].id.as_deref(), Some("ep-2"));
    }

    #[test]
    fn rss_enclosures_are_kept_apart_from_media_content() {
        let entries = parse_feed(PODCAST.as_bytes()).unwrap();

        let first = &entries[0];
        assert!(first.media_content.is_empty());
        assert_eq!(first.enclosures.len(), 1);
        assert_eq!(first.enclosures[0].mime.as_deref(), Some("audio/mpeg"));

        let second = &entries[1];
        assert_eq!(second.media_content.len(), 1);
        assert_eq!(second.media_content[0].url, "https://x.example.com/ep2.mp4");
        assert_eq!(second.enclosures.len(), 1);
        assert!(second.enclosures[0].is_image());
    }

    #[test]
    fn repairs_bare_ampersands_and_leading_junk() {
        let broken = format!("\u{feff}\n  {}", RSS.replace("All the news", "News & views"));
        let entries = parse_feed(broken.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn repair_leaves_entities_alone() {
        let repaired = repair_document(b"<a>&amp; &#38; &#x26; & x</a>").unwrap();
        assert_eq!(repaired, "<a>&amp; &#38; &#x26; &amp; x</a>");
        assert!(repair_document(b"<a>fine</a>").is_none());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_feed(b"this is not a feed").is_err());
        assert!(parse_feed(b"").is_err());
    }
}
