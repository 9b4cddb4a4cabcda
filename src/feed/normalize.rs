use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{NewArticle, Source};

use super::entry::RawEntry;

/// Title used when an entry has none.
pub const UNTITLED: &str = "Untitled";

const TITLE_MAX_CHARS: usize = 500;
const ELLIPSIS: &str = "...";

/// Turns parsed feed entries into article candidates.
#[derive(Debug, Clone)]
pub struct Normalizer {
    description_max_chars: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl Normalizer {
    pub fn new(description_max_chars: usize) -> Self {
        Self { description_max_chars }
    }

    /// Map one entry to a candidate article. `now` is the fallback publication
    /// time for undated entries. An entry without a link is rejected.
    pub fn normalize(&self, entry: &RawEntry, source: &Source, now: NaiveDateTime) -> Result<NewArticle> {
        let link = entry
            .link
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| {
                AppError::Normalization(format!(
                    "entry {:?} has no link",
                    entry.title.as_deref().unwrap_or(UNTITLED)
                ))
            })?
            .to_string();

        let title = match &entry.title {
            Some(title) => truncate_chars(title, TITLE_MAX_CHARS).to_string(),
            None => UNTITLED.to_string(),
        };

        let description = entry
            .summary
            .as_deref()
            .or(entry.description.as_deref())
            .map(|html| self.clean_description(html))
            .unwrap_or_default();

        let guid = entry.id.clone().unwrap_or_else(|| link.clone());

        Ok(NewArticle {
            title,
            description,
            content: None,
            image_url: resolve_image(entry, source),
            link,
            published_at: entry.published.unwrap_or(now),
            guid,
            source_id: source.id,
            category_id: source.category_id,
        })
    }

    fn clean_description(&self, html: &str) -> String {
        let text = strip_tags(html);
        if text.chars().count() > self.description_max_chars {
            format!("{}{ELLIPSIS}", truncate_chars(&text, self.description_max_chars))
        } else {
            text
        }
    }
}

/// Plain text of an HTML fragment.
pub(crate) fn strip_tags(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: String = fragment.root_element().text().collect();
    text.trim().to_string()
}

/// Longest prefix of `s` with at most `max` characters.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Pick an image for the entry. First match wins:
/// media content (image MIME preferred, else the first item), media
/// thumbnail, image enclosure, then the first absolute or root-relative
/// `<img>` in the entry markup.
pub(crate) fn resolve_image(entry: &RawEntry, source: &Source) -> Option<String> {
    let found = if !entry.media_content.is_empty() {
        entry
            .media_content
            .iter()
            .find(|m| m.is_image())
            .or_else(|| entry.media_content.first())
            .map(|m| m.url.clone())
    } else if let Some(thumbnail) = entry.media_thumbnails.first() {
        Some(thumbnail.clone())
    } else {
        entry
            .enclosures
            .iter()
            .find(|e| e.is_image())
            .map(|e| e.url.clone())
    };

    let found = found.or_else(|| {
        let markup = entry.content.as_deref().or(entry.summary.as_deref())?;
        match first_img_src(markup) {
            Ok(src) => src,
            Err(e) => {
                tracing::warn!(
                    title = entry.title.as_deref().unwrap_or(UNTITLED),
                    error = %e,
                    "Image scan failed"
                );
                None
            }
        }
    })?;

    absolutize_image_url(&found, &source.url).or_else(|| {
        tracing::warn!(image = %found, site = %source.url, "Could not resolve relative image URL");
        None
    })
}

fn first_img_src(html: &str) -> std::result::Result<Option<String>, String> {
    let selector = Selector::parse("img[src]").map_err(|e| e.to_string())?;
    let fragment = Html::parse_fragment(html);
    let src = fragment
        .select(&selector)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .find(|src| src.starts_with("http") || src.starts_with('/'))
        .map(str::to_string);
    Ok(src)
}

/// `//host/x` becomes `https://host/x`; `/x` is joined to the site's scheme
/// and host. Anything else is returned unchanged.
pub(crate) fn absolutize_image_url(image: &str, site_url: &str) -> Option<String> {
    if image.starts_with("http") {
        return Some(image.to_string());
    }
    if image.starts_with("//") {
        return Some(format!("https:{image}"));
    }
    if image.starts_with('/') {
        let site = Url::parse(site_url).ok()?;
        let origin = site.origin();
        if !origin.is_tuple() {
            return None;
        }
        return Some(format!("{}{image}", origin.ascii_serialization()));
    }
    Some(image.to_string())
}

fn trailing_zone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+\(?[A-Za-z]{1,5}\)?$").expect("static regex is valid"))
}

fn leading_weekday_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z]{3,9},\s*").expect("static regex is valid"))
}

const OFFSET_FORMATS: &[&str] = &[
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%d %B %Y %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%dT%H:%M%z",
    "%B %d, %Y %H:%M:%S %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
    "%d %B %Y %H:%M:%S",
    "%B %d, %Y %H:%M:%S",
    "%B %d, %Y %H:%M",
    "%b %d, %Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

/// Parse a feed date into naive UTC.
///
/// Well-formed RFC 2822 / RFC 3339 dates are converted to UTC. Anything else
/// goes through a list of free-form layouts; a zone-aware free-form match
/// keeps its wall-clock time and drops the offset.
pub fn parse_published(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }

    let text = leading_weekday_re().replace(text, "");
    let text = match text.strip_suffix('Z') {
        Some(head) => format!("{head}+0000"),
        None => text.into_owned(),
    };

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&text, format) {
            return Some(dt.naive_local());
        }
    }

    let text = trailing_zone_re().replace(&text, "");
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&text, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&text, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}
