use chrono::NaiveDateTime;

/// A media reference from a feed entry: `media:content`, an enclosure, etc.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaRef {
    pub url: String,
    /// Declared MIME type, if the feed gave one.
    pub mime: Option<String>,
}

impl MediaRef {
    pub fn new(url: impl Into<String>, mime: Option<&str>) -> Self {
        Self {
            url: url.into(),
            mime: mime.map(str::to_string),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime.as_deref().is_some_and(|m| m.starts_with("image/"))
    }
}

/// One feed item as parsed, before normalization. Every field a feed may
/// omit is optional; the normalizer applies the fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawEntry {
    /// Feed-native identifier (`<guid>`, Atom `<id>`).
    pub id: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    /// RSS `<description>` or Atom `<summary>`, usually HTML.
    pub summary: Option<String>,
    /// Secondary description (e.g. `media:description`).
    pub description: Option<String>,
    /// Full HTML body (`content:encoded`, Atom `<content>`).
    pub content: Option<String>,
    /// Publication time as naive UTC, if the feed's date could be parsed.
    pub published: Option<NaiveDateTime>,
    pub media_content: Vec<MediaRef>,
    pub media_thumbnails: Vec<String>,
    pub enclosures: Vec<MediaRef>,
}
