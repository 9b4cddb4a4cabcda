use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::feed::BROWSER_USER_AGENT;

/// Extracted text shorter than this is treated as "nothing found".
const MIN_CONTENT_CHARS: usize = 200;

/// Containers that hold page chrome rather than article text.
const BOILERPLATE: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "iframe", "svg",
    "button", "figure",
];

/// Class/id fragments that mark ads, share bars and similar clutter.
const BOILERPLATE_HINTS: &[&str] = &[
    "comment", "share", "social", "related", "promo", "advert", "banner", "cookie", "subscribe",
    "newsletter", "sidebar", "menu", "breadcrumb",
];

/// Selectors tried in order for an explicit main-content container.
const ARTICLE_SELECTORS: &[&str] = &[
    "[itemprop=articleBody]",
    "article",
    "main",
    "[role=main]",
    ".article-body",
    ".post-content",
    ".entry-content",
];

pub struct ContentFetcher {
    client: Client,
    max_chars: usize,
}

impl ContentFetcher {
    pub fn new(timeout: Duration, max_chars: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()?;
        Ok(Self { client, max_chars })
    }

    /// Fetch an article page and extract its main text, truncated to
    /// `max_chars`. Returns `Ok(None)` when the page has no usable text.
    pub async fn fetch_full_content(&self, article_url: &str) -> Result<Option<String>> {
        let response = self.client.get(article_url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::HttpStatus {
                url: article_url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let html = response.text().await?;

        Ok(extract_content(&html).map(|text| truncate(text, self.max_chars)))
    }

    /// Best-effort variant: failures are logged and reported as no content.
    pub async fn enrich(&self, article_url: &str) -> Option<String> {
        match self.fetch_full_content(article_url).await {
            Ok(Some(content)) => Some(content),
            Ok(None) => {
                tracing::debug!(link = %article_url, "No article text extracted");
                None
            }
            Err(e) => {
                tracing::warn!(link = %article_url, error = %e, "Content extraction failed");
                None
            }
        }
    }
}

fn truncate(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text,
    }
}

/// Extract readable content from an HTML page.
///
/// Prefers an explicit article container, then the element holding the most
/// paragraph text, and finally falls back to converting the whole page, minus
/// its chrome, with html2text.
pub fn extract_content(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let main = find_main_container(&document)
        .map(|container| paragraph_text(&container))
        .filter(|t| t.chars().count() >= MIN_CONTENT_CHARS);
    let text = match main {
        Some(text) => text,
        None => whole_page_text(document)?,
    };

    if text.chars().count() >= MIN_CONTENT_CHARS {
        Some(text)
    } else {
        tracing::debug!("Extracted content too short ({} chars)", text.chars().count());
        None
    }
}

fn find_main_container(document: &Html) -> Option<ElementRef<'_>> {
    for raw in ARTICLE_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        let best = document
            .select(&selector)
            .filter(|el| !is_boilerplate(el))
            .max_by_key(paragraph_chars);
        if let Some(el) = best.filter(|el| paragraph_chars(el) > 0) {
            return Some(el);
        }
    }

    // No explicit container: score every block by the paragraph text it
    // directly holds.
    let blocks = Selector::parse("div, section, td").ok()?;
    let p = Selector::parse("p").ok()?;
    document
        .select(&blocks)
        .filter(|el| !is_boilerplate(el))
        .map(|el| {
            let direct: usize = el
                .select(&p)
                .filter(|para| para.parent().and_then(ElementRef::wrap) == Some(el))
                .filter(|para| !inside_boilerplate(para, &el))
                .map(|para| text_of(&para).chars().count())
                .sum();
            (el, direct)
        })
        .filter(|(_, score)| *score > 0)
        .max_by_key(|(_, score)| *score)
        .map(|(el, _)| el)
}

fn is_boilerplate(el: &ElementRef) -> bool {
    let value = el.value();
    match value.name() {
        // page-wide classes (`comments-open`, `has-sidebar`) say nothing
        // about the content
        "html" | "body" => return false,
        name if BOILERPLATE.contains(&name) => return true,
        _ => {}
    }
    let marker = format!(
        "{} {}",
        value.attr("class").unwrap_or_default(),
        value.id().unwrap_or_default()
    )
    .to_lowercase();
    BOILERPLATE_HINTS.iter().any(|hint| marker.contains(hint))
}

/// Whether `el`, or anything between it and `container`, is page chrome.
fn inside_boilerplate(el: &ElementRef, container: &ElementRef) -> bool {
    let stop = container.id();
    is_boilerplate(el)
        || el
            .ancestors()
            .take_while(|node| node.id() != stop)
            .filter_map(ElementRef::wrap)
            .any(|ancestor| is_boilerplate(&ancestor))
}

fn text_of(el: &ElementRef) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text blocks of `container` in document order. A block nested inside one
/// already taken (an `li` in a `blockquote`) is part of that block's text.
fn paragraph_blocks(container: &ElementRef) -> Vec<String> {
    let Ok(selector) = Selector::parse("p, h2, h3, blockquote, li") else {
        return Vec::new();
    };

    let mut taken = HashSet::new();
    let mut blocks = Vec::new();
    for block in container.select(&selector) {
        if inside_boilerplate(&block, container)
            || block.ancestors().any(|node| taken.contains(&node.id()))
        {
            continue;
        }
        let text = text_of(&block);
        if text.is_empty() {
            continue;
        }
        taken.insert(block.id());
        blocks.push(text);
    }
    blocks
}

fn paragraph_chars(el: &ElementRef) -> usize {
    paragraph_blocks(el).iter().map(|t| t.chars().count()).sum()
}

fn paragraph_text(el: &ElementRef) -> String {
    paragraph_blocks(el).join("\n\n")
}

fn whole_page_text(mut document: Html) -> Option<String> {
    let all = Selector::parse("*").ok()?;
    let chrome: Vec<_> = document
        .select(&all)
        .filter(is_boilerplate)
        .map(|el| el.id())
        .collect();
    for id in chrome {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    let text = match html2text::from_read(document.html().as_bytes(), 100) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!("Failed to convert HTML to text: {}", e);
            return None;
        }
    };

    // Clean up the text - remove excessive whitespace
    let cleaned: String = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    Some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(n: usize) -> String {
        format!("This is sentence number {n} of a reasonably long news story about things. ")
    }

    fn story(paragraphs: usize) -> String {
        (0..paragraphs)
            .map(|i| format!("<p>{}</p>", sentence(i).repeat(2)))
            .collect()
    }

    #[test]
    fn prefers_article_container_and_drops_chrome() {
        let html = format!(
            r#"<html><body>
                <nav><p>Home | World | Sport | Weather and a very long navigation blurb</p></nav>
                <div class="sidebar"><p>{}</p></div>
                <article>
                  <h1>Headline</h1>
                  {}
                  <div class="share-tools"><p>Share this on every network you know</p></div>
                </article>
                <footer><p>Copyright footer text</p></footer>
            </body></html>"#,
            sentence(99).repeat(10),
            story(4)
        );
        let text = extract_content(&html).unwrap();
        assert!(text.contains("sentence number 0"));
        assert!(text.contains("sentence number 3"));
        assert!(!text.contains("navigation blurb"));
        assert!(!text.contains("Share this"));
        assert!(!text.contains("Copyright"));
        assert!(!text.contains("sentence number 99"));
    }

    #[test]
    fn scores_blocks_without_semantic_markup() {
        let html = format!(
            r#"<html><body>
                <div id="top"><p>Short teaser</p></div>
                <div id="story">{}</div>
                <div class="comments">{}</div>
            </body></html>"#,
            story(5),
            story(8)
        );
        let text = extract_content(&html).unwrap();
        assert!(text.contains("sentence number 4"));
        assert!(!text.contains("Short teaser"));
        assert_eq!(text.matches("sentence number 0").count(), 2);
    }

    #[test]
    fn short_pages_yield_nothing() {
        assert_eq!(extract_content("<html><body><p>Hi</p></body></html>"), None);
        assert_eq!(extract_content(""), None);
    }

    #[test]
    fn falls_back_to_whole_page_text() {
        let html = format!("<html><body><span>{}</span></body></html>", sentence(1).repeat(5));
        let text = extract_content(&html).unwrap();
        assert!(text.contains("sentence number 1"));
    }

    #[test]
    fn repeated_paragraphs_are_all_kept() {
        let paragraph = "Full article text that repeats itself across the page.";
        let html = format!(
            "<html><body><nav><p>Menu</p></nav><article>{}</article></body></html>",
            (0..6).map(|_| format!("<p>{paragraph}</p>")).collect::<String>()
        );
        let text = extract_content(&html).unwrap();
        assert_eq!(text.matches(paragraph).count(), 6);
        assert!(!text.contains("Menu"));
    }

    #[test]
    fn nested_blocks_are_not_repeated() {
        let html = format!(
            "<html><body><article>{}<blockquote><p>Quoted line inside</p></blockquote></article></body></html>",
            story(4)
        );
        let text = extract_content(&html).unwrap();
        assert_eq!(text.matches("Quoted line inside").count(), 1);
    }

    #[test]
    fn body_classes_do_not_hide_the_article() {
        let html = format!(
            r#"<html><body class="single-post comments-open has-sidebar">
                <nav><p>NAVLINK to every section of the site</p></nav>
                <article>{}</article>
                <footer><p>FOOTER</p></footer>
            </body></html>"#,
            story(5)
        );
        let text = extract_content(&html).unwrap();
        assert!(text.contains("sentence number 4"));
        assert!(!text.contains("NAVLINK"));
        assert!(!text.contains("FOOTER"));
    }

    #[test]
    fn whole_page_fallback_drops_chrome() {
        let html = format!(
            "<html><body><nav>NAVLINK</nav><span>{}</span><footer>FOOTER</footer></body></html>",
            sentence(1).repeat(5)
        );
        let text = extract_content(&html).unwrap();
        assert!(text.contains("sentence number 1"));
        assert!(!text.contains("NAVLINK"));
        assert!(!text.contains("FOOTER"));
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate("ééééé".to_string(), 3), "ééé");
        assert_eq!(truncate("abc".to_string(), 10), "abc");
    }
}
