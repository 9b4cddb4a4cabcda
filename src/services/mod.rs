mod content_fetcher;

pub use content_fetcher::{extract_content, ContentFetcher};
