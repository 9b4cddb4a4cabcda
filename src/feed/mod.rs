mod entry;
mod fetcher;
mod normalize;

pub use entry::{MediaRef, RawEntry};
pub use fetcher::{parse_feed, FeedFetcher, BROWSER_USER_AGENT};
pub use normalize::{parse_published, Normalizer, UNTITLED};
