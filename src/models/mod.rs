mod article;
mod category;
mod source;
mod update_log;

pub use article::{Article, ArticleQuery, ArticleView, NewArticle, Page, Stats, CategoryStats};
pub use category::{Category, CategoryView, NewCategory};
pub use source::{NewSource, Source};
pub use update_log::{NewUpdateLog, UpdateLog, UpdateStatus};

/// Storage format for naive UTC timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current time as naive UTC, the representation every stored timestamp uses.
pub fn now_naive_utc() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}
