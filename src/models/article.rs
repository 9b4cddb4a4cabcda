use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub link: String,
    pub image_url: Option<String>,
    pub published_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub category_id: i64,
    pub source_id: i64,
    pub is_active: bool,
    pub view_count: i64,
    pub guid: Option<String>,
}

/// A normalized feed entry, ready for dedup and insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArticle {
    pub title: String,
    pub description: String,
    pub content: Option<String>,
    pub link: String,
    pub image_url: Option<String>,
    pub published_at: NaiveDateTime,
    pub guid: String,
    pub source_id: i64,
    pub category_id: i64,
}

/// Public JSON shape of an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleView {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub link: String,
    pub image_url: Option<String>,
    /// ISO-8601 without offset, always UTC.
    pub published_at: String,
    pub category: String,
    pub category_display: String,
    pub source: String,
    pub view_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleQuery {
    pub active: Option<bool>,
    pub published_since: Option<NaiveDateTime>,
    pub category_id: Option<i64>,
    pub source_id: Option<i64>,
    /// 1-based.
    pub page: u32,
    pub per_page: u32,
}

impl ArticleQuery {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const MAX_PER_PAGE: u32 = 100;
    pub const RECENT_DAYS: i64 = 7;

    /// Active articles published within the last week, the listing pages' default.
    pub fn recent() -> Self {
        Self {
            active: Some(true),
            published_since: Some(super::now_naive_utc() - chrono::Duration::days(Self::RECENT_DAYS)),
            ..Self::default()
        }
    }

    pub fn category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn source(mut self, source_id: i64) -> Self {
        self.source_id = Some(source_id);
        self
    }

    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }

    pub fn effective_page(&self) -> u32 {
        self.page.max(1)
    }

    pub fn effective_per_page(&self) -> u32 {
        self.per_page.clamp(1, Self::MAX_PER_PAGE)
    }

    /// Rows skipped before this page. Widened so any page number is valid.
    pub fn offset(&self) -> u64 {
        u64::from(self.effective_page() - 1) * u64::from(self.effective_per_page())
    }
}

impl Default for ArticleQuery {
    fn default() -> Self {
        Self {
            active: None,
            published_since: None,
            category_id: None,
            source_id: None,
            page: 1,
            per_page: Self::DEFAULT_PER_PAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub pages: u32,
    pub per_page: u32,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub name: String,
    pub display_name: String,
    pub article_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_articles: u64,
    pub total_sources: u64,
    pub categories: Vec<CategoryStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_is_clamped() {
        let query = ArticleQuery::default().page(0, 500);
        assert_eq!(query.effective_page(), 1);
        assert_eq!(query.effective_per_page(), 100);

        let query = ArticleQuery::default().page(3, 0);
        assert_eq!(query.effective_page(), 3);
        assert_eq!(query.effective_per_page(), 1);
        assert_eq!(query.offset(), 2);

        let query = ArticleQuery::default().page(u32::MAX, 100);
        assert_eq!(query.offset(), u64::from(u32::MAX - 1) * 100);
    }

    #[test]
    fn recent_window_is_one_week() {
        let query = ArticleQuery::recent();
        let since = query.published_since.unwrap();
        let age = crate::models::now_naive_utc() - since;
        assert!(age >= chrono::Duration::days(7));
        assert!(age < chrono::Duration::days(7) + chrono::Duration::minutes(1));
        assert_eq!(query.active, Some(true));
    }
}
