use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A registered news source. Sources are created by the admin surface; the
/// ingestion cycle only reads the active ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    pub name: String,
    /// Site URL, used to resolve root-relative image paths.
    pub url: String,
    pub feed_url: String,
    pub category_id: i64,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewSource {
    pub name: String,
    pub url: String,
    pub feed_url: String,
    pub category_id: i64,
}
