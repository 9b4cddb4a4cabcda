use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    Article, ArticleQuery, ArticleView, Category, CategoryStats, NewArticle, NewCategory,
    NewSource, NewUpdateLog, Page, Source, Stats, UpdateLog, TIMESTAMP_FORMAT,
};

use super::schema::SCHEMA;

const ARTICLE_VIEW_COLUMNS: &str = r#"a.id, a.title, a.description, a.link, a.image_url, a.published_at,
       c.name, c.display_name, s.name, a.view_count"#;

const ARTICLE_COLUMNS: &str = r#"id, title, description, content, link, image_url, published_at,
       created_at, updated_at, category_id, source_id, is_active, view_count, guid"#;

const SOURCE_COLUMNS: &str = "id, name, url, feed_url, category_id, is_active, created_at";

#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Category operations

    pub async fn insert_category(&self, category: NewCategory) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO categories (name, display_name, description) VALUES (?1, ?2, ?3)",
                    params![category.name, category.display_name, category.description],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let categories = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, display_name, description, created_at FROM categories ORDER BY id",
                )?;
                let categories = stmt
                    .query_map([], category_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(categories)
            })
            .await?;
        Ok(categories)
    }

    pub async fn find_category(&self, name: &str) -> Result<Option<Category>> {
        let name = name.to_string();
        let category = self
            .conn
            .call(move |conn| {
                let category = conn
                    .query_row(
                        "SELECT id, name, display_name, description, created_at FROM categories WHERE name = ?1",
                        params![name],
                        category_from_row,
                    )
                    .optional()?;
                Ok(category)
            })
            .await?;
        Ok(category)
    }

    // Source operations

    pub async fn insert_source(&self, source: NewSource) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO sources (name, url, feed_url, category_id) VALUES (?1, ?2, ?3, ?4)",
                    params![source.name, source.url, source.feed_url, source.category_id],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// Sources ordered by name; `active` filters on the active flag when given.
    pub async fn list_sources(&self, active: Option<bool>) -> Result<Vec<Source>> {
        let sources = self
            .conn
            .call(move |conn| {
                let sql = match active {
                    Some(_) => format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE is_active = ?1 ORDER BY name"),
                    None => format!("SELECT {SOURCE_COLUMNS} FROM sources ORDER BY name"),
                };
                let mut stmt = conn.prepare(&sql)?;
                let rows = match active {
                    Some(flag) => stmt.query_map(params![flag], source_from_row)?,
                    None => stmt.query_map([], source_from_row)?,
                };
                let sources = rows.collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(sources)
            })
            .await?;
        Ok(sources)
    }

    pub async fn get_source(&self, id: i64) -> Result<Option<Source>> {
        let source = self
            .conn
            .call(move |conn| {
                let source = conn
                    .query_row(
                        &format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?1"),
                        params![id],
                        source_from_row,
                    )
                    .optional()?;
                Ok(source)
            })
            .await?;
        Ok(source)
    }

    pub async fn set_source_active(&self, id: i64, is_active: bool) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE sources SET is_active = ?1 WHERE id = ?2",
                    params![is_active, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Ingestion

    pub async fn article_exists(&self, link: &str) -> Result<bool> {
        let link = link.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let found = conn
                    .query_row(
                        "SELECT 1 FROM articles WHERE link = ?1",
                        params![link],
                        |_| Ok(()),
                    )
                    .optional()?;
                Ok(found.is_some())
            })
            .await?;
        Ok(exists)
    }

    /// Write one cycle's staged articles and update logs in a single
    /// transaction. Any failure rolls back every row of the batch.
    pub async fn commit_cycle(
        &self,
        articles: Vec<NewArticle>,
        logs: Vec<NewUpdateLog>,
    ) -> Result<usize> {
        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut insert_article = tx.prepare(
                        r#"INSERT INTO articles (title, description, content, link, image_url, published_at,
                                                 created_at, updated_at, category_id, source_id, guid)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8, ?9, ?10)"#,
                    )?;
                    let now = format_timestamp(&crate::models::now_naive_utc());
                    for article in &articles {
                        insert_article.execute(params![
                            article.title,
                            article.description,
                            article.content,
                            article.link,
                            article.image_url,
                            format_timestamp(&article.published_at),
                            now,
                            article.category_id,
                            article.source_id,
                            article.guid,
                        ])?;
                    }

                    let mut insert_log = tx.prepare(
                        r#"INSERT INTO update_logs (source_id, status, message, articles_count, created_at)
                           VALUES (?1, ?2, ?3, ?4, ?5)"#,
                    )?;
                    for log in &logs {
                        insert_log.execute(params![
                            log.source_id,
                            log.status.as_str(),
                            log.message,
                            log.articles_count,
                            format_timestamp(&log.created_at),
                        ])?;
                    }
                }
                // Dropping an uncommitted transaction rolls it back.
                tx.commit()?;
                Ok(articles.len())
            })
            .await?;
        Ok(inserted)
    }

    // Read-side queries

    pub async fn query_articles(&self, query: &ArticleQuery) -> Result<Page<ArticleView>> {
        let page = query.effective_page();
        let per_page = query.effective_per_page();
        let offset = i64::try_from(query.offset()).unwrap_or(i64::MAX);

        let mut clauses: Vec<&'static str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(active) = query.active {
            clauses.push("a.is_active = ?");
            values.push(Value::Integer(i64::from(active)));
        }
        if let Some(since) = query.published_since {
            clauses.push("a.published_at >= ?");
            values.push(Value::Text(format_timestamp(&since)));
        }
        if let Some(category_id) = query.category_id {
            clauses.push("a.category_id = ?");
            values.push(Value::Integer(category_id));
        }
        if let Some(source_id) = query.source_id {
            clauses.push("a.source_id = ?");
            values.push(Value::Integer(source_id));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let (total, items) = self
            .conn
            .call(move |conn| {
                let total: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM articles a {where_sql}"),
                    params_from_iter(values.iter()),
                    |row| row.get(0),
                )?;

                let mut page_values = values;
                page_values.push(Value::Integer(i64::from(per_page)));
                page_values.push(Value::Integer(offset));

                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {ARTICLE_VIEW_COLUMNS}
                       FROM articles a
                       JOIN categories c ON a.category_id = c.id
                       JOIN sources s ON a.source_id = s.id
                       {where_sql}
                       ORDER BY a.published_at DESC, a.id DESC
                       LIMIT ? OFFSET ?"#
                ))?;
                let items = stmt
                    .query_map(params_from_iter(page_values.iter()), article_view_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok((total, items))
            })
            .await?;

        let total = u64::try_from(total).unwrap_or_default();
        let pages = total.div_ceil(u64::from(per_page));
        Ok(Page {
            items,
            page,
            pages: u32::try_from(pages).unwrap_or(u32::MAX),
            per_page,
            total,
        })
    }

    pub async fn get_article(&self, id: i64) -> Result<Option<Article>> {
        let article = self
            .conn
            .call(move |conn| {
                let article = conn
                    .query_row(
                        &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?1"),
                        params![id],
                        article_from_row,
                    )
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    pub async fn find_article_by_link(&self, link: &str) -> Result<Option<Article>> {
        let link = link.to_string();
        let article = self
            .conn
            .call(move |conn| {
                let article = conn
                    .query_row(
                        &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE link = ?1"),
                        params![link],
                        article_from_row,
                    )
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    /// Bump the view counter. This is the only write the read side performs.
    pub async fn record_view(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE articles SET view_count = view_count + 1 WHERE id = ?1",
                    params![id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Recent active articles from the same category, newest first.
    pub async fn similar_articles(&self, article: &Article, limit: u32) -> Result<Vec<ArticleView>> {
        let id = article.id;
        let category_id = article.category_id;
        let since = ArticleQuery::recent()
            .published_since
            .map(|dt| format_timestamp(&dt))
            .unwrap_or_default();

        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {ARTICLE_VIEW_COLUMNS}
                       FROM articles a
                       JOIN categories c ON a.category_id = c.id
                       JOIN sources s ON a.source_id = s.id
                       WHERE a.category_id = ?1 AND a.is_active = 1 AND a.id != ?2
                             AND a.published_at >= ?3
                       ORDER BY a.published_at DESC
                       LIMIT ?4"#
                ))?;
                let articles = stmt
                    .query_map(params![category_id, id, since, limit], article_view_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn stats(&self, since: NaiveDateTime) -> Result<Stats> {
        let since = format_timestamp(&since);
        let stats = self
            .conn
            .call(move |conn| {
                let total_articles: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM articles WHERE is_active = 1 AND published_at >= ?1",
                    params![since],
                    |row| row.get(0),
                )?;
                let total_sources: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sources WHERE is_active = 1",
                    [],
                    |row| row.get(0),
                )?;

                let mut stmt = conn.prepare(
                    r#"SELECT c.name, c.display_name,
                              (SELECT COUNT(*) FROM articles a
                               WHERE a.category_id = c.id AND a.is_active = 1 AND a.published_at >= ?1)
                       FROM categories c
                       ORDER BY c.id"#,
                )?;
                let categories = stmt
                    .query_map(params![since], |row| {
                        Ok(CategoryStats {
                            name: row.get(0)?,
                            display_name: row.get(1)?,
                            article_count: u64::try_from(row.get::<_, i64>(2)?).unwrap_or_default(),
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                Ok(Stats {
                    total_articles: u64::try_from(total_articles).unwrap_or_default(),
                    total_sources: u64::try_from(total_sources).unwrap_or_default(),
                    categories,
                })
            })
            .await?;
        Ok(stats)
    }

    /// Most recent update logs, optionally for one source.
    pub async fn recent_update_logs(&self, source_id: Option<i64>, limit: u32) -> Result<Vec<UpdateLog>> {
        let logs = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, source_id, status, message, articles_count, created_at
                       FROM update_logs
                       WHERE ?1 IS NULL OR source_id = ?1
                       ORDER BY id DESC
                       LIMIT ?2"#,
                )?;
                let logs = stmt
                    .query_map(params![source_id, limit], update_log_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(logs)
            })
            .await?;
        Ok(logs)
    }
}

pub(crate) fn format_timestamp(dt: &NaiveDateTime) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    // SQLite datetime format (e.g., "2026-01-11 12:34:56"), optionally with fractions
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt);
    }
    // RFC3339 (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    None
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {raw}").into(),
        )
    })
}

fn category_from_row(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        description: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
    })
}

fn source_from_row(row: &Row) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        feed_url: row.get(3)?,
        category_id: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
        created_at: timestamp_column(row, 6)?,
    })
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        content: row.get(3)?,
        link: row.get(4)?,
        image_url: row.get(5)?,
        published_at: timestamp_column(row, 6)?,
        created_at: timestamp_column(row, 7)?,
        updated_at: timestamp_column(row, 8)?,
        category_id: row.get(9)?,
        source_id: row.get(10)?,
        is_active: row.get::<_, i64>(11)? != 0,
        view_count: row.get(12)?,
        guid: row.get(13)?,
    })
}

fn article_view_from_row(row: &Row) -> rusqlite::Result<ArticleView> {
    Ok(ArticleView {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        link: row.get(3)?,
        image_url: row.get(4)?,
        published_at: timestamp_column(row, 5)?
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string(),
        category: row.get(6)?,
        category_display: row.get(7)?,
        source: row.get(8)?,
        view_count: row.get(9)?,
    })
}

fn update_log_from_row(row: &Row) -> rusqlite::Result<UpdateLog> {
    let status: String = row.get(2)?;
    Ok(UpdateLog {
        id: row.get(0)?,
        source_id: row.get(1)?,
        status: status.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?,
        message: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        articles_count: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
    })
}
