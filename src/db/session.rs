use std::collections::HashSet;
use std::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{NewArticle, NewUpdateLog};

use super::Repository;

#[derive(Default)]
struct Staged {
    links: HashSet<String>,
    articles: Vec<NewArticle>,
    logs: Vec<NewUpdateLog>,
}

/// Unit of work for one ingestion cycle.
///
/// Articles and update logs are staged in memory while sources are processed
/// and written together by [`CycleSession::commit`]. Dropping a session
/// without committing discards everything staged.
pub struct CycleSession<'a> {
    repo: &'a Repository,
    staged: Mutex<Staged>,
}

impl<'a> CycleSession<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            staged: Mutex::new(Staged::default()),
        }
    }

    fn staged(&self) -> std::sync::MutexGuard<'_, Staged> {
        // A poisoned lock only means another source panicked mid-push; the
        // staged vectors are still consistent.
        self.staged.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True if the link is already stored or staged earlier in this cycle.
    pub async fn exists(&self, link: &str) -> Result<bool> {
        let staged = self.staged().links.contains(link);
        if staged {
            return Ok(true);
        }
        self.repo.article_exists(link).await
    }

    /// Stage an article for insertion. Returns false if another source
    /// already staged the same link during this cycle.
    pub fn insert(&self, article: NewArticle) -> bool {
        let mut staged = self.staged();
        if !staged.links.insert(article.link.clone()) {
            return false;
        }
        staged.articles.push(article);
        true
    }

    pub fn append_log(&self, log: NewUpdateLog) {
        self.staged().logs.push(log);
    }

    pub fn pending_articles(&self) -> usize {
        self.staged().articles.len()
    }

    pub fn pending_logs(&self) -> usize {
        self.staged().logs.len()
    }

    /// Persist everything staged in one transaction. On failure the
    /// transaction is rolled back and nothing from this cycle is stored.
    pub async fn commit(self) -> Result<usize> {
        let staged = self
            .staged
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.repo
            .commit_cycle(staged.articles, staged.logs)
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{now_naive_utc, NewCategory, NewSource};

    async fn repo_with_source() -> (Repository, i64, i64) {
        let repo = Repository::in_memory().await.unwrap();
        let category_id = repo
            .insert_category(NewCategory {
                name: "world".into(),
                display_name: "World".into(),
                description: None,
            })
            .await
            .unwrap();
        let source_id = repo
            .insert_source(NewSource {
                name: "Wire".into(),
                url: "https://wire.example.com".into(),
                feed_url: "https://wire.example.com/feed".into(),
                category_id,
            })
            .await
            .unwrap();
        (repo, category_id, source_id)
    }

    fn candidate(link: &str, source_id: i64, category_id: i64) -> NewArticle {
        NewArticle {
            title: "t".into(),
            description: String::new(),
            content: None,
            link: link.into(),
            image_url: None,
            published_at: now_naive_utc(),
            guid: link.into(),
            source_id,
            category_id,
        }
    }

    #[tokio::test]
    async fn staged_links_count_as_existing() {
        let (repo, category_id, source_id) = repo_with_source().await;
        let session = CycleSession::new(&repo);

        assert!(!session.exists("https://wire.example.com/1").await.unwrap());
        assert!(session.insert(candidate("https://wire.example.com/1", source_id, category_id)));
        assert!(session.exists("https://wire.example.com/1").await.unwrap());
        assert!(!session.insert(candidate("https://wire.example.com/1", source_id, category_id)));
        assert_eq!(session.pending_articles(), 1);

        // nothing hits the database before commit
        assert!(!repo.article_exists("https://wire.example.com/1").await.unwrap());

        session.append_log(NewUpdateLog::success(source_id, 1, 1));
        assert_eq!(session.commit().await.unwrap(), 1);
        assert!(repo.article_exists("https://wire.example.com/1").await.unwrap());
    }

    #[tokio::test]
    async fn dropping_a_session_discards_everything() {
        let (repo, category_id, source_id) = repo_with_source().await;
        let session = CycleSession::new(&repo);
        session.insert(candidate("https://wire.example.com/2", source_id, category_id));
        session.append_log(NewUpdateLog::error(source_id, "boom"));
        assert_eq!(session.pending_logs(), 1);
        drop(session);

        assert!(!repo.article_exists("https://wire.example.com/2").await.unwrap());
        assert!(repo.recent_update_logs(None, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_failure_is_a_persistence_error() {
        let (repo, category_id, _) = repo_with_source().await;
        let session = CycleSession::new(&repo);
        // unknown source id violates the foreign key
        session.insert(candidate("https://wire.example.com/3", 9999, category_id));

        let err = session.commit().await.unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        assert!(!repo.article_exists("https://wire.example.com/3").await.unwrap());
    }
}
