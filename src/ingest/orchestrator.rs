use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::db::{CycleSession, Repository};
use crate::error::Result;
use crate::feed::{FeedFetcher, Normalizer};
use crate::models::{now_naive_utc, NewArticle, NewUpdateLog, Source};
use crate::services::ContentFetcher;

/// Summary of one ingestion cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sources: usize,
    pub failed_sources: usize,
    pub new_articles: usize,
}

/// Runs ingestion cycles: every active source is fetched, normalized,
/// deduplicated, optionally enriched and staged, then the whole cycle is
/// committed at once.
pub struct Ingestor {
    repo: Repository,
    fetcher: FeedFetcher,
    normalizer: Normalizer,
    enricher: Option<ContentFetcher>,
    source_concurrency: usize,
    cycle_lock: Mutex<()>,
}

impl Ingestor {
    pub fn new(config: &Config, repo: Repository) -> Result<Self> {
        let fetcher = FeedFetcher::new(config.feed_timeout(), config.max_articles_per_source)?;
        let enricher = if config.enrich_content {
            Some(ContentFetcher::new(config.page_timeout(), config.content_max_chars)?)
        } else {
            None
        };

        Ok(Self {
            repo,
            fetcher,
            normalizer: Normalizer::new(config.description_max_chars),
            enricher,
            source_concurrency: config.source_concurrency.max(1),
            cycle_lock: Mutex::new(()),
        })
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn is_running(&self) -> bool {
        self.cycle_lock.try_lock().is_err()
    }

    /// Run one cycle over all active sources. Cycles never overlap: a call
    /// made while another cycle is in progress waits for it to finish.
    ///
    /// Per-source failures are recorded as `error` update logs and do not
    /// fail the cycle. Only a failed commit is returned as an error, in
    /// which case nothing from this cycle is stored.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let _guard = self.cycle_lock.lock().await;
        tracing::info!("Starting news update");

        let sources = self.repo.list_sources(Some(true)).await?;
        let session = CycleSession::new(&self.repo);

        let outcomes: Vec<Option<usize>> = stream::iter(sources.iter().cloned())
            .map(|source| {
                let session = &session;
                async move { self.run_source_guarded(&source, session).await }
            })
            .buffer_unordered(self.source_concurrency)
            .collect()
            .await;

        let report = CycleReport {
            sources: sources.len(),
            failed_sources: outcomes.iter().filter(|o| o.is_none()).count(),
            new_articles: outcomes.iter().flatten().sum(),
        };

        tracing::debug!(
            articles = session.pending_articles(),
            logs = session.pending_logs(),
            "Saving news update"
        );
        if let Err(e) = session.commit().await {
            tracing::error!(error = %e, "Failed to save news update");
            return Err(e);
        }

        tracing::info!(
            sources = report.sources,
            failed = report.failed_sources,
            new_articles = report.new_articles,
            "News update complete"
        );
        Ok(report)
    }

    async fn run_source_guarded(&self, source: &Source, session: &CycleSession<'_>) -> Option<usize> {
        guarded(source, session, self.run_source(source, session)).await
    }

    async fn run_source(&self, source: &Source, session: &CycleSession<'_>) -> Result<usize> {
        let entries = self.fetcher.fetch_entries(source).await?;
        let now = now_naive_utc();

        let mut processed = 0;
        let mut seen = HashSet::new();
        let mut pending: Vec<NewArticle> = Vec::new();

        for entry in &entries {
            let mut candidate = match self.normalizer.normalize(entry, source, now) {
                Ok(candidate) => candidate,
                Err(e) => {
                    tracing::warn!(source = %source.name, error = %e, "Skipping feed entry");
                    continue;
                }
            };
            processed += 1;

            if !seen.insert(candidate.link.clone()) || session.exists(&candidate.link).await? {
                continue;
            }

            if let Some(enricher) = &self.enricher {
                candidate.content = enricher.enrich(&candidate.link).await;
            }
            pending.push(candidate);
        }

        // Stage only once the whole source succeeded, so a failing source
        // leaves nothing behind but its error log.
        let mut inserted = 0;
        for article in pending {
            if session.insert(article) {
                inserted += 1;
            }
        }

        tracing::info!(source = %source.name, processed, new = inserted, "Source updated");
        session.append_log(NewUpdateLog::success(source.id, processed, inserted));
        Ok(inserted)
    }
}

/// Await one source's work, converting any error or panic into an `error`
/// update log. Returns the number of staged articles on success.
async fn guarded<F>(source: &Source, session: &CycleSession<'_>, work: F) -> Option<usize>
where
    F: Future<Output = Result<usize>>,
{
    let reason = match AssertUnwindSafe(work).catch_unwind().await {
        Ok(Ok(inserted)) => return Some(inserted),
        Ok(Err(e)) => e.to_string(),
        Err(panic) => panic_message(panic.as_ref()),
    };

    tracing::error!(source = %source.name, error = %reason, "Failed to update source");
    session.append_log(NewUpdateLog::error(source.id, reason));
    None
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panic: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panic: {msg}")
    } else {
        "panic while processing source".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{NewCategory, NewSource, UpdateStatus};

    async fn registered_source(repo: &Repository) -> Source {
        let category_id = repo
            .insert_category(NewCategory {
                name: "world".into(),
                display_name: "World".into(),
                description: None,
            })
            .await
            .unwrap();
        let id = repo
            .insert_source(NewSource {
                name: "Wire".into(),
                url: "https://wire.example.com".into(),
                feed_url: "https://wire.example.com/feed".into(),
                category_id,
            })
            .await
            .unwrap();
        repo.get_source(id).await.unwrap().unwrap()
    }

    async fn exploding_source() -> Result<usize> {
        panic!("feed exploded")
    }

    async fn failing_source() -> Result<usize> {
        Err(AppError::Normalization("no entries".into()))
    }

    async fn healthy_source() -> Result<usize> {
        Ok(3)
    }

    #[tokio::test]
    async fn panics_and_errors_become_error_logs() {
        let repo = Repository::in_memory().await.unwrap();
        let source = registered_source(&repo).await;
        let session = CycleSession::new(&repo);

        assert_eq!(guarded(&source, &session, exploding_source()).await, None);
        assert_eq!(guarded(&source, &session, failing_source()).await, None);
        assert_eq!(guarded(&source, &session, healthy_source()).await, Some(3));
        assert_eq!(session.pending_logs(), 2);

        session.commit().await.unwrap();
        let logs = repo.recent_update_logs(Some(source.id), 10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.status == UpdateStatus::Error && l.articles_count == 0));
        // newest first
        assert_eq!(logs[1].message, "Error: panic: feed exploded");
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("bad entry");
        assert_eq!(panic_message(payload.as_ref()), "panic: bad entry");

        let payload: Box<dyn Any + Send> = Box::new(String::from("worse"));
        assert_eq!(panic_message(payload.as_ref()), "panic: worse");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "panic while processing source");
    }
}
