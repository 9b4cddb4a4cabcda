use std::sync::Arc;

use anyhow::{bail, Context};

use newsdesk::models::{now_naive_utc, ArticleQuery, NewCategory, NewSource};
use newsdesk::{Config, Ingestor, Repository, Scheduler};

const USAGE: &str = "usage: newsdesk [--refresh | --stats | --add-category <name> <display> | \
--add-source <name> <site_url> <feed_url> <category>]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging (LOG_LEVEL or config, overridable with RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Storage must be reachable before anything else runs
    let repository = Repository::new(&config.db_path)
        .await
        .with_context(|| format!("failed to open database at {}", config.db_path))?;

    match args.first().map(String::as_str) {
        None => serve(config, repository).await,
        Some("--refresh") => {
            let ingestor = Ingestor::new(&config, repository)?;
            let report = ingestor.run_cycle().await?;
            println!(
                "Refreshed {} sources ({} failed), {} new articles",
                report.sources, report.failed_sources, report.new_articles
            );
            Ok(())
        }
        Some("--stats") => {
            let since = now_naive_utc() - chrono::Duration::days(ArticleQuery::RECENT_DAYS);
            let stats = repository.stats(since).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Some("--add-category") if args.len() >= 3 => {
            let id = repository
                .insert_category(NewCategory {
                    name: args[1].clone(),
                    display_name: args[2].clone(),
                    description: args.get(3).cloned(),
                })
                .await?;
            println!("Added category {} (id {id})", args[1]);
            Ok(())
        }
        Some("--add-source") if args.len() >= 5 => {
            let Some(category) = repository.find_category(&args[4]).await? else {
                bail!("unknown category: {}", args[4]);
            };
            let id = repository
                .insert_source(NewSource {
                    name: args[1].clone(),
                    url: args[2].clone(),
                    feed_url: args[3].clone(),
                    category_id: category.id,
                })
                .await?;
            println!("Added source {} (id {id})", args[1]);
            Ok(())
        }
        Some(_) => bail!(USAGE),
    }
}

/// Run the startup cycle, then keep polling until Ctrl-C.
async fn serve(config: Config, repository: Repository) -> anyhow::Result<()> {
    let ingestor = Arc::new(Ingestor::new(&config, repository)?);
    let scheduler = Scheduler::start(Arc::clone(&ingestor), config.update_interval()).await;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");
    scheduler.stop().await?;
    Ok(())
}
