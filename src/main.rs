use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use reaper::storage::{Category, Database, Source, Tag};
use reaper::{Config, ScanContext, ScanScheduler};

#[derive(Parser, Debug)]
#[command(name = "reaper", about = "Feed ingestion daemon for RSS, Atom and RDF sources")]
struct Args {
    /// Configuration file
    #[arg(long, value_name = "FILE", default_value = "reaper.toml")]
    config: PathBuf,

    /// Run a single scan cycle, wait for its imports, then exit
    #[arg(long)]
    once: bool,

    /// Register a source and exit
    #[arg(long, num_args = 3, value_names = ["NAME", "HOMEPAGE", "FEED_URL"])]
    add_source: Option<Vec<String>>,

    /// Create or update a category with comma-separated tags and exit
    #[arg(long, num_args = 2, value_names = ["NAME", "TAGS"])]
    add_category: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from '{}'", args.config.display()))?;

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let db_path = config
        .database_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = Database::open(db_path)
        .await
        .with_context(|| format!("Failed to open database '{}'", db_path))?;

    if let Some(fields) = &args.add_source {
        let [name, homepage, feed_url] = fields.as_slice() else {
            anyhow::bail!("--add-source takes NAME HOMEPAGE FEED_URL");
        };
        reaper::util::parse_http_url(feed_url).context("Invalid feed URL")?;
        let id = db
            .insert_source(&Source::new(name, homepage, feed_url))
            .await
            .context("Failed to add source")?;
        println!("Source {} registered as #{}", name, id);
        return Ok(());
    }

    if let Some(fields) = &args.add_category {
        let [name, tags] = fields.as_slice() else {
            anyhow::bail!("--add-category takes NAME TAGS");
        };
        let category = Category {
            tags: Tag::parse_list(tags),
            ..Category::new(0, name)
        };
        let id = db
            .insert_category(&category)
            .await
            .context("Failed to add category")?;
        println!("Category {} saved as #{} ({} tags)", name, id, category.tags.len());
        return Ok(());
    }

    std::fs::create_dir_all(&config.media_cache_path).with_context(|| {
        format!(
            "Failed to create media cache '{}'",
            config.media_cache_path.display()
        )
    })?;

    let db = Arc::new(db);
    let context = ScanContext::new(config, db.clone(), db).context("Failed to build HTTP client")?;
    let scheduler = Arc::new(ScanScheduler::new(Arc::new(context)));

    if args.once {
        let summary = scheduler.run_once().await?;
        tracing::info!(
            fetched = summary.sources_fetched,
            skipped = summary.sources_skipped,
            items = summary.items_persisted,
            "Single scan complete"
        );
        return Ok(());
    }

    {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                return;
            }
            tracing::info!("Stop requested, finishing current cycle");
            scheduler.stop();
        });
    }

    let summary = scheduler.start().await?;
    println!(
        "Stopped after {} cycles, {} items stored",
        summary.cycles, summary.items_persisted
    );
    Ok(())
}
