//! # Microblog Binary
//!
//! Admin entry point that assembles the store and the search backend chosen in
//! configuration. Search backends are compiled in through features.

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use mb_configs::{SearchBackend, Settings};
use mb_core::traits::SearchIndex;
use mb_db_sqlite::SqliteRepo;
use mb_services::Microblog;
use secrecy::ExposeSecret;
use tracing::info;

#[cfg(feature = "search-memory")]
use mb_search_memory::MemoryIndex;

#[cfg(feature = "search-elastic")]
use mb_search_elastic::ElasticIndex;

mod cli;
mod logging;

#[tokio::main]
async fn main() {
    if let Err(err) = start().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn start() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let settings = Settings::load().context("failed to load settings")?;
    logging::init(&settings.log)?;

    let repo = SqliteRepo::with_max_connections(settings.database.url.expose_secret(), settings.database.max_connections)
        .await
        .context("failed to open database")?;
    let index = search_index(&settings)?;

    let app = Microblog::new(Arc::new(repo), index)?.with_reindex_batch_size(settings.feed.reindex_batch_size);

    // The memory index starts empty on every run.
    if settings.search.backend == SearchBackend::Memory && !matches!(args.command, cli::Commands::Reindex) {
        let total = app.reindex().await.context("failed to warm memory index")?;
        info!(total, "memory index warmed");
    }

    let ctx = cli::CommandContext {
        app: &app,
        json: args.json,
        posts_per_page: settings.feed.posts_per_page,
    };
    args.command.invoke(&ctx).await.context("command failed")
}

fn search_index(settings: &Settings) -> anyhow::Result<Option<Arc<dyn SearchIndex>>> {
    let search = &settings.search;
    match search.backend {
        SearchBackend::None => Ok(None),

        #[cfg(feature = "search-memory")]
        SearchBackend::Memory => Ok(Some(Arc::new(MemoryIndex::new()))),

        #[cfg(feature = "search-elastic")]
        SearchBackend::Elastic => {
            let url = search.url.as_deref().context("search.url is required for elastic")?;
            let index = ElasticIndex::new(
                url,
                search.api_key.as_ref().map(|key| key.expose_secret()),
                std::time::Duration::from_secs(search.timeout_secs),
            )?;
            info!(url, "using elasticsearch index");
            Ok(Some(Arc::new(index)))
        }

        #[allow(unreachable_patterns)]
        other => anyhow::bail!("search backend {other:?} is not compiled into this binary"),
    }
}
