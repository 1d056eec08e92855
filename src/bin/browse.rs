use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;
use postfeed::{
    placeholder_posts, Config, DummyJsonSource, FeedSource, FeedStore, FeedView,
    InteractionCoordinator, LoadOutcome, MemorySource, PostId,
};

#[derive(Parser, Debug)]
struct Args {
    /// How many pages to load
    #[arg(long, default_value_t = 1)]
    pages: u32,

    /// Posts per page. Defaults to FEED_PAGE_SIZE, or 10
    #[arg(long)]
    page_size: Option<usize>,

    /// Serve placeholder posts from memory instead of calling the API
    #[arg(long)]
    offline: bool,

    /// Toggle the like on this post once the feed is loaded
    #[arg(long)]
    like: Option<String>,

    /// Toggle the share on this post once the feed is loaded
    #[arg(long)]
    share: Option<String>,

    /// Comment on this post once the feed is loaded, see `--text`
    #[arg(long, requires = "text")]
    comment: Option<String>,

    /// Comment text
    #[arg(long)]
    text: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = Config::load_env_config().context("Couldn't load configuration")?;
    let page_size = args.page_size.unwrap_or(config.page_size);
    if page_size == 0 {
        anyhow::bail!("--page-size must be at least 1");
    }

    if args.offline {
        let count = page_size * args.pages.max(1) as usize + page_size / 2;
        let source = MemorySource::new(placeholder_posts(count));
        run(Arc::new(source), &config, &args, page_size).await
    } else {
        info!("Using API at {}", config.api_base_url);
        let source = DummyJsonSource::new(&config);
        run(Arc::new(source), &config, &args, page_size).await
    }
}

async fn run<S: FeedSource>(
    source: Arc<S>,
    config: &Config,
    args: &Args,
    page_size: usize,
) -> Result<()> {
    let store = Arc::new(FeedStore::new(source, page_size));

    let view = FeedView::first_load(&store, page_size).await;
    if view.is_degraded() {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    for _ in 1..args.pages {
        if store.load_more().await? == LoadOutcome::Skipped {
            break;
        }
    }

    let coordinator = InteractionCoordinator::new(store.clone(), config);

    if let Some(id) = &args.like {
        let state = coordinator.toggle_like(&PostId(id.clone())).await?;
        println!("Like on {id}: {}", serde_json::to_string(&state)?);
    }

    if let Some(id) = &args.share {
        let outcome = coordinator.toggle_share(&PostId(id.clone())).await?;
        println!("Share on {id}: {}", serde_json::to_string(&outcome)?);
    }

    if let (Some(id), Some(text)) = (&args.comment, &args.text) {
        let comment = coordinator.add_comment(&PostId(id.clone()), text).await?;
        println!("Comment on {id}: {}", serde_json::to_string(&comment)?);
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&FeedView::Live(store.snapshot()))?
    );
    Ok(())
}
