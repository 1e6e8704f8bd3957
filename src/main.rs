//! misinfo-watch — CLI entrypoint.
//! `analyze` classifies one text on demand; `simulate` drives an in-memory feed through a
//! watcher and prints the resulting badges.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use misinfo_watch::analyze::build_classifier;
use misinfo_watch::annotate::badge_for;
use misinfo_watch::feed::{Mutation, NodeBuilder};
use misinfo_watch::metrics::Metrics;
use misinfo_watch::{
    CacheStore, Feed, Indicator, ItemEvent, MockClassifier, Node, WatchConfig, Watcher,
};

#[derive(Parser)]
#[command(name = "misinfo-watch", version, about)]
struct Cli {
    /// Config file (defaults to $MISINFO_CONFIG_PATH, then config/misinfo.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify one text and print the verdict with details
    Analyze {
        text: String,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run sample items through a watcher over an in-memory feed
    Simulate {
        /// Use the keyword mock instead of the remote service
        #[arg(long)]
        mock: bool,
        /// Seconds to wait for the pipeline to settle
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
}

/// RUST_LOG controls verbosity; MISINFO_LOG_JSON=1 switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("misinfo_watch=info,warn"));
    let json = std::env::var("MISINFO_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

fn load_config(path: Option<PathBuf>) -> Result<WatchConfig> {
    match path {
        Some(p) => Ok(WatchConfig::load_from_file(p)?.with_env_overrides()),
        None => WatchConfig::load_default(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let cfg = load_config(cli.config)?;

    match cli.command {
        Command::Analyze { text, json } => analyze(&cfg, &text, json).await,
        Command::Simulate { mock, timeout_secs } => {
            simulate(&cfg, mock, Duration::from_secs(timeout_secs)).await
        }
    }
}

async fn analyze(cfg: &WatchConfig, text: &str, json: bool) -> Result<()> {
    let text = text.trim();
    if text.is_empty() {
        bail!("text is empty");
    }
    let client = build_classifier(cfg)?;
    let report = client
        .analyze(text)
        .await
        .with_context(|| format!("analyzing via {}", cfg.endpoint))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in report.detail_lines() {
            println!("{line}");
        }
    }
    Ok(())
}

fn tweet(text: &str) -> NodeBuilder {
    Node::element("article").child(
        Node::element("div")
            .child(Node::element("div").attr("lang", "en").text(text))
            .child(Node::element("div").attr("role", "group")),
    )
}

async fn simulate(cfg: &WatchConfig, mock: bool, timeout: Duration) -> Result<()> {
    let metrics = Metrics::install()?;
    let watcher = if mock {
        Watcher::new(
            cfg,
            Arc::new(MockClassifier::keyword_demo()),
            CacheStore::in_memory(),
        )
    } else {
        Watcher::from_config(cfg)?
    };
    let mut events = watcher.subscribe_events();

    let feed = Feed::new();
    let timeline = feed.append(
        feed.root(),
        Node::element("section").attr("aria-label", "Timeline"),
    );
    feed.append(&timeline, tweet("Water boils at 100 degrees Celsius at sea level."));

    watcher.start(&feed, timeline.clone())?;
    let scanned = watcher.scan(&timeline);

    // One inserted subtree carrying several items, two of them with identical text.
    let page = Node::element("div")
        .child(tweet("Vaccines cause autism"))
        .child(tweet("Vaccines cause autism"))
        .child(tweet("I think pineapple belongs on pizza."))
        .build();
    feed.apply(vec![Mutation::Append {
        parent: timeline.clone(),
        child: page,
    }]);
    settle(&mut events, scanned + 3, timeout).await?;

    // Re-rendered item: served from the cache.
    feed.append(&timeline, tweet("Vaccines cause autism"));
    settle(&mut events, 1, timeout).await?;

    watcher.stop().await?;

    let annotator = watcher.annotator();
    for item in timeline
        .descendants()
        .iter()
        .filter_map(|n| watcher.shape().to_item(n))
    {
        let badge = match annotator.current(&item) {
            Some(Indicator::Final(l)) => badge_for(l)
                .map(|b| format!("{} [{}]", b.text, b.color.as_str()))
                .unwrap_or_default(),
            Some(Indicator::Pending) => "pending".to_string(),
            None => "-".to_string(),
        };
        println!("{:<22} {}", badge, item.text);
    }
    println!();
    println!("{}", metrics.render());
    Ok(())
}

/// Waits until `expected` items reached a terminal event.
async fn settle(
    events: &mut broadcast::Receiver<ItemEvent>,
    expected: usize,
    timeout: Duration,
) -> Result<()> {
    let mut done = HashSet::new();
    let wait = async {
        while done.len() < expected {
            match events.recv().await {
                Ok(ev) if ev.is_terminal() => {
                    done.insert(ev.node());
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    tokio::time::timeout(timeout, wait)
        .await
        .context("pipeline did not settle in time")?;
    Ok(())
}
