//! Prometheus exposition after a short pipeline run. One test per binary: the recorder
//! is process-global.

use std::sync::Arc;
use std::time::Duration;

use misinfo_watch::metrics::Metrics;
use misinfo_watch::{CacheStore, Feed, MockClassifier, Node, WatchConfig, Watcher};

fn tweet(text: &str) -> misinfo_watch::feed::NodeBuilder {
    Node::element("article").child(Node::element("div").attr("lang", "en").text(text))
}

#[tokio::test]
async fn pipeline_counters_are_exported() {
    let metrics = Metrics::install().expect("recorder installs once");

    let mock = Arc::new(MockClassifier::keyword_demo().with_failure("broken"));
    let watcher = Watcher::new(&WatchConfig::default(), mock, CacheStore::in_memory());
    let mut events = watcher.subscribe_events();
    let feed = Feed::new();
    let timeline = feed.append(feed.root(), Node::element("section"));
    watcher.start(&feed, timeline.clone()).expect("start");

    feed.append(&timeline, tweet("The earth is flat"));
    feed.append(&timeline, tweet("The earth is flat"));
    feed.append(&timeline, tweet("broken request"));

    let mut terminal = 0;
    tokio::time::timeout(Duration::from_secs(5), async {
        while terminal < 3 {
            if events.recv().await.expect("event").is_terminal() {
                terminal += 1;
            }
        }
    })
    .await
    .expect("pipeline settled");

    let text = metrics.render();
    for needle in [
        "watch_items_claimed_total 3",
        "cache_misses_total 2",
    ] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }
    // The second identical item either coalesced or hit the memo.
    assert!(text.contains("cache_hits_total 1") || text.contains("cache_coalesced_total 1"));
}
