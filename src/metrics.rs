use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up in snapshots before first use).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "watch_items_claimed_total",
            "Feed items admitted into the pipeline."
        );
        describe_counter!(
            "watch_items_duplicate_total",
            "Claim attempts rejected because the item was already admitted."
        );
        describe_counter!(
            "watch_items_cancelled_total",
            "Items removed from the feed before their label arrived."
        );
        describe_counter!("cache_hits_total", "Labels served from the cache.");
        describe_counter!("cache_misses_total", "Lookups that started a remote call.");
        describe_counter!(
            "cache_coalesced_total",
            "Lookups that attached to a remote call already in flight."
        );
        describe_counter!(
            "cache_storage_errors_total",
            "Durable cache reads or writes that failed."
        );
        describe_counter!("analysis_requests_total", "Remote classification calls.");
        describe_counter!(
            "analysis_failures_total",
            "Remote classification calls that failed."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder globally. Fails if a recorder is already set.
    pub fn install() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Prometheus exposition text of the current values.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
