//! Prometheus metrics exposition
//!
//! Batch-level metrics are recorded here; the pool crate records its own
//! per-lookup and per-credential series through the same global recorder:
//!
//! - `stats_batch_players_updated_total` (counter)
//! - `stats_batch_duration_seconds` (histogram): label `outcome`
//! - `stats_fetch_total` (counter, osu-pool): labels `mode`, `outcome`
//! - `pool_credential_suspended_total` (counter, osu-pool): label `credential`
//! - `pool_token_exchanges_total` (counter, osu-pool): label `result`

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Batch durations range from an empty pool (milliseconds) to a fully
/// backed-off run (tens of minutes).
const BATCH_DURATION_BUCKETS: &[f64] = &[
    0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0,
];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("stats_batch_duration_seconds".to_string()),
            BATCH_DURATION_BUCKETS,
        )
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a finished batch run.
pub fn record_batch(updated: usize, aborted: bool, duration_secs: f64) {
    metrics::counter!("stats_batch_players_updated_total").increment(updated as u64);
    let outcome = if aborted { "aborted" } else { "completed" };
    metrics::histogram!("stats_batch_duration_seconds", "outcome" => outcome)
        .record(duration_secs);
}
