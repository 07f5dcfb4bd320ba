//! Counters for catalog mutation and ingestion sessions.
//!
//! Everything goes through the `metrics` facade. Nothing here installs a recorder, so with no
//! exporter configured the calls are no-ops.

/// Build a metric name with the crate prefix and phase.
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("bh_catalog_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("bh_catalog_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;

/// Metrics for the fact store.
pub struct CatalogMetrics;

impl CatalogMetrics {
    pub fn record_entry_created() {
        ::metrics::counter!(phase_metric!(counter, "catalog", "entries_created")).increment(1);
    }

    pub fn record_alias_added() {
        ::metrics::counter!(phase_metric!(counter, "catalog", "aliases_added")).increment(1);
    }

    pub fn record_fact_stored(key: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "catalog", "facts_stored"),
            "key" => key.to_string()
        )
        .increment(1);
    }

    pub fn record_fact_duplicate() {
        ::metrics::counter!(phase_metric!(counter, "catalog", "facts_duplicate")).increment(1);
    }

    /// A malformed fact or photometry point was rejected under the failure policy.
    pub fn record_fact_rejected(policy: &'static str) {
        ::metrics::counter!(
            phase_metric!(counter, "catalog", "facts_rejected"),
            "policy" => policy
        )
        .increment(1);
    }

    pub fn record_photometry_stored() {
        ::metrics::counter!(phase_metric!(counter, "catalog", "photometry_stored")).increment(1);
    }
}

/// Metrics for ingestion sessions.
pub struct SessionMetrics;

impl SessionMetrics {
    pub fn record_accepted(task: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "session", "records_accepted"),
            "task" => task.to_string()
        )
        .increment(1);
    }

    pub fn record_skipped(task: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "session", "records_skipped"),
            "task" => task.to_string()
        )
        .increment(1);
    }

    pub fn record_dropped(task: &str, reason: &'static str) {
        ::metrics::counter!(
            phase_metric!(counter, "session", "records_dropped"),
            "task" => task.to_string(),
            "reason" => reason
        )
        .increment(1);
    }

    pub fn record_flush(entries_written: usize, seconds: f64) {
        ::metrics::counter!(phase_metric!(counter, "session", "flushes")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "session", "entries_written"))
            .increment(entries_written as u64);
        ::metrics::histogram!(phase_metric!(histogram, "session", "flush_duration_seconds"))
            .record(seconds);
    }

    pub fn record_aborted(task: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "session", "tasks_aborted"),
            "task" => task.to_string()
        )
        .increment(1);
    }
}
