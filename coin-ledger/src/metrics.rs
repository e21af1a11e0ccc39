//! Metrics collection for observability
//!
//! Prometheus metrics for the ledger, kept in a private registry.
//!
//! # Metrics
//!
//! - `ledger_transactions_committed_total` - Transactions applied
//! - `ledger_transactions_aborted_total` - Transactions discarded on error
//! - `ledger_events_emitted_total` - Events appended to the event log
//! - `ledger_epoch` - Current reconfiguration epoch
//! - `ledger_commit_batch_size` - Histogram of change sets per RocksDB write

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Transactions applied
    pub transactions_committed: IntCounter,

    /// Transactions discarded
    pub transactions_aborted: IntCounter,

    /// Events emitted by committed transactions
    pub events_emitted: IntCounter,

    /// Current epoch
    pub epoch: IntGauge,

    /// Change sets per storage write
    pub commit_batch_size: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_committed = IntCounter::new(
            "ledger_transactions_committed_total",
            "Total number of committed transactions",
        )?;
        registry.register(Box::new(transactions_committed.clone()))?;

        let transactions_aborted = IntCounter::new(
            "ledger_transactions_aborted_total",
            "Total number of aborted transactions",
        )?;
        registry.register(Box::new(transactions_aborted.clone()))?;

        let events_emitted = IntCounter::new(
            "ledger_events_emitted_total",
            "Total number of events emitted",
        )?;
        registry.register(Box::new(events_emitted.clone()))?;

        let epoch = IntGauge::new("ledger_epoch", "Current reconfiguration epoch")?;
        registry.register(Box::new(epoch.clone()))?;

        let commit_batch_size = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_commit_batch_size",
                "Histogram of change sets per storage write",
            )
            .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]),
        )?;
        registry.register(Box::new(commit_batch_size.clone()))?;

        Ok(Self {
            transactions_committed,
            transactions_aborted,
            events_emitted,
            epoch,
            commit_batch_size,
            registry,
        })
    }

    /// Record a committed transaction and its events
    pub fn record_commit(&self, events: usize) {
        self.transactions_committed.inc();
        self.events_emitted.inc_by(events as u64);
    }

    /// Record an aborted transaction
    pub fn record_abort(&self) {
        self.transactions_aborted.inc();
    }

    /// Record a storage write of `batch_size` change sets
    pub fn record_batch_flush(&self, batch_size: usize) {
        self.commit_batch_size.observe(batch_size as f64);
    }

    /// Update the epoch gauge
    pub fn set_epoch(&self, epoch: u64) {
        self.epoch.set(epoch as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.transactions_committed.get(), 0);
        assert_eq!(metrics.epoch.get(), 0);
    }

    #[test]
    fn test_record_commit_and_abort() {
        let metrics = Metrics::new().unwrap();
        metrics.record_commit(3);
        metrics.record_commit(0);
        metrics.record_abort();

        assert_eq!(metrics.transactions_committed.get(), 2);
        assert_eq!(metrics.events_emitted.get(), 3);
        assert_eq!(metrics.transactions_aborted.get(), 1);
    }

    #[test]
    fn test_independent_registries() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.set_epoch(7);
        first.record_batch_flush(10);

        assert_eq!(second.epoch.get(), 0);
        let families = first.registry().gather();
        assert!(families.iter().any(|f| f.get_name() == "ledger_epoch"));
        assert!(families
            .iter()
            .any(|f| f.get_name() == "ledger_commit_batch_size"));
    }
}
