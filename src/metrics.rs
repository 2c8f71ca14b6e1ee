//! Metrics collection and export module

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Submission pipeline
    pub envelopes_submitted: IntCounter,
    pub envelopes_confirmed: IntCounter,
    pub envelopes_rejected: IntCounter,
    pub envelopes_timed_out: IntCounter,

    // Account resolution
    pub associated_accounts_created: IntCounter,
    pub associated_account_create_races: IntCounter,

    // Catalog
    pub operations_failed: IntCounter,

    // Histograms
    pub confirmation_latency: Histogram,
    pub rpc_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let envelopes_submitted = IntCounter::with_opts(Opts::new(
            "envelopes_submitted_total",
            "Transactions handed to the gateway",
        ))?;

        let envelopes_confirmed = IntCounter::with_opts(Opts::new(
            "envelopes_confirmed_total",
            "Transactions observed at the required commitment",
        ))?;

        let envelopes_rejected = IntCounter::with_opts(Opts::new(
            "envelopes_rejected_total",
            "Transactions refused at ingestion or failed in execution",
        ))?;

        let envelopes_timed_out = IntCounter::with_opts(Opts::new(
            "envelopes_timed_out_total",
            "Transactions whose confirmation was not observed in time",
        ))?;

        let associated_accounts_created = IntCounter::with_opts(Opts::new(
            "associated_accounts_created_total",
            "Associated token accounts created by this process",
        ))?;

        let associated_account_create_races = IntCounter::with_opts(Opts::new(
            "associated_account_create_races_total",
            "Create attempts that failed and were absorbed before re-reading",
        ))?;

        let operations_failed = IntCounter::with_opts(Opts::new(
            "operations_failed_total",
            "Catalog operations that returned an error",
        ))?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "confirmation_latency_seconds",
                "Time from send to observed commitment",
            )
            .buckets(vec![0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        )?;

        let rpc_latency = Histogram::with_opts(
            HistogramOpts::new("rpc_latency_seconds", "RPC call latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;

        registry.register(Box::new(envelopes_submitted.clone()))?;
        registry.register(Box::new(envelopes_confirmed.clone()))?;
        registry.register(Box::new(envelopes_rejected.clone()))?;
        registry.register(Box::new(envelopes_timed_out.clone()))?;
        registry.register(Box::new(associated_accounts_created.clone()))?;
        registry.register(Box::new(associated_account_create_races.clone()))?;
        registry.register(Box::new(operations_failed.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;

        Ok(Self {
            registry,
            envelopes_submitted,
            envelopes_confirmed,
            envelopes_rejected,
            envelopes_timed_out,
            associated_accounts_created,
            associated_account_create_races,
            operations_failed,
            confirmation_latency,
            rpc_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all registered metrics in the Prometheus text format
    pub fn gather_text(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registered_and_exported() {
        let m = Metrics::new().unwrap();
        m.envelopes_submitted.inc();
        m.associated_account_create_races.inc_by(2);

        let text = m.gather_text().unwrap();
        assert!(text.contains("envelopes_submitted_total 1"));
        assert!(text.contains("associated_account_create_races_total 2"));
        assert!(text.contains("confirmation_latency_seconds"));
    }

    #[test]
    fn test_timer_records_observation() {
        let m = Metrics::new().unwrap();
        let timer = Timer::new();
        timer.observe_duration(&m.rpc_latency);
        assert_eq!(m.rpc_latency.get_sample_count(), 1);
    }
}
