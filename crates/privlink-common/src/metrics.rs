//! Reconciliation metrics
//!
//! Instruments are created on the global OpenTelemetry meter. Until
//! [`crate::telemetry::init_metrics`] installs an exporting provider the
//! global meter is a no-op, so recording is always safe.

use std::time::Instant;

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

/// Global meter for privlink metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("privlink"));

/// Histogram of AzureCluster reconciliation duration
///
/// Labels:
/// - `cluster`: workload cluster name
/// - `outcome`: skipped, success, retry, fatal
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("privlink_reconcile_duration_seconds")
        .with_description("Duration of AzureCluster reconciliation in seconds")
        .with_unit("s")
        .build()
});

/// Counter of AzureCluster reconciliations
///
/// Labels:
/// - `cluster`: workload cluster name
/// - `outcome`: skipped, success, retry, fatal
pub static RECONCILES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("privlink_reconciles_total")
        .with_description("Total number of AzureCluster reconciliations by outcome")
        .with_unit("{reconciliations}")
        .build()
});

/// How a reconciliation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing to do for this cluster
    Skipped,
    /// Endpoints and addresses are up to date, or teardown finished
    Success,
    /// Provisioning is still in progress
    Retry,
    /// Reconciliation failed and needs intervention
    Fatal,
}

impl ReconcileOutcome {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Success => "success",
            Self::Retry => "retry",
            Self::Fatal => "fatal",
        }
    }
}

/// Times one reconciliation and records it on completion
pub struct ReconcileTimer {
    cluster: String,
    start: Instant,
}

impl ReconcileTimer {
    /// Start timing a reconciliation
    pub fn start(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            start: Instant::now(),
        }
    }

    /// Record the duration and count the outcome
    pub fn finish(self, outcome: ReconcileOutcome) {
        let labels = [
            KeyValue::new("cluster", self.cluster),
            KeyValue::new("outcome", outcome.as_str()),
        ];
        RECONCILE_DURATION.record(self.start.elapsed().as_secs_f64(), &labels);
        RECONCILES.add(1, &labels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ReconcileOutcome::Skipped, "skipped")]
    #[case(ReconcileOutcome::Success, "success")]
    #[case(ReconcileOutcome::Retry, "retry")]
    #[case(ReconcileOutcome::Fatal, "fatal")]
    fn outcome_labels(#[case] outcome: ReconcileOutcome, #[case] label: &str) {
        assert_eq!(outcome.as_str(), label);
    }

    #[test]
    fn timer_records_without_a_provider() {
        let timer = ReconcileTimer::start("wc1");
        assert_eq!(timer.cluster, "wc1");
        timer.finish(ReconcileOutcome::Retry);
    }
}
