//! Webhook Metrics
//!
//! Prometheus counters for admission outcomes, claim lookup fallbacks and
//! storage class events. Metrics live in an owned registry so tests and
//! multiple webhook instances never share state.

use crate::error::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

// =============================================================================
// Label Values
// =============================================================================

/// Admission request outcome label values
pub mod outcome {
    pub const PATCHED: &str = "patched";
    pub const SKIPPED: &str = "skipped";
    pub const REJECTED: &str = "rejected";
}

/// Storage class event label values
pub mod event {
    pub const APPLIED: &str = "applied";
    pub const DELETED: &str = "deleted";
    pub const RESTARTED: &str = "restarted";
    pub const ERROR: &str = "error";
}

// =============================================================================
// Webhook Metrics
// =============================================================================

/// Metrics shared by the watcher and the admission handlers
#[derive(Clone)]
pub struct WebhookMetrics {
    registry: Registry,
    admission_requests: IntCounterVec,
    claim_lookup_failures: IntCounter,
    storage_class_events: IntCounterVec,
    driver_storage_classes: IntGauge,
}

impl WebhookMetrics {
    /// Create metrics registered in a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("driver_ready_webhook".to_string()), None)?;

        let admission_requests = IntCounterVec::new(
            Opts::new("admission_requests_total", "Admission requests by outcome"),
            &["outcome"],
        )?;
        let claim_lookup_failures = IntCounter::new(
            "claim_lookup_failures_total",
            "Persistent volume claim lookups that failed and were treated as not using the driver",
        )?;
        let storage_class_events = IntCounterVec::new(
            Opts::new("storage_class_events_total", "Storage class watch events by type"),
            &["event"],
        )?;
        let driver_storage_classes = IntGauge::new(
            "driver_storage_classes",
            "Storage class names currently known to be driver-backed",
        )?;

        registry.register(Box::new(admission_requests.clone()))?;
        registry.register(Box::new(claim_lookup_failures.clone()))?;
        registry.register(Box::new(storage_class_events.clone()))?;
        registry.register(Box::new(driver_storage_classes.clone()))?;

        Ok(Self {
            registry,
            admission_requests,
            claim_lookup_failures,
            storage_class_events,
            driver_storage_classes,
        })
    }

    #[inline]
    pub fn record_admission(&self, outcome: &str) {
        self.admission_requests.with_label_values(&[outcome]).inc();
    }

    #[inline]
    pub fn record_claim_lookup_failure(&self) {
        self.claim_lookup_failures.inc();
    }

    #[inline]
    pub fn record_class_event(&self, event: &str) {
        self.storage_class_events.with_label_values(&[event]).inc();
    }

    pub fn set_driver_classes(&self, count: usize) {
        self.driver_storage_classes.set(count as i64);
    }

    pub fn admissions(&self, outcome: &str) -> u64 {
        self.admission_requests.with_label_values(&[outcome]).get()
    }

    pub fn claim_lookup_failures(&self) -> u64 {
        self.claim_lookup_failures.get()
    }

    pub fn class_events(&self, event: &str) -> u64 {
        self.storage_class_events.with_label_values(&[event]).get()
    }

    pub fn driver_classes(&self) -> i64 {
        self.driver_storage_classes.get()
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}
