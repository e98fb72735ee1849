/*!
 * # Metrics Module
 *
 * Prometheus counters for the inventory lifecycle, exposed in text format at `/metrics`.
 */

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to export metrics: {0}")]
    ExportError(String),
}

fn counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("metric can be created");
    register(Box::new(counter.clone()));
    counter
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter = IntCounterVec::new(Opts::new(name, help), labels).expect("metric can be created");
    register(Box::new(counter.clone()));
    counter
}

fn register(collector: Box<dyn prometheus::core::Collector>) {
    if let Err(e) = REGISTRY.register(collector) {
        error!("Failed to register metric: {}", e);
    }
}

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new_custom(Some("medstock".into()), None)
        .expect("registry can be created");

    /// Tickets committed, by kind (import/export) and resulting status.
    pub static ref TICKETS_COMMITTED: IntCounterVec = counter_vec(
        "tickets_committed_total",
        "Tickets persisted or transitioned",
        &["kind", "status"]
    );

    /// Command failures, by command and error type.
    pub static ref COMMAND_FAILURES: IntCounterVec = counter_vec(
        "command_failures_total",
        "Failed lifecycle commands",
        &["command", "error_type"]
    );

    pub static ref ALLOCATION_REJECTIONS: IntCounter = counter(
        "allocation_rejections_total",
        "Allocation requests rejected for insufficient stock"
    );

    pub static ref LOT_WRITE_CONFLICTS: IntCounter = counter(
        "lot_write_conflicts_total",
        "Conditional lot updates that lost a race"
    );

    pub static ref SUMMARY_RECOMPUTATIONS: IntCounterVec = counter_vec(
        "summary_recomputations_total",
        "Product summary recomputations by outcome",
        &["outcome"]
    );

    pub static ref RECONCILIATION_FINDINGS: IntCounterVec = counter_vec(
        "reconciliation_findings_total",
        "Findings reported by reconciliation runs",
        &["severity"]
    );
}

/// Label used for a failed command, derived from the error variant.
pub fn error_type(err: &crate::errors::ServiceError) -> &'static str {
    use crate::errors::ServiceError::*;
    match err {
        DatabaseError(_) => "database_error",
        NotFound(_) => "not_found",
        ValidationError(_) => "validation_error",
        InvalidStatus(_) => "invalid_status",
        InsufficientStock(_) => "insufficient_stock",
        ConcurrentModification(_) => "concurrent_modification",
        Conflict(_) => "conflict",
        EventError(_) => "event_error",
        InternalError(_) | MigrationError(_) | Other(_) => "internal_error",
    }
}

/// Records a failed command and hands the error back.
pub fn record_failure(
    command: &str,
    err: crate::errors::ServiceError,
) -> crate::errors::ServiceError {
    COMMAND_FAILURES
        .with_label_values(&[command, error_type(&err)])
        .inc();
    if matches!(err, crate::errors::ServiceError::InsufficientStock(_)) {
        ALLOCATION_REJECTIONS.inc();
    }
    if matches!(err, crate::errors::ServiceError::ConcurrentModification(_)) {
        LOT_WRITE_CONFLICTS.inc();
    }
    err
}

/// Renders every registered metric in the Prometheus text format.
pub fn metrics_handler() -> Result<String, MetricsError> {
    // touch the lazies so the families exist before the first event
    lazy_static::initialize(&TICKETS_COMMITTED);
    lazy_static::initialize(&COMMAND_FAILURES);
    lazy_static::initialize(&ALLOCATION_REJECTIONS);
    lazy_static::initialize(&LOT_WRITE_CONFLICTS);
    lazy_static::initialize(&SUMMARY_RECOMPUTATIONS);
    lazy_static::initialize(&RECONCILIATION_FINDINGS);

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| MetricsError::ExportError(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| MetricsError::ExportError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;

    #[test]
    fn failures_are_labelled_and_exported() {
        let err = record_failure(
            "save_export_draft",
            ServiceError::InsufficientStock("lot".into()),
        );
        assert!(matches!(err, ServiceError::InsufficientStock(_)));
        assert!(ALLOCATION_REJECTIONS.get() >= 1);

        let text = metrics_handler().unwrap();
        assert!(text.contains("medstock_command_failures_total"));
        assert!(text.contains("insufficient_stock"));
    }
}
