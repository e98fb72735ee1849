/*!
 * # Reconciliation
 *
 * Read-only audit of the inventory store. Every rule is an independent
 * [`InvariantCheck`] run against one [`Snapshot`] of all collections; each check
 * returns [`Finding`]s tagged critical or warning, and the runner folds them into
 * a [`HealthReport`].
 *
 * Checks never write. Repairs (summary backfill, team backfill) are separate
 * operations.
 */

mod access;
mod catalog;
mod dates;
mod references;
mod snapshot;
mod stock;
mod summaries;
mod tickets;

pub use snapshot::Snapshot;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::metrics::RECONCILIATION_FINDINGS;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

/// One violated rule instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub check: String,
    pub severity: Severity,
    pub message: String,
    /// Ids of the rows involved, most specific first
    pub entity_ids: Vec<String>,
}

/// What a check sees: the snapshot plus the clock and thresholds of this run.
pub struct CheckContext<'a> {
    pub snapshot: &'a Snapshot,
    pub now: DateTime<Utc>,
    pub stale_pending_days: i64,
}

pub trait InvariantCheck: Send + Sync {
    /// Stable kebab-case identifier, used in reports and for filtering.
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn severity(&self) -> Severity;

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding>;

    fn finding(&self, message: String, entity_ids: Vec<String>) -> Finding {
        Finding {
            check: self.id().to_string(),
            severity: self.severity(),
            message,
            entity_ids,
        }
    }
}

/// Every check, in report order.
pub fn all_checks() -> Vec<Box<dyn InvariantCheck>> {
    vec![
        Box::new(stock::NegativeRemaining),
        Box::new(stock::NegativeAllocated),
        Box::new(stock::AllocatedExceedsRemaining),
        Box::new(stock::RemainingExceedsImported),
        Box::new(stock::AllocationMismatch),
        Box::new(summaries::SummaryTotalMismatch),
        Box::new(summaries::SummaryExpiryMismatch),
        Box::new(summaries::MissingSummary),
        Box::new(summaries::SummaryWithoutStock),
        Box::new(summaries::SummaryDisplayDrift),
        Box::new(references::OrphanLots),
        Box::new(references::ImportMissingPartner),
        Box::new(references::ExportMissingPartner),
        Box::new(references::ExportLineMissingLot),
        Box::new(references::LineMissingProduct),
        Box::new(catalog::DuplicatePartnerNames),
        Box::new(catalog::DuplicateProductNames),
        Box::new(dates::ExpiryBeforeImport),
        Box::new(dates::StalePendingTickets),
        Box::new(tickets::InvalidLineQuantities),
        Box::new(dates::FutureDatedTickets),
        Box::new(access::AllowlistWithoutUser),
        Box::new(access::UserAccessDrift),
        Box::new(catalog::LotSubgroupDrift),
        Box::new(tickets::EmptyTickets),
    ]
}

/// Per-check line of a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSummary {
    pub id: String,
    pub description: String,
    pub severity: Severity,
    pub findings: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    /// "healthy", "warnings" or "critical"
    pub status: String,
    pub critical_count: usize,
    pub warning_count: usize,
    pub checks: Vec<CheckSummary>,
    pub findings: Vec<Finding>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.critical_count == 0
    }

    pub fn findings_for(&self, check: &str) -> Vec<&Finding> {
        self.findings.iter().filter(|f| f.check == check).collect()
    }

    /// Console rendering: one line per check, then the findings.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Inventory health check at {}: {} ({} critical, {} warnings)",
            self.generated_at.to_rfc3339(),
            self.status.to_uppercase(),
            self.critical_count,
            self.warning_count
        );
        for check in &self.checks {
            let mark = if check.findings == 0 { "ok" } else { "FAIL" };
            let _ = writeln!(
                out,
                "  [{:>4}] {:<28} {:>4}  {}",
                mark, check.id, check.findings, check.description
            );
        }
        if !self.findings.is_empty() {
            let _ = writeln!(out);
            for finding in &self.findings {
                let _ = writeln!(
                    out,
                    "  {:<8} {:<28} {}",
                    finding.severity.to_string().to_uppercase(),
                    finding.check,
                    finding.message
                );
            }
        }
        out
    }
}

/// Runs `checks` over one context and tallies the findings.
pub fn run_checks(checks: &[Box<dyn InvariantCheck>], ctx: &CheckContext<'_>) -> HealthReport {
    let mut summaries = Vec::with_capacity(checks.len());
    let mut findings = Vec::new();

    for check in checks {
        let found = check.run(ctx);
        summaries.push(CheckSummary {
            id: check.id().to_string(),
            description: check.description().to_string(),
            severity: check.severity(),
            findings: found.len(),
        });
        findings.extend(found);
    }

    let critical_count = findings
        .iter()
        .filter(|f| f.severity == Severity::Critical)
        .count();
    let warning_count = findings.len() - critical_count;
    let status = if critical_count > 0 {
        "critical"
    } else if warning_count > 0 {
        "warnings"
    } else {
        "healthy"
    };

    HealthReport {
        generated_at: ctx.now,
        status: status.to_string(),
        critical_count,
        warning_count,
        checks: summaries,
        findings,
    }
}

/// Upper bound for the stale-pending threshold, in days.
pub const MAX_STALE_PENDING_DAYS: i64 = 3650;

/// Accepts a stale-pending threshold between one day and [`MAX_STALE_PENDING_DAYS`].
pub fn validate_stale_pending_days(days: i64) -> Result<i64, ServiceError> {
    if (1..=MAX_STALE_PENDING_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(ServiceError::ValidationError(format!(
            "stale_days must be between 1 and {}, got {}",
            MAX_STALE_PENDING_DAYS, days
        )))
    }
}

#[derive(Clone)]
pub struct ReconciliationService {
    db_pool: Arc<DbPool>,
    stale_pending_days: i64,
}

impl ReconciliationService {
    pub fn new(db_pool: Arc<DbPool>, stale_pending_days: i64) -> Self {
        Self {
            db_pool,
            stale_pending_days,
        }
    }

    /// Loads a snapshot and runs every check against it.
    #[instrument(skip(self))]
    pub async fn run(&self, stale_pending_days: Option<i64>) -> Result<HealthReport, ServiceError> {
        let stale_pending_days = match stale_pending_days {
            Some(days) => validate_stale_pending_days(days)?,
            None => self.stale_pending_days,
        };
        let snapshot = Snapshot::load(&*self.db_pool).await?;
        let ctx = CheckContext {
            snapshot: &snapshot,
            now: Utc::now(),
            stale_pending_days,
        };
        let report = run_checks(&all_checks(), &ctx);

        RECONCILIATION_FINDINGS
            .with_label_values(&["critical"])
            .inc_by(report.critical_count as u64);
        RECONCILIATION_FINDINGS
            .with_label_values(&["warning"])
            .inc_by(report.warning_count as u64);

        if report.is_healthy() {
            info!(
                warnings = report.warning_count,
                lots = snapshot.lots.len(),
                "Reconciliation finished"
            );
        } else {
            warn!(
                critical = report.critical_count,
                warnings = report.warning_count,
                "Reconciliation found critical inconsistencies"
            );
        }
        Ok(report)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn clean_store_is_healthy() {
        let mut snapshot = empty();
        snapshot.products.push(product("SAL-1", "Saline"));
        let ctx = CheckContext {
            snapshot: &snapshot,
            now: Utc::now(),
            stale_pending_days: 7,
        };
        let report = run_checks(&all_checks(), &ctx);
        assert_eq!(report.status, "healthy");
        assert_eq!(report.checks.len(), 25);
        assert!(report.render_text().contains("HEALTHY"));
    }

    #[test]
    fn check_ids_are_unique() {
        let checks = all_checks();
        let mut ids: Vec<&str> = checks.iter().map(|c| c.id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), checks.len());
    }

    #[test]
    fn critical_findings_mark_the_report() {
        let mut snapshot = empty();
        snapshot.products.push(product("SAL-1", "Saline"));
        snapshot.lots.push(lot("SAL-1", -3, 0));
        let ctx = CheckContext {
            snapshot: &snapshot,
            now: Utc::now(),
            stale_pending_days: 7,
        };
        let report = run_checks(&all_checks(), &ctx);
        assert_eq!(report.status, "critical");
        assert!(!report.is_healthy());
        assert_eq!(report.findings_for("negative-remaining").len(), 1);
    }
}
