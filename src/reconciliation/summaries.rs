//! Product summaries compared with a fresh aggregation of the lot store.

use std::collections::{BTreeMap, HashSet};

use super::{CheckContext, Finding, InvariantCheck, Severity};
use crate::services::product_summary::{aggregate, StockAggregate};

fn fresh_aggregates(ctx: &CheckContext<'_>) -> BTreeMap<String, StockAggregate> {
    ctx.snapshot
        .lots_by_product()
        .into_iter()
        .filter_map(|(product_id, lots)| aggregate(lots).map(|agg| (product_id.to_string(), agg)))
        .collect()
}

pub struct SummaryTotalMismatch;

impl InvariantCheck for SummaryTotalMismatch {
    fn id(&self) -> &'static str {
        "summary-total-mismatch"
    }

    fn description(&self) -> &'static str {
        "Summary total differs from lot store"
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let fresh = fresh_aggregates(ctx);
        ctx.snapshot
            .summaries
            .iter()
            .filter_map(|s| {
                let agg = fresh.get(&s.product_id)?;
                (agg.total_remaining != s.total_remaining).then(|| {
                    self.finding(
                        format!(
                            "Summary of {} says {} but lots hold {}",
                            s.product_id, s.total_remaining, agg.total_remaining
                        ),
                        vec![s.product_id.clone()],
                    )
                })
            })
            .collect()
    }
}

pub struct SummaryExpiryMismatch;

impl InvariantCheck for SummaryExpiryMismatch {
    fn id(&self) -> &'static str {
        "summary-expiry-mismatch"
    }

    fn description(&self) -> &'static str {
        "Summary nearest expiry differs from lot store"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let fresh = fresh_aggregates(ctx);
        ctx.snapshot
            .summaries
            .iter()
            .filter_map(|s| {
                let agg = fresh.get(&s.product_id)?;
                (agg.nearest_expiry_date != s.nearest_expiry_date).then(|| {
                    self.finding(
                        format!(
                            "Summary of {} has nearest expiry {:?}, lots say {:?}",
                            s.product_id, s.nearest_expiry_date, agg.nearest_expiry_date
                        ),
                        vec![s.product_id.clone()],
                    )
                })
            })
            .collect()
    }
}

pub struct MissingSummary;

impl InvariantCheck for MissingSummary {
    fn id(&self) -> &'static str {
        "missing-summary"
    }

    fn description(&self) -> &'static str {
        "Product with stock has no summary"
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let summarized: HashSet<&str> = ctx
            .snapshot
            .summaries
            .iter()
            .map(|s| s.product_id.as_str())
            .collect();
        fresh_aggregates(ctx)
            .into_iter()
            .filter(|(product_id, _)| !summarized.contains(product_id.as_str()))
            .map(|(product_id, agg)| {
                self.finding(
                    format!(
                        "Product {} holds {} in {} lots but has no summary",
                        product_id, agg.total_remaining, agg.lot_count
                    ),
                    vec![product_id],
                )
            })
            .collect()
    }
}

pub struct SummaryWithoutStock;

impl InvariantCheck for SummaryWithoutStock {
    fn id(&self) -> &'static str {
        "summary-without-stock"
    }

    fn description(&self) -> &'static str {
        "Summary exists for product without stock"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let fresh = fresh_aggregates(ctx);
        ctx.snapshot
            .summaries
            .iter()
            .filter(|s| !fresh.contains_key(&s.product_id))
            .map(|s| {
                self.finding(
                    format!(
                        "Summary of {} reports {} but no lot has stock",
                        s.product_id, s.total_remaining
                    ),
                    vec![s.product_id.clone()],
                )
            })
            .collect()
    }
}

/// Display copies on the summary must match the product master.
pub struct SummaryDisplayDrift;

impl InvariantCheck for SummaryDisplayDrift {
    fn id(&self) -> &'static str {
        "summary-display-drift"
    }

    fn description(&self) -> &'static str {
        "Summary display fields differ from product"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let products = ctx.snapshot.products_by_id();
        let mut findings = Vec::new();
        for summary in &ctx.snapshot.summaries {
            let Some(product) = products.get(summary.product_id.as_str()) else {
                continue;
            };
            let fields = [
                ("name", summary.product_name.as_deref(), Some(product.name.as_str())),
                ("unit", summary.unit.as_deref(), product.unit.as_deref()),
                ("packaging", summary.packaging.as_deref(), product.packaging.as_deref()),
                ("storage_temp", summary.storage_temp.as_deref(), product.storage_temp.as_deref()),
                ("manufacturer", summary.manufacturer.as_deref(), product.manufacturer.as_deref()),
                ("team", summary.team.as_deref(), product.team.as_deref()),
                ("subgroup", summary.subgroup.as_deref(), product.subgroup.as_deref()),
            ];
            let drifted: Vec<&str> = fields
                .iter()
                .filter(|(_, copy, master)| copy != master)
                .map(|(name, _, _)| *name)
                .collect();
            if !drifted.is_empty() {
                findings.push(self.finding(
                    format!(
                        "Summary of {} is stale on: {}",
                        summary.product_id,
                        drifted.join(", ")
                    ),
                    vec![summary.product_id.clone()],
                ));
            }
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::super::Snapshot;
    use super::*;
    use crate::services::product_summary::build_summary;
    use chrono::Utc;

    fn ctx(snapshot: &Snapshot) -> CheckContext<'_> {
        CheckContext {
            snapshot,
            now: Utc::now(),
            stale_pending_days: 7,
        }
    }

    #[test]
    fn matching_summary_passes_every_summary_check() {
        let mut snapshot = empty();
        let p = product("SAL-1", "Saline");
        snapshot.lots.push(lot("SAL-1", 30, 0));
        snapshot.lots.push(lot("SAL-1", 0, 0));
        let agg = aggregate(&snapshot.lots).unwrap();
        snapshot.summaries.push(build_summary("SAL-1", agg, Some(&p), Utc::now()));
        snapshot.products.push(p);

        let c = ctx(&snapshot);
        assert!(SummaryTotalMismatch.run(&c).is_empty());
        assert!(SummaryExpiryMismatch.run(&c).is_empty());
        assert!(MissingSummary.run(&c).is_empty());
        assert!(SummaryWithoutStock.run(&c).is_empty());
        assert!(SummaryDisplayDrift.run(&c).is_empty());
    }

    #[test]
    fn stale_summaries_are_reported() {
        let mut snapshot = empty();
        let mut p = product("SAL-1", "Saline");
        snapshot.lots.push(lot("SAL-1", 30, 0));
        let agg = aggregate(&snapshot.lots).unwrap();
        let mut summary = build_summary("SAL-1", agg, Some(&p), Utc::now());
        summary.total_remaining = 45;
        snapshot.summaries.push(summary);
        p.team = Some("bio".into());
        snapshot.products.push(p);

        snapshot.summaries.push(build_summary("SAL-2", agg, None, Utc::now()));
        snapshot.lots.push(lot("SAL-3", 2, 0));

        let c = ctx(&snapshot);
        assert_eq!(SummaryTotalMismatch.run(&c).len(), 1);
        assert_eq!(SummaryWithoutStock.run(&c)[0].entity_ids, vec!["SAL-2"]);
        assert_eq!(MissingSummary.run(&c)[0].entity_ids, vec!["SAL-3"]);
        let drift = SummaryDisplayDrift.run(&c);
        assert_eq!(drift.len(), 1);
        assert!(drift[0].message.contains("team"));
    }
}
