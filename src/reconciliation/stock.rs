//! Counter rules on individual lots.

use std::collections::HashMap;
use uuid::Uuid;

use super::{CheckContext, Finding, InvariantCheck, Severity};

pub struct NegativeRemaining;

impl InvariantCheck for NegativeRemaining {
    fn id(&self) -> &'static str {
        "negative-remaining"
    }

    fn description(&self) -> &'static str {
        "Lot remaining quantity is negative"
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        ctx.snapshot
            .lots
            .iter()
            .filter(|l| l.quantity_remaining < 0)
            .map(|l| {
                self.finding(
                    format!(
                        "Lot {} of {} has remaining {}",
                        l.lot_key(),
                        l.product_id,
                        l.quantity_remaining
                    ),
                    vec![l.id.to_string(), l.product_id.clone()],
                )
            })
            .collect()
    }
}

pub struct NegativeAllocated;

impl InvariantCheck for NegativeAllocated {
    fn id(&self) -> &'static str {
        "negative-allocated"
    }

    fn description(&self) -> &'static str {
        "Lot allocated quantity is negative"
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        ctx.snapshot
            .lots
            .iter()
            .filter(|l| l.quantity_allocated < 0)
            .map(|l| {
                self.finding(
                    format!(
                        "Lot {} of {} has allocated {}",
                        l.lot_key(),
                        l.product_id,
                        l.quantity_allocated
                    ),
                    vec![l.id.to_string(), l.product_id.clone()],
                )
            })
            .collect()
    }
}

pub struct AllocatedExceedsRemaining;

impl InvariantCheck for AllocatedExceedsRemaining {
    fn id(&self) -> &'static str {
        "allocated-exceeds-remaining"
    }

    fn description(&self) -> &'static str {
        "Lot has more allocated than remaining"
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        ctx.snapshot
            .lots
            .iter()
            .filter(|l| l.quantity_allocated > l.quantity_remaining)
            .map(|l| {
                self.finding(
                    format!(
                        "Lot {} of {} has allocated {} but remaining {}",
                        l.lot_key(),
                        l.product_id,
                        l.quantity_allocated,
                        l.quantity_remaining
                    ),
                    vec![l.id.to_string(), l.product_id.clone()],
                )
            })
            .collect()
    }
}

pub struct RemainingExceedsImported;

impl InvariantCheck for RemainingExceedsImported {
    fn id(&self) -> &'static str {
        "remaining-exceeds-imported"
    }

    fn description(&self) -> &'static str {
        "Lot has more remaining than was imported"
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        ctx.snapshot
            .lots
            .iter()
            .filter(|l| l.quantity_remaining > l.quantity_imported)
            .map(|l| {
                self.finding(
                    format!(
                        "Lot {} of {} has remaining {} but imported {}",
                        l.lot_key(),
                        l.product_id,
                        l.quantity_remaining,
                        l.quantity_imported
                    ),
                    vec![l.id.to_string(), l.product_id.clone()],
                )
            })
            .collect()
    }
}

/// Allocated must equal what pending export lines hold on the lot.
pub struct AllocationMismatch;

impl InvariantCheck for AllocationMismatch {
    fn id(&self) -> &'static str {
        "allocation-mismatch"
    }

    fn description(&self) -> &'static str {
        "Lot allocated differs from pending export lines"
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let pending = ctx.snapshot.pending_export_ids();
        let mut held: HashMap<Uuid, i64> = HashMap::new();
        for line in ctx
            .snapshot
            .export_items
            .iter()
            .filter(|l| pending.contains(&l.ticket_id))
        {
            *held.entry(line.lot_id).or_insert(0) += line.quantity;
        }

        ctx.snapshot
            .lots
            .iter()
            .filter_map(|l| {
                let expected = held.get(&l.id).copied().unwrap_or(0);
                (l.quantity_allocated != expected).then(|| {
                    self.finding(
                        format!(
                            "Lot {} of {} has allocated {} but pending exports hold {}",
                            l.lot_key(),
                            l.product_id,
                            l.quantity_allocated,
                            expected
                        ),
                        vec![l.id.to_string(), l.product_id.clone()],
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use chrono::Utc;

    fn ctx(snapshot: &super::super::Snapshot) -> CheckContext<'_> {
        CheckContext {
            snapshot,
            now: Utc::now(),
            stale_pending_days: 7,
        }
    }

    #[test]
    fn counter_rules() {
        let mut snapshot = empty();
        snapshot.lots.push(lot("SAL-1", 5, 8));
        let mut grown = lot("SAL-1", 9, 0);
        grown.quantity_imported = 4;
        snapshot.lots.push(grown);
        snapshot.lots.push(lot("SAL-1", 3, -1));

        assert_eq!(AllocatedExceedsRemaining.run(&ctx(&snapshot)).len(), 1);
        assert_eq!(RemainingExceedsImported.run(&ctx(&snapshot)).len(), 1);
        assert_eq!(NegativeAllocated.run(&ctx(&snapshot)).len(), 1);
        assert!(NegativeRemaining.run(&ctx(&snapshot)).is_empty());
    }

    #[test]
    fn retained_allocation_after_cancel_is_reported() {
        let mut snapshot = empty();
        let held = lot("SAL-1", 20, 10);
        let cancelled = export_ticket("C1", "cancelled", Utc::now());
        snapshot.export_items.push(export_line(&cancelled, &held, 10));
        snapshot.export_tickets.push(cancelled);
        snapshot.lots.push(held.clone());

        let findings = AllocationMismatch.run(&ctx(&snapshot));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].entity_ids[0], held.id.to_string());
    }

    #[test]
    fn pending_lines_account_for_allocation() {
        let mut snapshot = empty();
        let held = lot("SAL-1", 20, 10);
        let pending = export_ticket("C1", "pending", Utc::now());
        snapshot.export_items.push(export_line(&pending, &held, 4));
        snapshot.export_items.push(export_line(&pending, &held, 6));
        snapshot.export_tickets.push(pending);
        snapshot.lots.push(held);

        assert!(AllocationMismatch.run(&ctx(&snapshot)).is_empty());
    }
}
