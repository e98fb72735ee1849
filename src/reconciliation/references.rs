//! Dangling references between collections.

use std::collections::HashSet;

use super::{CheckContext, Finding, InvariantCheck, Severity};

pub struct OrphanLots;

impl InvariantCheck for OrphanLots {
    fn id(&self) -> &'static str {
        "orphan-lots"
    }

    fn description(&self) -> &'static str {
        "Lot references a missing product"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let products = ctx.snapshot.products_by_id();
        ctx.snapshot
            .lots
            .iter()
            .filter(|l| !products.contains_key(l.product_id.as_str()))
            .map(|l| {
                self.finding(
                    format!(
                        "Lot {} ({}) references missing product {}",
                        l.lot_key(),
                        l.id,
                        l.product_id
                    ),
                    vec![l.id.to_string(), l.product_id.clone()],
                )
            })
            .collect()
    }
}

pub struct ImportMissingPartner;

impl InvariantCheck for ImportMissingPartner {
    fn id(&self) -> &'static str {
        "import-missing-partner"
    }

    fn description(&self) -> &'static str {
        "Import ticket references a missing partner"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let partners = ctx.snapshot.partner_ids();
        ctx.snapshot
            .import_tickets
            .iter()
            .filter(|t| !partners.contains(t.partner_id.as_str()))
            .map(|t| {
                self.finding(
                    format!("Import ticket {} references missing partner {}", t.id, t.partner_id),
                    vec![t.id.to_string(), t.partner_id.clone()],
                )
            })
            .collect()
    }
}

pub struct ExportMissingPartner;

impl InvariantCheck for ExportMissingPartner {
    fn id(&self) -> &'static str {
        "export-missing-partner"
    }

    fn description(&self) -> &'static str {
        "Export ticket references a missing partner"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let partners = ctx.snapshot.partner_ids();
        ctx.snapshot
            .export_tickets
            .iter()
            .filter(|t| !partners.contains(t.partner_id.as_str()))
            .map(|t| {
                self.finding(
                    format!("Export ticket {} references missing partner {}", t.id, t.partner_id),
                    vec![t.id.to_string(), t.partner_id.clone()],
                )
            })
            .collect()
    }
}

pub struct ExportLineMissingLot;

impl InvariantCheck for ExportLineMissingLot {
    fn id(&self) -> &'static str {
        "export-line-missing-lot"
    }

    fn description(&self) -> &'static str {
        "Export line references a missing lot"
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let lots: HashSet<_> = ctx.snapshot.lots.iter().map(|l| l.id).collect();
        ctx.snapshot
            .export_items
            .iter()
            .filter(|line| !lots.contains(&line.lot_id))
            .map(|line| {
                self.finding(
                    format!(
                        "Line {} of export ticket {} references missing lot {}",
                        line.position + 1,
                        line.ticket_id,
                        line.lot_id
                    ),
                    vec![line.id.to_string(), line.ticket_id.to_string(), line.lot_id.to_string()],
                )
            })
            .collect()
    }
}

pub struct LineMissingProduct;

impl InvariantCheck for LineMissingProduct {
    fn id(&self) -> &'static str {
        "line-missing-product"
    }

    fn description(&self) -> &'static str {
        "Ticket line references a missing product"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let products = ctx.snapshot.products_by_id();
        let imports = ctx
            .snapshot
            .import_items
            .iter()
            .map(|l| ("import", l.id, l.ticket_id, l.product_id.as_str()));
        let exports = ctx
            .snapshot
            .export_items
            .iter()
            .map(|l| ("export", l.id, l.ticket_id, l.product_id.as_str()));

        imports
            .chain(exports)
            .filter(|(_, _, _, product_id)| !products.contains_key(product_id))
            .map(|(kind, line_id, ticket_id, product_id)| {
                self.finding(
                    format!(
                        "Line of {} ticket {} references missing product {}",
                        kind, ticket_id, product_id
                    ),
                    vec![line_id.to_string(), ticket_id.to_string(), product_id.to_string()],
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::super::Snapshot;
    use super::*;
    use chrono::Utc;

    fn ctx(snapshot: &Snapshot) -> CheckContext<'_> {
        CheckContext {
            snapshot,
            now: Utc::now(),
            stale_pending_days: 7,
        }
    }

    #[test]
    fn one_orphan_lot_is_one_warning() {
        let mut snapshot = empty();
        snapshot.products.push(product("SAL-1", "Saline"));
        snapshot.lots.push(lot("SAL-1", 5, 0));
        snapshot.lots.push(lot("GONE", 5, 0));

        let findings = OrphanLots.run(&ctx(&snapshot));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[0].entity_ids[1], "GONE");
    }

    #[test]
    fn dangling_ticket_references() {
        let mut snapshot = empty();
        snapshot.products.push(product("SAL-1", "Saline"));
        snapshot.partners.push(partner("C1", "Clinic"));
        let kept = lot("SAL-1", 5, 0);
        let deleted = lot("P9", 5, 0);

        let ticket = export_ticket("NOBODY", "completed", Utc::now());
        snapshot.export_items.push(export_line(&ticket, &kept, 1));
        snapshot.export_items.push(export_line(&ticket, &deleted, 1));
        snapshot.export_tickets.push(ticket);
        snapshot.lots.push(kept);

        let c = ctx(&snapshot);
        assert_eq!(ExportMissingPartner.run(&c).len(), 1);
        assert_eq!(ExportLineMissingLot.run(&c).len(), 1);
        assert_eq!(LineMissingProduct.run(&c).len(), 1);
        assert!(ImportMissingPartner.run(&c).is_empty());
    }
}
