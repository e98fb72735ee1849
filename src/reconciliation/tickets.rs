//! Line-level rules on tickets.

use std::collections::HashSet;

use super::{CheckContext, Finding, InvariantCheck, Severity};

pub struct InvalidLineQuantities;

impl InvariantCheck for InvalidLineQuantities {
    fn id(&self) -> &'static str {
        "invalid-line-quantities"
    }

    fn description(&self) -> &'static str {
        "Ticket line has zero or negative quantity"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let imports = ctx
            .snapshot
            .import_items
            .iter()
            .map(|l| ("import", l.id, l.ticket_id, l.position, l.quantity));
        let exports = ctx
            .snapshot
            .export_items
            .iter()
            .map(|l| ("export", l.id, l.ticket_id, l.position, l.quantity));

        imports
            .chain(exports)
            .filter(|(_, _, _, _, quantity)| *quantity <= 0)
            .map(|(kind, line_id, ticket_id, position, quantity)| {
                self.finding(
                    format!(
                        "Line {} of {} ticket {} has quantity {}",
                        position + 1,
                        kind,
                        ticket_id,
                        quantity
                    ),
                    vec![line_id.to_string(), ticket_id.to_string()],
                )
            })
            .collect()
    }
}

pub struct EmptyTickets;

impl InvariantCheck for EmptyTickets {
    fn id(&self) -> &'static str {
        "empty-tickets"
    }

    fn description(&self) -> &'static str {
        "Ticket has no lines"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let with_imports: HashSet<_> =
            ctx.snapshot.import_items.iter().map(|l| l.ticket_id).collect();
        let with_exports: HashSet<_> =
            ctx.snapshot.export_items.iter().map(|l| l.ticket_id).collect();

        let imports = ctx
            .snapshot
            .import_tickets
            .iter()
            .filter(|t| !with_imports.contains(&t.id))
            .map(|t| ("Import", t.id, t.status.as_str()));
        let exports = ctx
            .snapshot
            .export_tickets
            .iter()
            .filter(|t| !with_exports.contains(&t.id))
            .map(|t| ("Export", t.id, t.status.as_str()));

        imports
            .chain(exports)
            .map(|(kind, id, status)| {
                self.finding(
                    format!("{} ticket {} ({}) has no lines", kind, id, status),
                    vec![id.to_string()],
                )
            })
            .collect()
    }
}
