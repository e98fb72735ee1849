//! Date sanity on lots and tickets.

use chrono::Duration;

use super::{CheckContext, Finding, InvariantCheck, Severity};
use crate::entities::TicketStatus;

/// Tickets stamped up to this far ahead of the checker's clock are tolerated.
const CLOCK_SKEW_MINUTES: i64 = 5;

pub struct ExpiryBeforeImport;

impl InvariantCheck for ExpiryBeforeImport {
    fn id(&self) -> &'static str {
        "expiry-before-import"
    }

    fn description(&self) -> &'static str {
        "Lot expires before it was imported"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        ctx.snapshot
            .lots
            .iter()
            .filter_map(|lot| {
                let expiry = lot.expiry_date?;
                let imported = lot.import_date.date_naive();
                (expiry < imported).then(|| {
                    self.finding(
                        format!(
                            "Lot {} of {} expires {} but was imported {}",
                            lot.lot_key(),
                            lot.product_id,
                            expiry,
                            imported
                        ),
                        vec![lot.id.to_string(), lot.product_id.clone()],
                    )
                })
            })
            .collect()
    }
}

pub struct StalePendingTickets;

impl InvariantCheck for StalePendingTickets {
    fn id(&self) -> &'static str {
        "stale-pending-tickets"
    }

    fn description(&self) -> &'static str {
        "Pending ticket has not moved for too long"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let Some(cutoff) = Duration::try_days(ctx.stale_pending_days)
            .filter(|window| *window > Duration::zero())
            .and_then(|window| ctx.now.checked_sub_signed(window))
        else {
            return Vec::new();
        };
        let pending = |status: &str| TicketStatus::parse(status) == Some(TicketStatus::Pending);

        let imports = ctx
            .snapshot
            .import_tickets
            .iter()
            .filter(|t| pending(&t.status))
            .map(|t| ("Import", t.id, t.updated_at));
        let exports = ctx
            .snapshot
            .export_tickets
            .iter()
            .filter(|t| pending(&t.status))
            .map(|t| ("Export", t.id, t.updated_at));

        imports
            .chain(exports)
            .filter(|(_, _, updated_at)| *updated_at < cutoff)
            .map(|(kind, id, updated_at)| {
                let days = (ctx.now - updated_at).num_days();
                self.finding(
                    format!("{} ticket {} has been pending for {} days", kind, id, days),
                    vec![id.to_string()],
                )
            })
            .collect()
    }
}

pub struct FutureDatedTickets;

impl InvariantCheck for FutureDatedTickets {
    fn id(&self) -> &'static str {
        "future-dated-tickets"
    }

    fn description(&self) -> &'static str {
        "Ticket is dated in the future"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let limit = ctx.now + Duration::minutes(CLOCK_SKEW_MINUTES);
        let imports = ctx
            .snapshot
            .import_tickets
            .iter()
            .map(|t| ("Import", t.id, t.created_at));
        let exports = ctx
            .snapshot
            .export_tickets
            .iter()
            .map(|t| ("Export", t.id, t.created_at));

        imports
            .chain(exports)
            .filter(|(_, _, created_at)| *created_at > limit)
            .map(|(kind, id, created_at)| {
                self.finding(
                    format!("{} ticket {} is dated {}", kind, id, created_at.to_rfc3339()),
                    vec![id.to_string()],
                )
            })
            .collect()
    }
}
