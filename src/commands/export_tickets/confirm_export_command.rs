use async_trait::async_trait;
use chrono::Utc;
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::transition;
use crate::commands::lot_writes::{
    apply_and_log, load_lots, quantities_by_lot, LotChange, LotWriteLog,
};
use crate::commands::{map_txn_error, publish, Command};
use crate::db::DbPool;
use crate::entities::TicketStatus;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::{record_failure, TICKETS_COMMITTED};
use crate::services::tickets::{ensure_pending, load_export_ticket, ExportTicketDetails};

/// Completes a pending export: ships every line and drops its soft lock.
///
/// All lots are updated in one transaction. If any lot cannot cover its lines
/// nothing is written and the ticket stays pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmExportCommand {
    pub ticket_id: Uuid,
}

#[async_trait]
impl Command for ConfirmExportCommand {
    type Result = ExportTicketDetails;

    #[instrument(skip(self, db_pool, event_sender), fields(ticket_id = %self.ticket_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.run(db_pool, event_sender)
            .await
            .map_err(|e| record_failure("confirm_export", e))
    }
}

impl ConfirmExportCommand {
    async fn run(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<ExportTicketDetails, ServiceError> {
        let ticket_id = self.ticket_id;

        let (details, log) = db_pool
            .transaction::<_, (ExportTicketDetails, LotWriteLog), ServiceError>(|txn| {
                Box::pin(async move {
                    let current = load_export_ticket(txn, ticket_id).await?;
                    ensure_pending(
                        &current.ticket.status,
                        format_args!("Export ticket {}", ticket_id),
                    )?;

                    let totals =
                        quantities_by_lot(current.items.iter().map(|l| (l.lot_id, l.quantity)));
                    let lots = load_lots(txn, totals.keys().copied()).await?;

                    let mut log = LotWriteLog::new();
                    for (lot_id, quantity) in totals {
                        let lot = lots.get(&lot_id).ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "Lot {} referenced by export ticket {} not found",
                                lot_id, ticket_id
                            ))
                        })?;
                        apply_and_log(txn, lot, LotChange::consume_allocated(quantity), &mut log)
                            .await?;
                    }

                    let ticket =
                        transition(txn, ticket_id, TicketStatus::Completed, Utc::now()).await?;
                    Ok((
                        ExportTicketDetails {
                            ticket,
                            items: current.items,
                        },
                        log,
                    ))
                })
            })
            .await
            .map_err(map_txn_error)?;

        info!(
            ticket_id = %ticket_id,
            lots = log.len(),
            quantity = details.total_quantity(),
            "Export ticket confirmed"
        );
        TICKETS_COMMITTED.with_label_values(&["export", "completed"]).inc();

        let mut events = log.into_events();
        events.push(Event::ExportTicketConfirmed(ticket_id));
        publish(&event_sender, events).await;

        Ok(details)
    }
}
