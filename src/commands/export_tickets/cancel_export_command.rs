use async_trait::async_trait;
use chrono::Utc;
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{release_lines, transition};
use crate::commands::lot_writes::LotWriteLog;
use crate::commands::{map_txn_error, publish, Command};
use crate::config::AllocationReleasePolicy;
use crate::db::DbPool;
use crate::entities::TicketStatus;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::{record_failure, TICKETS_COMMITTED};
use crate::services::tickets::{ensure_pending, load_export_ticket, ExportTicketDetails};

/// Cancels a pending export.
///
/// Under [`AllocationReleasePolicy::Release`] the ticket's soft locks are given back
/// in the same transaction. Under `Retain` the lots are left as they are and the
/// allocation drift is left for reconciliation to report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelExportCommand {
    pub ticket_id: Uuid,
    #[serde(default)]
    pub release_policy: AllocationReleasePolicy,
}

impl CancelExportCommand {
    pub fn new(ticket_id: Uuid, release_policy: AllocationReleasePolicy) -> Self {
        Self {
            ticket_id,
            release_policy,
        }
    }
}

#[async_trait]
impl Command for CancelExportCommand {
    type Result = ExportTicketDetails;

    #[instrument(
        skip(self, db_pool, event_sender),
        fields(ticket_id = %self.ticket_id, policy = %self.release_policy)
    )]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.run(db_pool, event_sender)
            .await
            .map_err(|e| record_failure("cancel_export", e))
    }
}

impl CancelExportCommand {
    async fn run(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<ExportTicketDetails, ServiceError> {
        let ticket_id = self.ticket_id;
        let release = self.release_policy == AllocationReleasePolicy::Release;

        let (details, log) = db_pool
            .transaction::<_, (ExportTicketDetails, LotWriteLog), ServiceError>(|txn| {
                Box::pin(async move {
                    let current = load_export_ticket(txn, ticket_id).await?;
                    ensure_pending(
                        &current.ticket.status,
                        format_args!("Export ticket {}", ticket_id),
                    )?;

                    let mut log = LotWriteLog::new();
                    if release {
                        release_lines(txn, &current.items, &mut log).await?;
                    }

                    let ticket =
                        transition(txn, ticket_id, TicketStatus::Cancelled, Utc::now()).await?;
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

        if release {
            info!(
                ticket_id = %ticket_id,
                lots = log.len(),
                "Export ticket cancelled, allocation released"
            );
        } else {
            warn!(
                ticket_id = %ticket_id,
                quantity = details.total_quantity(),
                "Export ticket cancelled, allocation retained"
            );
        }
        TICKETS_COMMITTED.with_label_values(&["export", "cancelled"]).inc();

        let mut events = log.into_events();
        events.push(Event::ExportTicketCancelled {
            ticket_id,
            released: release,
        });
        publish(&event_sender, events).await;

        Ok(details)
    }
}
