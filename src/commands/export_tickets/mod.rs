//! Export ticket lifecycle: draft (soft lock), direct export, confirm, cancel and edit.

pub mod cancel_export_command;
pub mod confirm_export_command;
pub mod direct_export_command;
pub mod save_export_draft_command;
pub mod update_export_ticket_command;

pub use cancel_export_command::CancelExportCommand;
pub use confirm_export_command::ConfirmExportCommand;
pub use direct_export_command::DirectExportCommand;
pub use save_export_draft_command::SaveExportDraftCommand;
pub use update_export_ticket_command::UpdateExportTicketCommand;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

use super::lot_writes::{apply_and_log, load_lots, LotChange, LotWriteLog};
use super::{ensure_has_lines, ensure_partner_exists, ensure_positive_quantities, load_products};
use crate::entities::{export_ticket, export_ticket_item, TicketStatus};
use crate::errors::ServiceError;
use crate::services::allocation::{plan_on, AggregatedLotKey};

/// One requested export line: a quantity out of an aggregated lot.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExportItemRequest {
    #[validate(length(min = 1, message = "Product code is required"))]
    pub product_id: String,
    /// Blank or missing selects the lots received without a lot number
    pub lot_number: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i64,
}

impl ExportItemRequest {
    pub fn key(&self) -> AggregatedLotKey {
        AggregatedLotKey::new(&self.product_id, self.lot_number.as_deref())
    }
}

/// Header fields shared by the commands that create an export ticket.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExportTicketHeader {
    #[validate(length(min = 1, message = "Partner is required"))]
    pub partner_id: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(email)]
    pub created_by: Option<String>,
}

/// How the lines of a new export touch their lots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineEffect {
    /// Soft-lock the quantity until the ticket is confirmed or cancelled
    Allocate,
    /// Take the quantity out of stock immediately
    Consume,
}

impl LineEffect {
    fn change(self, quantity: i64) -> LotChange {
        match self {
            LineEffect::Allocate => LotChange::allocate(quantity),
            LineEffect::Consume => LotChange::consume(quantity),
        }
    }
}

pub(crate) fn validate_items(items: &[ExportItemRequest]) -> Result<(), ServiceError> {
    ensure_has_lines(items)?;
    ensure_positive_quantities(items.iter().map(|i| i.quantity))?;
    for item in items {
        item.validate()?;
    }
    Ok(())
}

/// Plans each request with FEFO and writes the lot changes and ticket lines.
///
/// Requests are handled in order and each plan sees the lot writes of the ones
/// before it, so two lines naming the same aggregated lot cannot double-spend it.
pub(crate) async fn write_lines<C: ConnectionTrait>(
    conn: &C,
    ticket_id: Uuid,
    items: &[ExportItemRequest],
    effect: LineEffect,
    log: &mut LotWriteLog,
) -> Result<Vec<export_ticket_item::Model>, ServiceError> {
    let products = load_products(conn, items.iter().map(|i| i.product_id.clone())).await?;

    let mut lines = Vec::new();
    for item in items {
        let key = item.key();
        let plan = plan_on(conn, &key, item.quantity).await?;
        let lots = load_lots(conn, plan.draws.iter().map(|d| d.lot_id)).await?;
        let team = products.get(&key.product_id).and_then(|p| p.team.clone());

        for draw in &plan.draws {
            let lot = lots.get(&draw.lot_id).ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Planned lot {} vanished inside the transaction",
                    draw.lot_id
                ))
            })?;
            apply_and_log(conn, lot, effect.change(draw.quantity), log).await?;

            let line = export_ticket_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                ticket_id: Set(ticket_id),
                lot_id: Set(draw.lot_id),
                product_id: Set(key.product_id.clone()),
                lot_number: Set(draw.lot_number.clone()),
                expiry_date: Set(draw.expiry_date),
                quantity: Set(draw.quantity),
                team: Set(team.clone()),
                position: Set(lines.len() as i32),
            }
            .insert(conn)
            .await
            .map_err(ServiceError::db_error)?;
            lines.push(line);
        }
        debug!(
            key = %key,
            quantity = item.quantity,
            draws = plan.draws.len(),
            "Wrote export lines"
        );
    }
    Ok(lines)
}

/// Inserts a ticket and its lines, applying `effect` to the drawn lots.
pub(crate) async fn create_ticket<C: ConnectionTrait>(
    conn: &C,
    header: &ExportTicketHeader,
    items: &[ExportItemRequest],
    status: TicketStatus,
    effect: LineEffect,
    log: &mut LotWriteLog,
) -> Result<(export_ticket::Model, Vec<export_ticket_item::Model>), ServiceError> {
    ensure_partner_exists(conn, &header.partner_id).await?;

    let now = Utc::now();
    let ticket = export_ticket::ActiveModel {
        id: Set(Uuid::new_v4()),
        partner_id: Set(header.partner_id.clone()),
        description: Set(header.description.clone()),
        status: Set(status.as_str().to_string()),
        created_by: Set(header.created_by.clone()),
        created_at: Set(now),
        updated_at: Set(now),
        completed_at: Set((status == TicketStatus::Completed).then_some(now)),
        cancelled_at: Set(None),
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)?;

    let lines = write_lines(conn, ticket.id, items, effect, log).await?;
    Ok((ticket, lines))
}

/// Gives back the soft locks held by `lines`. Lines whose lot no longer exists are skipped.
pub(crate) async fn release_lines<C: ConnectionTrait>(
    conn: &C,
    lines: &[export_ticket_item::Model],
    log: &mut LotWriteLog,
) -> Result<(), ServiceError> {
    let totals = super::lot_writes::quantities_by_lot(lines.iter().map(|l| (l.lot_id, l.quantity)));
    let lots = load_lots(conn, totals.keys().copied()).await?;
    for (lot_id, quantity) in totals {
        match lots.get(&lot_id) {
            Some(lot) => {
                apply_and_log(conn, lot, LotChange::release(quantity), log).await?;
            }
            None => tracing::warn!(%lot_id, quantity, "Cannot release allocation of missing lot"),
        }
    }
    Ok(())
}

/// Moves a pending ticket to `to`, failing if someone else moved it first.
pub(crate) async fn transition<C: ConnectionTrait>(
    conn: &C,
    ticket_id: Uuid,
    to: TicketStatus,
    now: DateTime<Utc>,
) -> Result<export_ticket::Model, ServiceError> {
    let mut update = export_ticket::Entity::update_many()
        .col_expr(export_ticket::Column::Status, Expr::value(to.as_str()))
        .col_expr(export_ticket::Column::UpdatedAt, Expr::value(now));
    update = match to {
        TicketStatus::Completed => {
            update.col_expr(export_ticket::Column::CompletedAt, Expr::value(now))
        }
        TicketStatus::Cancelled => {
            update.col_expr(export_ticket::Column::CancelledAt, Expr::value(now))
        }
        TicketStatus::Pending => update,
    };

    let result = update
        .filter(export_ticket::Column::Id.eq(ticket_id))
        .filter(export_ticket::Column::Status.eq(TicketStatus::Pending.as_str()))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;
    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrentModification(ticket_id));
    }

    export_ticket::Entity::find_by_id(ticket_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Export ticket {} not found", ticket_id)))
}
