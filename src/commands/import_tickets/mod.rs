//! Import ticket lifecycle: create pending, direct import, confirm, edit, cancel and delete.

pub mod cancel_import_ticket_command;
pub mod confirm_import_command;
pub mod create_import_ticket_command;
pub mod delete_import_ticket_command;
pub mod direct_import_command;
pub mod update_import_ticket_command;

pub use cancel_import_ticket_command::CancelImportTicketCommand;
pub use confirm_import_command::ConfirmImportCommand;
pub use create_import_ticket_command::CreateImportTicketCommand;
pub use delete_import_ticket_command::DeleteImportTicketCommand;
pub use direct_import_command::DirectImportCommand;
pub use update_import_ticket_command::UpdateImportTicketCommand;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::lot_writes::LotWriteLog;
use super::{ensure_has_lines, ensure_partner_exists, ensure_positive_quantities, load_products};
use crate::entities::product::normalize_code;
use crate::entities::{import_ticket, import_ticket_item, inventory_lot, TicketStatus};
use crate::errors::ServiceError;

/// One line of received stock.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ImportItemRequest {
    #[validate(length(min = 1, message = "Product code is required"))]
    pub product_id: String,
    #[validate(length(max = 100))]
    pub lot_number: Option<String>,
    /// Free text: `YYYY-MM-DD`, `DD/MM/YYYY`, `DD-MM-YYYY` or `MM/YYYY`
    pub expiry_date: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ImportTicketHeader {
    /// Supplier the stock comes from
    #[validate(length(min = 1, message = "Partner is required"))]
    pub partner_id: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(email)]
    pub created_by: Option<String>,
}

/// Parses an operator-entered expiry date. Blank text means the lot has no expiry.
///
/// `MM/YYYY` resolves to the last day of that month.
pub fn parse_expiry_date(raw: &str) -> Result<Option<NaiveDate>, ServiceError> {
    let text = raw.trim();
    if text.is_empty() {
        return Ok(None);
    }

    for format in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Ok(Some(date));
        }
    }

    if let Some((month, year)) = text.split_once('/') {
        if let (Ok(month), Ok(year)) = (month.parse::<u32>(), year.parse::<i32>()) {
            if year >= 1000 {
                if let Some(date) = last_day_of_month(year, month) {
                    return Ok(Some(date));
                }
            }
        }
    }

    Err(ServiceError::ValidationError(format!(
        "Unrecognized expiry date '{}'",
        text
    )))
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    next.pred_opt()
}

/// Checks lines up front: count, quantities, field rules and expiry text.
pub(crate) fn validate_items(items: &[ImportItemRequest]) -> Result<(), ServiceError> {
    ensure_has_lines(items)?;
    ensure_positive_quantities(items.iter().map(|i| i.quantity))?;
    for (index, item) in items.iter().enumerate() {
        item.validate()?;
        if let Some(raw) = &item.expiry_date {
            parse_expiry_date(raw).map_err(|e| match e {
                ServiceError::ValidationError(msg) => {
                    ServiceError::ValidationError(format!("Line {}: {}", index + 1, msg))
                }
                other => other,
            })?;
        }
    }
    Ok(())
}

pub(crate) async fn insert_ticket<C: ConnectionTrait>(
    conn: &C,
    header: &ImportTicketHeader,
    status: TicketStatus,
) -> Result<import_ticket::Model, ServiceError> {
    ensure_partner_exists(conn, &header.partner_id).await?;

    let now = Utc::now();
    import_ticket::ActiveModel {
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
    .map_err(ServiceError::db_error)
}

/// Stores the lines of an import ticket; products must exist.
pub(crate) async fn insert_items<C: ConnectionTrait>(
    conn: &C,
    ticket_id: Uuid,
    items: &[ImportItemRequest],
) -> Result<Vec<import_ticket_item::Model>, ServiceError> {
    load_products(conn, items.iter().map(|i| i.product_id.clone())).await?;

    let mut stored = Vec::with_capacity(items.len());
    for (position, item) in items.iter().enumerate() {
        let line = import_ticket_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            ticket_id: Set(ticket_id),
            product_id: Set(normalize_code(&item.product_id)),
            lot_number: Set(item.lot_number.as_ref().map(|l| l.trim().to_string())),
            expiry_date: Set(item.expiry_date.clone()),
            quantity: Set(item.quantity),
            notes: Set(item.notes.clone()),
            position: Set(position as i32),
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;
        stored.push(line);
    }
    Ok(stored)
}

/// Creates one lot per line, received from `supplier_id`.
pub(crate) async fn create_lots<C: ConnectionTrait>(
    conn: &C,
    lines: &[import_ticket_item::Model],
    supplier_id: &str,
    log: &mut LotWriteLog,
) -> Result<Vec<inventory_lot::Model>, ServiceError> {
    let products = load_products(conn, lines.iter().map(|l| l.product_id.clone())).await?;
    let now = Utc::now();

    let mut lots = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Line {} has non-positive quantity {}",
                line.position + 1,
                line.quantity
            )));
        }
        let expiry_date = match &line.expiry_date {
            Some(raw) => parse_expiry_date(raw)?,
            None => None,
        };
        let product_id = normalize_code(&line.product_id);
        let subgroup = products.get(&product_id).and_then(|p| p.subgroup.clone());
        let lot_number = line
            .lot_number
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string);

        let lot = inventory_lot::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            lot_number: Set(lot_number),
            expiry_date: Set(expiry_date),
            quantity_imported: Set(line.quantity),
            quantity_remaining: Set(line.quantity),
            quantity_allocated: Set(0),
            import_date: Set(now),
            supplier_id: Set(Some(supplier_id.to_string())),
            notes: Set(line.notes.clone()),
            subgroup: Set(subgroup),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;

        log.created(lot.clone());
        lots.push(lot);
    }
    Ok(lots)
}

/// Moves a pending import ticket to `to`, failing if someone else moved it first.
pub(crate) async fn transition<C: ConnectionTrait>(
    conn: &C,
    ticket_id: Uuid,
    to: TicketStatus,
    now: DateTime<Utc>,
) -> Result<import_ticket::Model, ServiceError> {
    let mut update = import_ticket::Entity::update_many()
        .col_expr(import_ticket::Column::Status, Expr::value(to.as_str()))
        .col_expr(import_ticket::Column::UpdatedAt, Expr::value(now));
    update = match to {
        TicketStatus::Completed => {
            update.col_expr(import_ticket::Column::CompletedAt, Expr::value(now))
        }
        TicketStatus::Cancelled => {
            update.col_expr(import_ticket::Column::CancelledAt, Expr::value(now))
        }
        TicketStatus::Pending => update,
    };

    let result = update
        .filter(import_ticket::Column::Id.eq(ticket_id))
        .filter(import_ticket::Column::Status.eq(TicketStatus::Pending.as_str()))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;
    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrentModification(ticket_id));
    }

    import_ticket::Entity::find_by_id(ticket_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Import ticket {} not found", ticket_id)))
}
