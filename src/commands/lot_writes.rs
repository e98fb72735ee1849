//! Conditional writes to inventory lots.
//!
//! Every quantity change goes through [`apply_lot_change`], which recomputes the
//! new counters from the row read inside the caller's transaction and writes them
//! only if the row's `version` is still the one that was read. A concurrent writer
//! that got there first makes the update match zero rows, which surfaces as
//! `ConcurrentModification` and rolls back the caller's transaction.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;
use uuid::Uuid;

use crate::entities::inventory_lot::{self, Entity as InventoryLot};
use crate::errors::ServiceError;
use crate::events::{Event, LotWrite};

/// Signed adjustment of a lot's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotChange {
    pub remaining_delta: i64,
    pub allocated_delta: i64,
}

impl LotChange {
    /// Soft-lock `quantity` for a pending export.
    pub fn allocate(quantity: i64) -> Self {
        Self {
            remaining_delta: 0,
            allocated_delta: quantity,
        }
    }

    /// Give back a soft lock of `quantity`.
    pub fn release(quantity: i64) -> Self {
        Self {
            remaining_delta: 0,
            allocated_delta: -quantity,
        }
    }

    /// Ship `quantity` that was soft-locked by the same ticket.
    pub fn consume_allocated(quantity: i64) -> Self {
        Self {
            remaining_delta: -quantity,
            allocated_delta: -quantity,
        }
    }

    /// Ship `quantity` from free stock.
    pub fn consume(quantity: i64) -> Self {
        Self {
            remaining_delta: -quantity,
            allocated_delta: 0,
        }
    }
}

/// Counters a change would produce, or why it cannot be applied.
///
/// Releases floor at zero. Remaining may never go negative, and a change may not
/// push allocated above remaining unless the lot was already over-allocated and
/// the change does not make it worse.
pub fn next_counters(
    lot: &inventory_lot::Model,
    change: LotChange,
) -> Result<(i64, i64), ServiceError> {
    let remaining = lot.quantity_remaining + change.remaining_delta;
    let allocated = if change.allocated_delta < 0 {
        (lot.quantity_allocated + change.allocated_delta).max(0)
    } else {
        lot.quantity_allocated + change.allocated_delta
    };

    if remaining < 0 {
        return Err(ServiceError::insufficient_stock(
            format!("lot {} ({})", lot.lot_key(), lot.id),
            -change.remaining_delta,
            lot.quantity_remaining,
        ));
    }

    let before_available = lot.available();
    let after_available = remaining - allocated;
    if after_available < 0 && after_available < before_available {
        let requested = change.allocated_delta.max(0) - change.remaining_delta.min(0);
        return Err(ServiceError::insufficient_stock(
            format!("lot {} ({})", lot.lot_key(), lot.id),
            requested,
            before_available.max(0),
        ));
    }

    Ok((remaining, allocated))
}

/// Applies `change` to `lot` with a compare-and-swap on its version.
pub async fn apply_lot_change<C: ConnectionTrait>(
    conn: &C,
    lot: &inventory_lot::Model,
    change: LotChange,
) -> Result<inventory_lot::Model, ServiceError> {
    let (remaining, allocated) = next_counters(lot, change)?;
    let now = Utc::now();

    let result = InventoryLot::update_many()
        .col_expr(inventory_lot::Column::QuantityRemaining, Expr::value(remaining))
        .col_expr(inventory_lot::Column::QuantityAllocated, Expr::value(allocated))
        .col_expr(inventory_lot::Column::Version, Expr::value(lot.version + 1))
        .col_expr(inventory_lot::Column::UpdatedAt, Expr::value(now))
        .filter(inventory_lot::Column::Id.eq(lot.id))
        .filter(inventory_lot::Column::Version.eq(lot.version))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        warn!(lot_id = %lot.id, version = lot.version, "Lot changed concurrently");
        return Err(ServiceError::ConcurrentModification(lot.id));
    }

    Ok(inventory_lot::Model {
        quantity_remaining: remaining,
        quantity_allocated: allocated,
        version: lot.version + 1,
        updated_at: now,
        ..lot.clone()
    })
}

/// Loads the given lots, keyed by id. Missing ids are simply absent from the map.
pub async fn load_lots<C: ConnectionTrait>(
    conn: &C,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, inventory_lot::Model>, ServiceError> {
    let ids: Vec<Uuid> = ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let lots = InventoryLot::find()
        .filter(inventory_lot::Column::Id.is_in(ids))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(lots.into_iter().map(|lot| (lot.id, lot)).collect())
}

/// Lot writes made inside one transaction, collapsed to one before/after pair per lot.
#[derive(Debug, Default)]
pub struct LotWriteLog {
    entries: BTreeMap<Uuid, LotWrite>,
}

impl LotWriteLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&mut self, after: inventory_lot::Model) {
        self.entries.insert(after.id, LotWrite::Created { after });
    }

    /// Records an update, keeping the earliest `before` seen for the lot.
    pub fn updated(&mut self, before: &inventory_lot::Model, after: inventory_lot::Model) {
        let entry = self.entries.remove(&after.id);
        let write = match entry {
            Some(LotWrite::Created { .. }) => LotWrite::Created { after },
            Some(LotWrite::Updated { before, .. }) => LotWrite::Updated { before, after },
            Some(LotWrite::Deleted { .. }) | None => LotWrite::Updated {
                before: before.clone(),
                after,
            },
        };
        self.entries.insert(write.lot_id(), write);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.entries.into_values().map(Event::LotWritten).collect()
    }
}

/// Applies `change` and records the write in `log`.
pub async fn apply_and_log<C: ConnectionTrait>(
    conn: &C,
    lot: &inventory_lot::Model,
    change: LotChange,
    log: &mut LotWriteLog,
) -> Result<inventory_lot::Model, ServiceError> {
    let after = apply_lot_change(conn, lot, change).await?;
    log.updated(lot, after.clone());
    Ok(after)
}

/// Sums line quantities per lot, in lot-id order so writes happen in a stable order.
pub fn quantities_by_lot(lines: impl IntoIterator<Item = (Uuid, i64)>) -> BTreeMap<Uuid, i64> {
    let mut totals = BTreeMap::new();
    for (lot_id, quantity) in lines {
        *totals.entry(lot_id).or_insert(0) += quantity;
    }
    totals
}
