//! FEFO allocation over aggregated lots.
//!
//! Lots of one product that share a lot number are presented to operators as a
//! single aggregated lot. Export requests name the aggregated lot and a quantity;
//! the engine here splits that quantity across the underlying lots, earliest
//! expiry first, never drawing more than a lot's available quantity
//! (`quantity_remaining - quantity_allocated`).

use chrono::NaiveDate;
use sea_orm::sea_query::{Alias, Expr, Func, SimpleExpr};
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::inventory_lot::{self, Entity as InventoryLot, NO_LOT_NUMBER};
use crate::entities::product::normalize_code;
use crate::errors::ServiceError;

/// Identifies an aggregated lot: every lot of `product_id` whose lot number is `lot_number`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregatedLotKey {
    pub product_id: String,
    pub lot_number: String,
}

impl AggregatedLotKey {
    pub fn new(product_id: &str, lot_number: Option<&str>) -> Self {
        Self {
            product_id: normalize_code(product_id),
            lot_number: inventory_lot::normalize_lot_number(lot_number).to_string(),
        }
    }

    pub fn of(lot: &inventory_lot::Model) -> Self {
        Self::new(&lot.product_id, lot.lot_number.as_deref())
    }
}

impl fmt::Display for AggregatedLotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.product_id, self.lot_number)
    }
}

impl FromStr for AggregatedLotKey {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once("::") {
            Some((product, lot)) if !product.trim().is_empty() => {
                Ok(Self::new(product, Some(lot)))
            }
            _ => Err(ServiceError::ValidationError(format!(
                "Invalid aggregated lot key '{}', expected PRODUCT::LOT",
                s
            ))),
        }
    }
}

/// Quantity to take from one concrete lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDraw {
    pub lot_id: Uuid,
    pub lot_number: String,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: i64,
}

/// Distribution of one request across the lots of an aggregated lot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub key: AggregatedLotKey,
    pub requested: i64,
    pub draws: Vec<LotDraw>,
}

/// Operator-facing view of an aggregated lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedLot {
    pub key: String,
    pub product_id: String,
    pub lot_number: String,
    pub nearest_expiry: Option<NaiveDate>,
    pub total_remaining: i64,
    pub total_allocated: i64,
    pub total_available: i64,
    pub lot_ids: Vec<Uuid>,
}

/// Expiry ascending with undated lots last, then import date, then id.
pub fn fefo_cmp(a: &inventory_lot::Model, b: &inventory_lot::Model) -> Ordering {
    let by_expiry = match (a.expiry_date, b.expiry_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_expiry
        .then_with(|| a.import_date.cmp(&b.import_date))
        .then_with(|| a.id.cmp(&b.id))
}

/// Splits `requested` across `lots` in FEFO order.
///
/// Fails with `InsufficientStock` when the lots together cannot cover the request;
/// the engine never returns a partial distribution.
pub fn allocate_fefo(
    lots: &[inventory_lot::Model],
    requested: i64,
) -> Result<Vec<LotDraw>, ServiceError> {
    if requested <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "Requested quantity must be positive, got {}",
            requested
        )));
    }
    if lots.is_empty() {
        return Err(ServiceError::NotFound(
            "No lots to allocate from".to_string(),
        ));
    }

    let mut ordered: Vec<&inventory_lot::Model> = lots.iter().collect();
    ordered.sort_by(|a, b| fefo_cmp(a, b));

    let mut outstanding = requested;
    let mut draws = Vec::new();
    for lot in ordered {
        if outstanding == 0 {
            break;
        }
        let available = lot.available();
        if available <= 0 {
            continue;
        }
        let take = outstanding.min(available);
        draws.push(LotDraw {
            lot_id: lot.id,
            lot_number: lot.lot_key().to_string(),
            expiry_date: lot.expiry_date,
            quantity: take,
        });
        outstanding -= take;
    }

    if outstanding > 0 {
        let available: i64 = lots.iter().map(|l| l.available().max(0)).sum();
        let subject = lots
            .first()
            .map(|l| AggregatedLotKey::of(l).to_string())
            .unwrap_or_default();
        return Err(ServiceError::insufficient_stock(
            format!("aggregated lot {}", subject),
            requested,
            available,
        ));
    }

    Ok(draws)
}

/// Groups lots with stock by aggregated key, nearest expiry first.
pub fn aggregate_lots(lots: &[inventory_lot::Model]) -> Vec<AggregatedLot> {
    let mut groups: BTreeMap<AggregatedLotKey, Vec<&inventory_lot::Model>> = BTreeMap::new();
    for lot in lots.iter().filter(|l| l.quantity_remaining > 0) {
        groups.entry(AggregatedLotKey::of(lot)).or_default().push(lot);
    }

    let mut aggregated: Vec<AggregatedLot> = groups
        .into_iter()
        .map(|(key, members)| AggregatedLot {
            key: key.to_string(),
            nearest_expiry: members.iter().filter_map(|l| l.expiry_date).min(),
            total_remaining: members.iter().map(|l| l.quantity_remaining).sum(),
            total_allocated: members.iter().map(|l| l.quantity_allocated).sum(),
            total_available: members.iter().map(|l| l.available().max(0)).sum(),
            lot_ids: members.iter().map(|l| l.id).collect(),
            product_id: key.product_id,
            lot_number: key.lot_number,
        })
        .collect();

    aggregated.sort_by(|a, b| match (a.nearest_expiry, b.nearest_expiry) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.lot_number.cmp(&b.lot_number)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.lot_number.cmp(&b.lot_number),
    });
    aggregated
}

fn trimmed_lot_number() -> SimpleExpr {
    Func::cust(Alias::new("TRIM"))
        .arg(Expr::col(inventory_lot::Column::LotNumber))
        .into()
}

/// Loads the lots behind an aggregated key that still hold stock.
///
/// Stored lot numbers are compared trimmed, the same way [`AggregatedLotKey::of`] groups them.
pub async fn constituent_lots<C: ConnectionTrait>(
    conn: &C,
    key: &AggregatedLotKey,
) -> Result<Vec<inventory_lot::Model>, ServiceError> {
    let lot_filter = if key.lot_number == NO_LOT_NUMBER {
        Condition::any()
            .add(inventory_lot::Column::LotNumber.is_null())
            .add(Expr::expr(trimmed_lot_number()).eq(""))
            .add(Expr::expr(trimmed_lot_number()).eq(NO_LOT_NUMBER))
    } else {
        Condition::all().add(Expr::expr(trimmed_lot_number()).eq(key.lot_number.as_str()))
    };

    let mut lots = InventoryLot::find()
        .filter(inventory_lot::Column::ProductId.eq(key.product_id.as_str()))
        .filter(inventory_lot::Column::QuantityRemaining.gt(0))
        .filter(lot_filter)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    lots.retain(|lot| AggregatedLotKey::of(lot) == *key);
    lots.sort_by(fefo_cmp);
    Ok(lots)
}

/// Plans a draw against the current lot store through `conn`, which may be a transaction.
pub async fn plan_on<C: ConnectionTrait>(
    conn: &C,
    key: &AggregatedLotKey,
    requested: i64,
) -> Result<AllocationPlan, ServiceError> {
    let lots = constituent_lots(conn, key).await?;
    if lots.is_empty() {
        warn!(key = %key, "Aggregated lot has no stock");
        return Err(ServiceError::NotFound(format!(
            "No lots with stock for aggregated lot {}",
            key
        )));
    }

    let draws = allocate_fefo(&lots, requested)?;
    debug!(key = %key, requested, draws = draws.len(), "Planned FEFO allocation");
    Ok(AllocationPlan {
        key: key.clone(),
        requested,
        draws,
    })
}

/// Read-side entry point for allocation previews.
#[derive(Clone)]
pub struct AllocationService {
    db_pool: Arc<DbPool>,
}

impl AllocationService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Aggregated lots of a product, nearest expiry first.
    #[instrument(skip(self))]
    pub async fn list_aggregated_lots(
        &self,
        product_id: &str,
    ) -> Result<Vec<AggregatedLot>, ServiceError> {
        let lots = InventoryLot::find()
            .filter(inventory_lot::Column::ProductId.eq(normalize_code(product_id)))
            .filter(inventory_lot::Column::QuantityRemaining.gt(0))
            .order_by_asc(inventory_lot::Column::ExpiryDate)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(aggregate_lots(&lots))
    }

    /// Computes a distribution without writing anything.
    #[instrument(skip(self))]
    pub async fn plan(
        &self,
        key: &AggregatedLotKey,
        requested: i64,
    ) -> Result<AllocationPlan, ServiceError> {
        plan_on(&*self.db_pool, key, requested).await
    }
}
