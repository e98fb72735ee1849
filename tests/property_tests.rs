//! Property-based tests for FEFO allocation and summary aggregation.
//!
//! Lots are generated in memory; nothing here touches a database.

use chrono::{NaiveDate, Utc};
use medstock_api::entities::inventory_lot;
use medstock_api::services::allocation::allocate_fefo;
use medstock_api::services::product_summary::aggregate;
use proptest::prelude::*;
use uuid::Uuid;

fn lot(remaining: i64, allocated: i64, expiry_offset: Option<u32>) -> inventory_lot::Model {
    let now = Utc::now();
    let base = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap_or_default();
    inventory_lot::Model {
        id: Uuid::new_v4(),
        product_id: "PROP-1".to_string(),
        lot_number: Some("L1".to_string()),
        expiry_date: expiry_offset.map(|d| base + chrono::Duration::days(d as i64)),
        quantity_imported: remaining,
        quantity_remaining: remaining,
        quantity_allocated: allocated.min(remaining),
        import_date: now,
        supplier_id: None,
        notes: None,
        subgroup: None,
        version: 0,
        created_at: now,
        updated_at: now,
    }
}

fn lot_strategy() -> impl Strategy<Value = inventory_lot::Model> {
    (0i64..500, 0i64..200, prop::option::of(0u32..720))
        .prop_map(|(remaining, allocated, expiry)| lot(remaining, allocated, expiry))
}

fn lots_strategy() -> impl Strategy<Value = Vec<inventory_lot::Model>> {
    prop::collection::vec(lot_strategy(), 1..12)
}

proptest! {
    #[test]
    fn distribution_sums_to_request_within_availability(
        lots in lots_strategy(),
        fraction in 0.0f64..=1.0,
    ) {
        let total: i64 = lots.iter().map(|l| l.available()).sum();
        prop_assume!(total > 0);
        let requested = ((total as f64 * fraction).ceil() as i64).clamp(1, total);

        let draws = allocate_fefo(&lots, requested).unwrap();

        prop_assert_eq!(draws.iter().map(|d| d.quantity).sum::<i64>(), requested);
        for draw in &draws {
            let source = lots.iter().find(|l| l.id == draw.lot_id).unwrap();
            prop_assert!(draw.quantity > 0);
            prop_assert!(draw.quantity <= source.available());
        }
    }

    #[test]
    fn earlier_expiry_is_drained_before_later(
        lots in lots_strategy(),
        fraction in 0.0f64..=1.0,
    ) {
        let total: i64 = lots.iter().map(|l| l.available()).sum();
        prop_assume!(total > 0);
        let requested = ((total as f64 * fraction).ceil() as i64).clamp(1, total);

        let draws = allocate_fefo(&lots, requested).unwrap();
        let drawn_from = |id: Uuid| draws.iter().find(|d| d.lot_id == id).map(|d| d.quantity);

        for later in lots.iter().filter(|l| drawn_from(l.id).is_some()) {
            for earlier in lots.iter().filter(|l| l.available() > 0) {
                if let (Some(e), Some(x)) = (earlier.expiry_date, later.expiry_date) {
                    if e < x {
                        prop_assert_eq!(drawn_from(earlier.id), Some(earlier.available()));
                    }
                }
            }
        }
    }

    #[test]
    fn over_request_is_rejected(lots in lots_strategy(), extra in 1i64..50) {
        let total: i64 = lots.iter().map(|l| l.available()).sum();
        prop_assert!(allocate_fefo(&lots, total + extra).is_err());
    }

    #[test]
    fn aggregate_counts_only_lots_with_stock(lots in lots_strategy()) {
        let expected: i64 = lots
            .iter()
            .filter(|l| l.quantity_remaining > 0)
            .map(|l| l.quantity_remaining)
            .sum();

        match aggregate(&lots) {
            Some(agg) => {
                prop_assert_eq!(agg.total_remaining, expected);
                let nearest = lots
                    .iter()
                    .filter(|l| l.quantity_remaining > 0)
                    .filter_map(|l| l.expiry_date)
                    .min();
                prop_assert_eq!(agg.nearest_expiry_date, nearest);
            }
            None => prop_assert_eq!(expected, 0),
        }
    }
}
