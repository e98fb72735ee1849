mod common;

use assert_matches::assert_matches;
use common::{days_from_now, TestApp};
use medstock_api::{
    commands::export_tickets::{ExportItemRequest, ExportTicketHeader, SaveExportDraftCommand},
    commands::lot_writes::{apply_lot_change, LotChange},
    commands::Command,
    entities::export_ticket,
    errors::ServiceError,
};
use sea_orm::{EntityTrait, PaginatorTrait, TransactionError, TransactionTrait};

#[tokio::test]
async fn stale_lot_row_loses_the_version_check() {
    let app = TestApp::new().await;
    app.seed_product("SAL-500", "Saline 500ml").await;
    let lot = app.seed_lot("SAL-500", Some("S1"), Some(days_from_now(90)), 50).await;

    let stale = lot.clone();
    let outcome = app
        .db()
        .transaction::<_, (), ServiceError>(move |txn| {
            Box::pin(async move {
                let first = apply_lot_change(txn, &stale, LotChange::allocate(10)).await?;
                assert_eq!(first.version, stale.version + 1);
                apply_lot_change(txn, &stale, LotChange::allocate(10)).await?;
                Ok(())
            })
        })
        .await;

    assert_matches!(
        outcome,
        Err(TransactionError::Transaction(ServiceError::ConcurrentModification(id)))
            if id == lot.id
    );

    let after = app.lot(lot.id).await;
    assert_eq!(after.quantity_allocated, 0);
    assert_eq!(after.version, lot.version);
}

#[tokio::test]
async fn conflict_rolls_back_earlier_lot_writes() {
    let app = TestApp::new().await;
    app.seed_product("SAL-500", "Saline 500ml").await;
    let first = app.seed_lot("SAL-500", Some("S1"), Some(days_from_now(30)), 20).await;
    let second = app.seed_lot("SAL-500", Some("S2"), Some(days_from_now(60)), 20).await;

    let (a, b) = (first.clone(), second.clone());
    let outcome = app
        .db()
        .transaction::<_, (), ServiceError>(move |txn| {
            Box::pin(async move {
                apply_lot_change(txn, &a, LotChange::allocate(5)).await?;
                // another writer bumps the second lot before we get to it
                apply_lot_change(txn, &b, LotChange::consume(1)).await?;
                apply_lot_change(txn, &b, LotChange::allocate(5)).await?;
                Ok(())
            })
        })
        .await;
    assert_matches!(
        outcome,
        Err(TransactionError::Transaction(ServiceError::ConcurrentModification(id)))
            if id == second.id
    );

    for seeded in [&first, &second] {
        let lot = app.lot(seeded.id).await;
        assert_eq!(
            (lot.quantity_remaining, lot.quantity_allocated, lot.version),
            (seeded.quantity_remaining, 0, seeded.version)
        );
    }
}

#[tokio::test]
async fn concurrent_drafts_never_oversell_a_lot() {
    let app = TestApp::new().await;
    app.seed_product("SAL-500", "Saline 500ml").await;
    app.seed_partner("HOSP-1", "City Hospital").await;
    let lot = app.seed_lot("SAL-500", Some("S1"), Some(days_from_now(90)), 10).await;

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let (db, events) = (app.db(), app.events());
        tasks.push(tokio::spawn(async move {
            SaveExportDraftCommand {
                header: ExportTicketHeader {
                    partner_id: "HOSP-1".to_string(),
                    description: None,
                    created_by: None,
                },
                items: vec![ExportItemRequest {
                    product_id: "SAL-500".to_string(),
                    lot_number: Some("S1".to_string()),
                    quantity: 1,
                }],
            }
            .execute(db, events)
            .await
        }));
    }

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) => assert_matches!(
                e,
                ServiceError::InsufficientStock(_) | ServiceError::ConcurrentModification(_)
            ),
        }
    }
    assert_eq!(accepted, 10);

    let lot = app.lot(lot.id).await;
    assert_eq!((lot.quantity_remaining, lot.quantity_allocated), (10, 10));
    let tickets = export_ticket::Entity::find()
        .count(app.db().as_ref())
        .await
        .unwrap();
    assert_eq!(tickets, 10);
}
