mod common;

use assert_matches::assert_matches;
use common::{days_from_now, TestApp};
use medstock_api::{
    commands::export_tickets::{
        CancelExportCommand, ConfirmExportCommand, DirectExportCommand, ExportItemRequest,
        ExportTicketHeader, SaveExportDraftCommand, UpdateExportTicketCommand,
    },
    commands::Command,
    config::AllocationReleasePolicy,
    entities::TicketStatus,
    errors::ServiceError,
    events::Event,
    services::tickets::ExportTicketDetails,
};

fn header() -> ExportTicketHeader {
    ExportTicketHeader {
        partner_id: "HOSP-1".to_string(),
        description: Some("Ward restock".to_string()),
        created_by: Some("clerk@example.com".to_string()),
    }
}

fn item(product: &str, lot: &str, quantity: i64) -> ExportItemRequest {
    ExportItemRequest {
        product_id: product.to_string(),
        lot_number: Some(lot.to_string()),
        quantity,
    }
}

async fn seeded() -> TestApp {
    let app = TestApp::new().await;
    app.seed_product("REAG-01", "Reagent A").await;
    app.seed_partner("HOSP-1", "City Hospital").await;
    app
}

async fn draft(
    app: &TestApp,
    items: Vec<ExportItemRequest>,
) -> Result<ExportTicketDetails, ServiceError> {
    SaveExportDraftCommand {
        header: header(),
        items,
    }
    .execute(app.db(), app.events())
    .await
}

#[tokio::test]
async fn draft_draws_earliest_expiry_first() {
    let app = seeded().await;
    let later = app.seed_lot("REAG-01", Some("L1"), Some(days_from_now(10)), 100).await;
    let sooner = app.seed_lot("REAG-01", Some("L1"), Some(days_from_now(5)), 50).await;

    let details = draft(&app, vec![item("REAG-01", "L1", 120)]).await.unwrap();

    assert_eq!(details.ticket.status, "pending");
    assert_eq!(details.items.len(), 2);
    assert_eq!(details.items[0].lot_id, sooner.id);
    assert_eq!(details.items[0].quantity, 50);
    assert_eq!(details.items[1].lot_id, later.id);
    assert_eq!(details.items[1].quantity, 70);
    assert_eq!(details.items[0].team.as_deref(), Some("Team North"));

    let sooner = app.lot(sooner.id).await;
    let later = app.lot(later.id).await;
    assert_eq!((sooner.quantity_remaining, sooner.quantity_allocated), (50, 50));
    assert_eq!((later.quantity_remaining, later.quantity_allocated), (100, 70));
}

#[tokio::test]
async fn second_draft_cannot_take_soft_locked_stock() {
    let app = seeded().await;
    let lot = app.seed_lot("REAG-01", Some("L1"), Some(days_from_now(30)), 10).await;

    draft(&app, vec![item("REAG-01", "L1", 10)]).await.unwrap();
    assert_eq!(app.lot(lot.id).await.quantity_allocated, 10);

    let err = draft(&app, vec![item("REAG-01", "L1", 5)]).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    let lot = app.lot(lot.id).await;
    assert_eq!(lot.quantity_allocated, 10);
    assert_eq!(lot.available(), 0);
}

#[tokio::test]
async fn two_lines_on_one_lot_cannot_double_spend() {
    let app = seeded().await;
    app.seed_lot("REAG-01", Some("L1"), None, 8).await;

    let err = draft(&app, vec![item("REAG-01", "L1", 5), item("REAG-01", "L1", 5)])
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));
}

#[tokio::test]
async fn cancel_releases_allocation_by_default() {
    let app = seeded().await;
    let lot = app.seed_lot("REAG-01", Some("L1"), Some(days_from_now(30)), 10).await;
    let details = draft(&app, vec![item("REAG-01", "L1", 10)]).await.unwrap();

    let cancelled = CancelExportCommand::new(details.ticket.id, AllocationReleasePolicy::Release)
        .execute(app.db(), app.events())
        .await
        .unwrap();

    assert_eq!(cancelled.ticket.status, "cancelled");
    assert!(cancelled.ticket.cancelled_at.is_some());
    let lot = app.lot(lot.id).await;
    assert_eq!(lot.quantity_allocated, 0);
    assert_eq!(lot.quantity_remaining, 10);

    let events = app.drain_events().await;
    assert!(events.iter().any(|e| matches!(
        e,
        Event::ExportTicketCancelled { released: true, .. }
    )));

    let report = app.state.services.reconciliation.run(None).await.unwrap();
    assert!(report.findings_for("allocation-mismatch").is_empty());
}

#[tokio::test]
async fn cancel_under_retain_leaves_stranded_allocation() {
    let app = seeded().await;
    let lot = app.seed_lot("REAG-01", Some("L1"), Some(days_from_now(30)), 10).await;
    let details = draft(&app, vec![item("REAG-01", "L1", 10)]).await.unwrap();

    CancelExportCommand::new(details.ticket.id, AllocationReleasePolicy::Retain)
        .execute(app.db(), app.events())
        .await
        .unwrap();

    // nothing holds the lock any more, yet the stock cannot be exported
    let lot = app.lot(lot.id).await;
    assert_eq!(lot.quantity_allocated, 10);
    assert_eq!(lot.available(), 0);
    let err = draft(&app, vec![item("REAG-01", "L1", 1)]).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    let report = app.state.services.reconciliation.run(None).await.unwrap();
    let drift = report.findings_for("allocation-mismatch");
    assert_eq!(drift.len(), 1);
    assert!(drift[0].entity_ids.contains(&lot.id.to_string()));
}

#[tokio::test]
async fn allocation_bound_can_be_broken_by_outside_writers() {
    let app = seeded().await;
    let lot = app.seed_lot("REAG-01", Some("L1"), Some(days_from_now(30)), 10).await;
    draft(&app, vec![item("REAG-01", "L1", 10)]).await.unwrap();

    // stock shrinks underneath a soft lock, e.g. a write that bypassed the lot guard
    app.force_counters(lot.id, 6, 10).await;
    let lot = app.lot(lot.id).await;
    assert!(lot.quantity_allocated > lot.quantity_remaining);

    let report = app.state.services.reconciliation.run(None).await.unwrap();
    assert_eq!(report.findings_for("allocated-exceeds-remaining").len(), 1);
    assert!(!report.is_healthy());
}

#[tokio::test]
async fn confirm_consumes_allocated_stock() {
    let app = seeded().await;
    let lot = app.seed_lot("REAG-01", Some("L1"), Some(days_from_now(30)), 100).await;
    let details = draft(&app, vec![item("REAG-01", "L1", 30)]).await.unwrap();

    let confirmed = ConfirmExportCommand {
        ticket_id: details.ticket.id,
    }
    .execute(app.db(), app.events())
    .await
    .unwrap();

    assert_eq!(confirmed.ticket.status, TicketStatus::Completed.as_str());
    assert!(confirmed.ticket.completed_at.is_some());
    let lot = app.lot(lot.id).await;
    assert_eq!(lot.quantity_remaining, 70);
    assert_eq!(lot.quantity_allocated, 0);

    app.drain_events().await;
    let summary = app.state.services.summaries.get("REAG-01").await.unwrap();
    assert_eq!(summary.total_remaining, 70);
}

#[tokio::test]
async fn confirm_that_would_go_negative_changes_nothing() {
    let app = seeded().await;
    let first = app.seed_lot("REAG-01", Some("L1"), Some(days_from_now(5)), 5).await;
    let second = app.seed_lot("REAG-01", Some("L1"), Some(days_from_now(10)), 10).await;
    let details = draft(&app, vec![item("REAG-01", "L1", 12)]).await.unwrap();

    app.force_counters(second.id, 3, 7).await;

    let err = ConfirmExportCommand {
        ticket_id: details.ticket.id,
    }
    .execute(app.db(), app.events())
    .await
    .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    let first = app.lot(first.id).await;
    assert_eq!((first.quantity_remaining, first.quantity_allocated), (5, 5));
    assert_eq!(app.lot(second.id).await.quantity_remaining, 3);

    let ticket = app
        .state
        .services
        .tickets
        .get_export_ticket(details.ticket.id)
        .await
        .unwrap();
    assert_eq!(ticket.ticket.status, "pending");
}

#[tokio::test]
async fn finished_tickets_cannot_change() {
    let app = seeded().await;
    app.seed_lot("REAG-01", Some("L1"), None, 20).await;
    let details = draft(&app, vec![item("REAG-01", "L1", 5)]).await.unwrap();
    let id = details.ticket.id;

    ConfirmExportCommand { ticket_id: id }
        .execute(app.db(), app.events())
        .await
        .unwrap();

    let again = ConfirmExportCommand { ticket_id: id }
        .execute(app.db(), app.events())
        .await;
    assert_matches!(again, Err(ServiceError::InvalidStatus(_)));

    let cancel = CancelExportCommand::new(id, AllocationReleasePolicy::Release)
        .execute(app.db(), app.events())
        .await;
    assert_matches!(cancel, Err(ServiceError::InvalidStatus(_)));
}

#[tokio::test]
async fn edit_releases_and_replans() {
    let app = seeded().await;
    let lot_a = app.seed_lot("REAG-01", Some("L1"), Some(days_from_now(5)), 10).await;
    let lot_b = app.seed_lot("REAG-01", Some("L2"), Some(days_from_now(20)), 10).await;
    let details = draft(&app, vec![item("REAG-01", "L1", 8)]).await.unwrap();

    let updated = UpdateExportTicketCommand {
        ticket_id: details.ticket.id,
        partner_id: None,
        description: Some("Corrected".to_string()),
        items: vec![item("REAG-01", "L1", 3), item("REAG-01", "L2", 4)],
    }
    .execute(app.db(), app.events())
    .await
    .unwrap();

    assert_eq!(updated.items.len(), 2);
    assert_eq!(updated.total_quantity(), 7);
    assert_eq!(updated.ticket.description.as_deref(), Some("Corrected"));
    assert_eq!(app.lot(lot_a.id).await.quantity_allocated, 3);
    assert_eq!(app.lot(lot_b.id).await.quantity_allocated, 4);
}

#[tokio::test]
async fn direct_export_takes_free_stock_only() {
    let app = seeded().await;
    let lot = app.seed_lot("REAG-01", None, None, 10).await;
    draft(
        &app,
        vec![ExportItemRequest {
            product_id: "REAG-01".to_string(),
            lot_number: None,
            quantity: 6,
        }],
    )
    .await
    .unwrap();

    let direct = |quantity| DirectExportCommand {
        header: header(),
        items: vec![ExportItemRequest {
            product_id: "reag-01".to_string(),
            lot_number: Some("  ".to_string()),
            quantity,
        }],
    };

    let err = direct(5).execute(app.db(), app.events()).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    let done = direct(4).execute(app.db(), app.events()).await.unwrap();
    assert_eq!(done.ticket.status, "completed");
    let lot = app.lot(lot.id).await;
    assert_eq!((lot.quantity_remaining, lot.quantity_allocated), (6, 6));
}

#[tokio::test]
async fn rejects_unknown_partner_and_empty_tickets() {
    let app = seeded().await;
    app.seed_lot("REAG-01", Some("L1"), None, 10).await;

    let unknown = SaveExportDraftCommand {
        header: ExportTicketHeader {
            partner_id: "NOBODY".to_string(),
            ..header()
        },
        items: vec![item("REAG-01", "L1", 1)],
    }
    .execute(app.db(), app.events())
    .await;
    assert_matches!(unknown, Err(ServiceError::NotFound(_)));

    let empty = draft(&app, vec![]).await;
    assert_matches!(empty, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn padded_lot_numbers_join_their_aggregated_lot() {
    use medstock_api::services::allocation::AggregatedLotKey;

    let app = TestApp::new().await;
    app.seed_product("GAUZE-1", "Gauze pad").await;
    app.seed_partner("HOSP-1", "City Hospital").await;
    let padded = app.seed_lot("GAUZE-1", Some(" G7 "), Some(days_from_now(10)), 5).await;
    let clean = app.seed_lot("GAUZE-1", Some("G7"), Some(days_from_now(40)), 10).await;

    let groups = app
        .state
        .services
        .allocation
        .list_aggregated_lots("GAUZE-1")
        .await
        .unwrap();
    assert_eq!(groups.len(), 1);

    let plan = app
        .state
        .services
        .allocation
        .plan(&AggregatedLotKey::new("GAUZE-1", Some("G7")), 12)
        .await
        .unwrap();
    let drawn: Vec<_> = plan.draws.iter().map(|d| (d.lot_id, d.quantity)).collect();
    assert_eq!(drawn, vec![(padded.id, 5), (clean.id, 7)]);
}
