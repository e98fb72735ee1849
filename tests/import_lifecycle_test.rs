mod common;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use common::TestApp;
use medstock_api::{
    commands::import_tickets::{
        CancelImportTicketCommand, ConfirmImportCommand, CreateImportTicketCommand,
        DeleteImportTicketCommand, DirectImportCommand, ImportItemRequest, ImportTicketHeader,
        UpdateImportTicketCommand,
    },
    commands::Command,
    errors::ServiceError,
    events::{Event, LotWrite},
};

fn header() -> ImportTicketHeader {
    ImportTicketHeader {
        partner_id: "SUP-1".to_string(),
        description: Some("Monthly delivery".to_string()),
        created_by: Some("receiving@example.com".to_string()),
    }
}

fn line(
    product: &str,
    lot: Option<&str>,
    expiry: Option<&str>,
    quantity: i64,
) -> ImportItemRequest {
    ImportItemRequest {
        product_id: product.to_string(),
        lot_number: lot.map(str::to_string),
        expiry_date: expiry.map(str::to_string),
        quantity,
        notes: None,
    }
}

async fn seeded() -> TestApp {
    let app = TestApp::new().await;
    app.seed_product("GLOVE-M", "Nitrile gloves M").await;
    app.seed_partner("SUP-1", "MedSupply Co").await;
    app
}

#[tokio::test]
async fn direct_import_creates_one_lot_per_line() {
    let app = seeded().await;

    let result = DirectImportCommand {
        header: header(),
        items: vec![
            line("glove-m", Some("G-100"), Some("31/12/2027"), 200),
            line("GLOVE-M", None, Some("06/2027"), 50),
        ],
    }
    .execute(app.db(), app.events())
    .await
    .unwrap();

    assert_eq!(result.details.ticket.status, "completed");
    assert_eq!(result.lots.len(), 2);

    let first = &result.lots[0];
    assert_eq!(first.product_id, "GLOVE-M");
    assert_eq!(first.lot_number.as_deref(), Some("G-100"));
    assert_eq!(first.expiry_date, NaiveDate::from_ymd_opt(2027, 12, 31));
    assert_eq!(first.quantity_imported, 200);
    assert_eq!(first.quantity_remaining, 200);
    assert_eq!(first.quantity_allocated, 0);
    assert_eq!(first.supplier_id.as_deref(), Some("SUP-1"));
    assert_eq!(first.subgroup.as_deref(), Some("Reagents"));

    let second = &result.lots[1];
    assert_eq!(second.lot_number, None);
    assert_eq!(second.expiry_date, NaiveDate::from_ymd_opt(2027, 6, 30));

    let events = app.drain_events().await;
    let created = events
        .iter()
        .filter(|e| matches!(e, Event::LotWritten(LotWrite::Created { .. })))
        .count();
    assert_eq!(created, 2);

    let summary = app.state.services.summaries.get("GLOVE-M").await.unwrap();
    assert_eq!(summary.total_remaining, 250);
    assert_eq!(summary.lot_count, 2);
    assert_eq!(summary.nearest_expiry_date, NaiveDate::from_ymd_opt(2027, 6, 30));
}

#[tokio::test]
async fn pending_import_touches_no_lots_until_confirmed() {
    let app = seeded().await;
    let created = CreateImportTicketCommand {
        header: header(),
        items: vec![line("GLOVE-M", Some("G-7"), Some("2028-01-15"), 40)],
    }
    .execute(app.db(), app.events())
    .await
    .unwrap();
    assert_eq!(created.ticket.status, "pending");

    let lots = app.state.services.lots.list_lots(Some("GLOVE-M"), false).await.unwrap();
    assert!(lots.is_empty());

    let confirmed = ConfirmImportCommand {
        ticket_id: created.ticket.id,
    }
    .execute(app.db(), app.events())
    .await
    .unwrap();
    assert_eq!(confirmed.details.ticket.status, "completed");
    assert_eq!(confirmed.lots.len(), 1);
    assert_eq!(confirmed.lots[0].quantity_remaining, 40);

    let again = ConfirmImportCommand {
        ticket_id: created.ticket.id,
    }
    .execute(app.db(), app.events())
    .await;
    assert_matches!(again, Err(ServiceError::InvalidStatus(_)));
}

#[tokio::test]
async fn edit_cancel_and_delete_only_apply_to_pending() {
    let app = seeded().await;
    let create = || CreateImportTicketCommand {
        header: header(),
        items: vec![line("GLOVE-M", Some("G-1"), None, 10)],
    };

    let ticket = create().execute(app.db(), app.events()).await.unwrap();
    let updated = UpdateImportTicketCommand {
        ticket_id: ticket.ticket.id,
        partner_id: None,
        description: None,
        items: vec![line("GLOVE-M", Some("G-1"), None, 12), line("GLOVE-M", Some("G-2"), None, 3)],
    }
    .execute(app.db(), app.events())
    .await
    .unwrap();
    assert_eq!(updated.items.len(), 2);
    assert_eq!(updated.items[0].quantity, 12);

    let cancelled = CancelImportTicketCommand {
        ticket_id: ticket.ticket.id,
    }
    .execute(app.db(), app.events())
    .await
    .unwrap();
    assert_eq!(cancelled.ticket.status, "cancelled");

    let delete_cancelled = DeleteImportTicketCommand {
        ticket_id: ticket.ticket.id,
    }
    .execute(app.db(), app.events())
    .await;
    assert_matches!(delete_cancelled, Err(ServiceError::InvalidStatus(_)));

    let other = create().execute(app.db(), app.events()).await.unwrap();
    DeleteImportTicketCommand {
        ticket_id: other.ticket.id,
    }
    .execute(app.db(), app.events())
    .await
    .unwrap();
    let gone = app.state.services.tickets.get_import_ticket(other.ticket.id).await;
    assert_matches!(gone, Err(ServiceError::NotFound(_)));

    let events = app.drain_events().await;
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::ImportTicketDeleted(id) if *id == other.ticket.id)));
}

#[tokio::test]
async fn invalid_lines_are_rejected_before_writing() {
    let app = seeded().await;

    let bad_date = DirectImportCommand {
        header: header(),
        items: vec![
            line("GLOVE-M", Some("A"), Some("2027-01-01"), 5),
            line("GLOVE-M", Some("B"), Some("next spring"), 5),
        ],
    }
    .execute(app.db(), app.events())
    .await;
    assert_matches!(bad_date, Err(ServiceError::ValidationError(msg)) if msg.starts_with("Line 2"));

    let unknown_product = DirectImportCommand {
        header: header(),
        items: vec![line("NOPE", None, None, 5)],
    }
    .execute(app.db(), app.events())
    .await;
    assert_matches!(unknown_product, Err(ServiceError::NotFound(_)));

    let zero = DirectImportCommand {
        header: header(),
        items: vec![line("GLOVE-M", None, None, 0)],
    }
    .execute(app.db(), app.events())
    .await;
    assert_matches!(zero, Err(ServiceError::ValidationError(_)));

    let lots = app.state.services.lots.list_lots(None, false).await.unwrap();
    assert!(lots.is_empty());
}
