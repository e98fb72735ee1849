mod common;

use common::{days_from_now, TestApp};
use medstock_api::{
    commands::export_tickets::{ExportItemRequest, ExportTicketHeader, SaveExportDraftCommand},
    commands::Command,
    entities::{export_ticket_item, product},
};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};

#[tokio::test]
async fn export_lines_follow_the_products_current_team() {
    let app = TestApp::new().await;
    app.seed_product("GLOVE-M", "Nitrile gloves M").await;
    app.seed_product("GLOVE-L", "Nitrile gloves L").await;
    app.seed_partner("HOSP-1", "City Hospital").await;
    app.seed_lot("GLOVE-M", Some("G1"), Some(days_from_now(120)), 50).await;
    app.seed_lot("GLOVE-L", Some("G2"), Some(days_from_now(120)), 50).await;

    let draft = SaveExportDraftCommand {
        header: ExportTicketHeader {
            partner_id: "HOSP-1".to_string(),
            description: None,
            created_by: None,
        },
        items: vec![
            ExportItemRequest {
                product_id: "GLOVE-M".to_string(),
                lot_number: Some("G1".to_string()),
                quantity: 5,
            },
            ExportItemRequest {
                product_id: "GLOVE-L".to_string(),
                lot_number: Some("G2".to_string()),
                quantity: 5,
            },
        ],
    }
    .execute(app.db(), app.events())
    .await
    .unwrap();
    assert!(draft
        .items
        .iter()
        .all(|i| i.team.as_deref() == Some("Team North")));

    let moved = product::Entity::find_by_id("GLOVE-M".to_string())
        .one(app.db().as_ref())
        .await
        .unwrap()
        .unwrap();
    let mut moved: product::ActiveModel = moved.into();
    moved.team = Set(Some("Team South".to_string()));
    moved.update(app.db().as_ref()).await.unwrap();

    let report = app.state.services.team_backfill.run(1).await.unwrap();
    assert_eq!(report.lines_scanned, 2);
    assert_eq!(report.lines_updated, 1);
    assert_eq!(report.lines_without_product, 0);
    assert_eq!(report.batches, 2);

    let lines = export_ticket_item::Entity::find()
        .all(app.db().as_ref())
        .await
        .unwrap();
    for line in lines {
        let expected = if line.product_id == "GLOVE-M" {
            "Team South"
        } else {
            "Team North"
        };
        assert_eq!(line.team.as_deref(), Some(expected));
    }

    let again = app.state.services.team_backfill.run(100).await.unwrap();
    assert_eq!(again.lines_updated, 0);
    assert_eq!(again.batches, 1);
}
