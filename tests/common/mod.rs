#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::{NaiveDate, Utc};
use medstock_api::{
    config::{AllocationReleasePolicy, AppConfig},
    db::{self, DbConfig, DbPool},
    entities::{inventory_lot, partner, product},
    events::{self, Event, EventHandler, EventSender},
    AppState,
};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

/// Application state over a private in-memory SQLite database.
///
/// Events are not processed in the background; call [`TestApp::drain_events`]
/// to run whatever the commands published so far through the summary handler.
pub struct TestApp {
    pub state: AppState,
    router: Router,
    event_rx: Mutex<mpsc::Receiver<Event>>,
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_policy(AllocationReleasePolicy::Release).await
    }

    pub async fn with_policy(policy: AllocationReleasePolicy) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.allocation_release_policy = policy;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        // a single pooled connection keeps the in-memory database alive
        let pool = db::establish_connection_with_config(&DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            idle_timeout: Duration::from_secs(3600),
            ..DbConfig::default()
        })
        .await
        .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(1024);
        let state = AppState::new(Arc::new(pool), cfg, EventSender::new(event_tx));
        let handlers: Vec<Arc<dyn EventHandler>> =
            vec![state.services.summaries.clone() as Arc<dyn EventHandler>];
        let router = medstock_api::build_router(state.clone());

        Self {
            state,
            router,
            event_rx: Mutex::new(event_rx),
            handlers,
        }
    }

    pub fn db(&self) -> Arc<DbPool> {
        self.state.db.clone()
    }

    pub fn events(&self) -> Arc<EventSender> {
        self.state.event_sender.clone()
    }

    /// Dispatches every queued event and returns them.
    pub async fn drain_events(&self) -> Vec<Event> {
        let mut rx = self.event_rx.lock().await;
        let mut drained = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events::dispatch_event(&self.handlers, &event).await;
            drained.push(event);
        }
        drained
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router is infallible")
    }

    pub async fn seed_product(&self, id: &str, name: &str) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(id.to_string()),
            name: Set(name.to_string()),
            unit: Set(Some("box".to_string())),
            packaging: Set(Some("10 x 5ml".to_string())),
            storage_temp: Set(Some("2-8C".to_string())),
            manufacturer: Set(Some("Acme Bio".to_string())),
            team: Set(Some("Team North".to_string())),
            subgroup: Set(Some("Reagents".to_string())),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed product")
    }

    pub async fn seed_partner(&self, id: &str, name: &str) -> partner::Model {
        partner::ActiveModel {
            id: Set(id.to_string()),
            name: Set(name.to_string()),
            partner_type: Set("customer".to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed partner")
    }

    pub async fn seed_lot(
        &self,
        product_id: &str,
        lot_number: Option<&str>,
        expiry_date: Option<NaiveDate>,
        remaining: i64,
    ) -> inventory_lot::Model {
        let now = Utc::now();
        inventory_lot::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id.to_string()),
            lot_number: Set(lot_number.map(str::to_string)),
            expiry_date: Set(expiry_date),
            quantity_imported: Set(remaining),
            quantity_remaining: Set(remaining),
            quantity_allocated: Set(0),
            import_date: Set(now),
            supplier_id: Set(None),
            notes: Set(None),
            subgroup: Set(Some("Reagents".to_string())),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed lot")
    }

    /// Overwrites a lot's counters outside the commands, the way a legacy writer would.
    pub async fn force_counters(&self, lot_id: Uuid, remaining: i64, allocated: i64) {
        let lot = self.lot(lot_id).await;
        let mut active: inventory_lot::ActiveModel = lot.clone().into();
        active.quantity_remaining = Set(remaining);
        active.quantity_allocated = Set(allocated);
        active.version = Set(lot.version + 1);
        active
            .update(self.state.db.as_ref())
            .await
            .expect("force lot counters");
    }

    pub async fn lot(&self, id: Uuid) -> inventory_lot::Model {
        inventory_lot::Entity::find_by_id(id)
            .one(self.state.db.as_ref())
            .await
            .expect("query lot")
            .expect("lot exists")
    }
}

pub fn days_from_now(days: i64) -> NaiveDate {
    (Utc::now() + chrono::Duration::days(days)).date_naive()
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}
