use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::entities::inventory_lot;
use crate::errors::ServiceError;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Queues an event; fails only once the processing loop has gone away.
    pub async fn send(&self, event: Event) -> Result<(), ServiceError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| ServiceError::EventError(format!("event channel closed: {:?}", e.0)))
    }

    /// Sends every event in order, stopping at the first failure.
    pub async fn send_all(&self, events: Vec<Event>) -> Result<(), ServiceError> {
        for event in events {
            self.send(event).await?;
        }
        Ok(())
    }
}

/// A committed write to one inventory lot, with the row as it was and as it is now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LotWrite {
    Created {
        after: inventory_lot::Model,
    },
    Updated {
        before: inventory_lot::Model,
        after: inventory_lot::Model,
    },
    Deleted {
        before: inventory_lot::Model,
    },
}

impl LotWrite {
    pub fn lot_id(&self) -> Uuid {
        match self {
            LotWrite::Created { after } => after.id,
            LotWrite::Updated { after, .. } => after.id,
            LotWrite::Deleted { before } => before.id,
        }
    }

    /// Products whose summary depends on this write: both sides when a lot moved product.
    pub fn affected_product_ids(&self) -> Vec<String> {
        match self {
            LotWrite::Created { after } => vec![after.product_id.clone()],
            LotWrite::Deleted { before } => vec![before.product_id.clone()],
            LotWrite::Updated { before, after } => {
                if before.product_id == after.product_id {
                    vec![after.product_id.clone()]
                } else {
                    vec![before.product_id.clone(), after.product_id.clone()]
                }
            }
        }
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    LotWritten(LotWrite),

    // Export ticket events
    ExportTicketCreated { ticket_id: Uuid, status: String },
    ExportTicketUpdated(Uuid),
    ExportTicketConfirmed(Uuid),
    ExportTicketCancelled { ticket_id: Uuid, released: bool },

    // Import ticket events
    ImportTicketCreated { ticket_id: Uuid, status: String },
    ImportTicketUpdated(Uuid),
    ImportTicketConfirmed(Uuid),
    ImportTicketCancelled(Uuid),
    ImportTicketDeleted(Uuid),

    ProductSummariesRebuilt { summaries_written: u64 },
}

/// Reacts to events drained from the channel.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &Event) -> Result<(), ServiceError>;
}

/// Runs one event through every handler; a failing handler does not stop the others.
pub async fn dispatch_event(handlers: &[Arc<dyn EventHandler>], event: &Event) -> usize {
    let results = join_all(handlers.iter().map(|h| h.handle_event(event))).await;
    let mut failures = 0;
    for e in results.into_iter().filter_map(Result::err) {
        failures += 1;
        error!(error = %e, ?event, "Event handler failed");
    }
    failures
}

pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Arc<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        debug!("Received event: {:?}", event);
        dispatch_event(&handlers, &event).await;
    }

    info!("Event channel closed; event processing loop stopped");
}
