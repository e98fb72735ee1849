pub mod admin;
pub mod export_tickets;
pub mod import_tickets;
pub mod inventory;
pub mod summaries;

use serde::Deserialize;

use crate::entities::TicketStatus;
use crate::errors::ServiceError;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Whether a new ticket is kept pending or completed on the spot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreateMode {
    #[default]
    Draft,
    Direct,
}

#[derive(Debug, Default, Deserialize)]
pub struct TicketFilters {
    pub status: Option<String>,
}

impl TicketFilters {
    pub fn status(&self) -> Result<Option<TicketStatus>, ServiceError> {
        match self.status.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => TicketStatus::parse(raw).map(Some).ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "Unknown status '{}', expected pending, completed or cancelled",
                    raw
                ))
            }),
        }
    }
}
