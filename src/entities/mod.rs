pub mod allowlist_entry;
pub mod export_ticket;
pub mod export_ticket_item;
pub mod import_ticket;
pub mod import_ticket_item;
pub mod inventory_lot;
pub mod partner;
pub mod product;
pub mod product_summary;
pub mod user_account;

use serde::{Deserialize, Serialize};

/// Lifecycle state shared by import and export tickets.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TicketStatus {
    Pending,
    Completed,
    Cancelled,
}

impl TicketStatus {
    /// Text stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }

    pub fn parse(s: &str) -> Option<Self> {
        s.parse().ok()
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TicketStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::TicketStatus;

    #[test]
    fn status_text_round_trips_and_terminal_states() {
        for status in [
            TicketStatus::Pending,
            TicketStatus::Completed,
            TicketStatus::Cancelled,
        ] {
            assert_eq!(TicketStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TicketStatus::parse("draft"), None);
        assert_eq!(TicketStatus::parse("Pending"), None);
        assert_eq!(TicketStatus::Cancelled.to_string(), "cancelled");
        assert!(!TicketStatus::Pending.is_terminal());
        assert!(TicketStatus::Cancelled.is_terminal());
    }
}
