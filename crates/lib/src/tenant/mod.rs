//! Read-only record shapes fetched from tenant databases.
//!
//! Tenant data is only ever read through typed [`TenantQuery`] descriptors;
//! there is no way to hand raw SQL to this module.

mod query;

use serde::{Deserialize, Serialize};

pub use query::{
    ACTIVE_STATUS, ContactFilter, MAX_LIMIT, MAX_SEARCH_LEN, TenantQuery, TicketFilter, run,
};

/// A contact row from a tenant database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContactRecord {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Status code; [`ACTIVE_STATUS`] marks an active contact.
    pub status: i64,
    pub channel: Option<String>,
}

/// A ticket row joined to the contact it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TicketRecord {
    pub id: i64,
    pub contact_id: i64,
    pub subject: String,
    pub status: i64,
    pub channel: Option<String>,
    pub created_at: String,
    pub contact_first_name: String,
    pub contact_last_name: String,
}

/// Result of running a [`TenantQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "records", rename_all = "snake_case")]
pub enum TenantRecords {
    Contacts(Vec<ContactRecord>),
    Tickets(Vec<TicketRecord>),
}

impl TenantRecords {
    /// Number of records returned.
    pub fn len(&self) -> usize {
        match self {
            TenantRecords::Contacts(rows) => rows.len(),
            TenantRecords::Tickets(rows) => rows.len(),
        }
    }

    /// Whether no records were returned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The contacts, if this was a contact query.
    pub fn into_contacts(self) -> Option<Vec<ContactRecord>> {
        match self {
            TenantRecords::Contacts(rows) => Some(rows),
            TenantRecords::Tickets(_) => None,
        }
    }

    /// The tickets, if this was a ticket query.
    pub fn into_tickets(self) -> Option<Vec<TicketRecord>> {
        match self {
            TenantRecords::Tickets(rows) => Some(rows),
            TenantRecords::Contacts(_) => None,
        }
    }
}
