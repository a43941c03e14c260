//! Typed query descriptors and their parameterized SQL.
//!
//! Column and table names come from the fixed tenant schema; filter values
//! are always bound as parameters.

use serde::{Deserialize, Serialize};
use sqlx::AnyConnection;

use super::{ContactRecord, TenantRecords, TicketRecord};
use crate::Result;
use crate::pool::SqlxResultExt;
use crate::validation::ValidationError;

/// Status code of an active contact.
pub const ACTIVE_STATUS: i64 = 2;

/// Largest accepted `limit`.
pub const MAX_LIMIT: u32 = 500;

/// Longest accepted name substring, in characters.
pub const MAX_SEARCH_LEN: usize = 100;

const MAX_CHANNEL_LEN: usize = 64;

/// Filters for a contact listing. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactFilter {
    pub status: Option<i64>,
    pub channel: Option<String>,
    /// Case-insensitive substring of first or last name.
    pub name: Option<String>,
    pub limit: Option<u32>,
}

/// Filters for a ticket listing. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketFilter {
    pub status: Option<i64>,
    pub channel: Option<String>,
    pub contact_id: Option<i64>,
    pub limit: Option<u32>,
}

/// A read against one tenant database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TenantQuery {
    Contacts(ContactFilter),
    Tickets(TicketFilter),
}

impl TenantQuery {
    /// Every contact.
    pub fn all_contacts() -> Self {
        TenantQuery::Contacts(ContactFilter::default())
    }

    /// Contacts whose status is [`ACTIVE_STATUS`].
    pub fn active_contacts() -> Self {
        TenantQuery::Contacts(ContactFilter {
            status: Some(ACTIVE_STATUS),
            ..ContactFilter::default()
        })
    }

    /// Contacts whose first or last name contains `name`.
    pub fn search_contacts(name: impl Into<String>) -> Self {
        TenantQuery::Contacts(ContactFilter {
            name: Some(name.into()),
            ..ContactFilter::default()
        })
    }

    /// Every ticket, joined to its contact.
    pub fn tickets() -> Self {
        TenantQuery::Tickets(TicketFilter::default())
    }

    /// Check filter values before any I/O.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        match self {
            TenantQuery::Contacts(filter) => {
                check_limit(filter.limit)?;
                check_channel(filter.channel.as_deref())?;
                if let Some(name) = &filter.name {
                    let trimmed = name.trim();
                    if trimmed.is_empty() {
                        return Err(invalid("name", "must not be empty"));
                    }
                    if trimmed.chars().count() > MAX_SEARCH_LEN {
                        return Err(invalid(
                            "name",
                            &format!("longer than {MAX_SEARCH_LEN} characters"),
                        ));
                    }
                }
                Ok(())
            }
            TenantQuery::Tickets(filter) => {
                check_limit(filter.limit)?;
                check_channel(filter.channel.as_deref())
            }
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ValidationError {
    ValidationError::InvalidFilter {
        field,
        reason: reason.to_string(),
    }
}

fn check_limit(limit: Option<u32>) -> std::result::Result<(), ValidationError> {
    match limit {
        Some(0) => Err(invalid("limit", "must be at least 1")),
        Some(n) if n > MAX_LIMIT => Err(invalid("limit", &format!("must be at most {MAX_LIMIT}"))),
        _ => Ok(()),
    }
}

fn check_channel(channel: Option<&str>) -> std::result::Result<(), ValidationError> {
    match channel {
        Some(c) if c.is_empty() => Err(invalid("channel", "must not be empty")),
        Some(c) if c.len() > MAX_CHANNEL_LEN => Err(invalid(
            "channel",
            &format!("longer than {MAX_CHANNEL_LEN} bytes"),
        )),
        _ => Ok(()),
    }
}

/// Escape `LIKE` metacharacters so user input only matches literally.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.trim().to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

enum Bind {
    Int(i64),
    Text(String),
}

/// Accumulates `WHERE` conditions with numbered placeholders.
#[derive(Default)]
struct Conditions {
    clauses: Vec<String>,
    binds: Vec<Bind>,
}

impl Conditions {
    fn next_placeholder(&self) -> String {
        format!("${}", self.binds.len() + 1)
    }

    /// Every `{}` in `template` refers to the same parameter.
    fn push(&mut self, template: &str, bind: Bind) {
        let clause = template.replace("{}", &self.next_placeholder());
        self.clauses.push(clause);
        self.binds.push(bind);
    }

    fn finish(mut self, base: &str, order: &str, limit: Option<u32>) -> (String, Vec<Bind>) {
        let mut sql = base.to_string();
        if !self.clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.clauses.join(" AND "));
        }
        sql.push_str(order);
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", self.next_placeholder()));
            self.binds.push(Bind::Int(i64::from(limit)));
        }
        (sql, self.binds)
    }
}

fn contact_sql(filter: &ContactFilter) -> (String, Vec<Bind>) {
    let mut conditions = Conditions::default();
    if let Some(status) = filter.status {
        conditions.push("status = {}", Bind::Int(status));
    }
    if let Some(channel) = &filter.channel {
        conditions.push("channel = {}", Bind::Text(channel.clone()));
    }
    if let Some(name) = &filter.name {
        conditions.push(
            "(LOWER(first_name) LIKE {} ESCAPE '\\' OR LOWER(last_name) LIKE {} ESCAPE '\\')",
            Bind::Text(like_pattern(name)),
        );
    }
    conditions.finish(
        "SELECT id, username, first_name, last_name, email, phone, status, channel FROM contacts",
        " ORDER BY id",
        filter.limit,
    )
}

fn ticket_sql(filter: &TicketFilter) -> (String, Vec<Bind>) {
    let mut conditions = Conditions::default();
    if let Some(status) = filter.status {
        conditions.push("t.status = {}", Bind::Int(status));
    }
    if let Some(channel) = &filter.channel {
        conditions.push("t.channel = {}", Bind::Text(channel.clone()));
    }
    if let Some(contact_id) = filter.contact_id {
        conditions.push("t.contact_id = {}", Bind::Int(contact_id));
    }
    conditions.finish(
        "SELECT t.id, t.contact_id, t.subject, t.status, t.channel, t.created_at, \
         c.first_name AS contact_first_name, c.last_name AS contact_last_name \
         FROM tickets t INNER JOIN contacts c ON c.id = t.contact_id",
        " ORDER BY t.id",
        filter.limit,
    )
}

/// Run `query` on a tenant connection.
///
/// The query is validated first; invalid filters never reach the database.
pub async fn run(conn: &mut AnyConnection, query: &TenantQuery) -> Result<TenantRecords> {
    query.validate()?;
    match query {
        TenantQuery::Contacts(filter) => {
            let (sql, binds) = contact_sql(filter);
            let mut q = sqlx::query_as::<_, ContactRecord>(&sql);
            for bind in binds {
                q = match bind {
                    Bind::Int(v) => q.bind(v),
                    Bind::Text(v) => q.bind(v),
                };
            }
            let rows = q
                .fetch_all(&mut *conn)
                .await
                .sql_context("Failed to fetch contacts")?;
            Ok(TenantRecords::Contacts(rows))
        }
        TenantQuery::Tickets(filter) => {
            let (sql, binds) = ticket_sql(filter);
            let mut q = sqlx::query_as::<_, TicketRecord>(&sql);
            for bind in binds {
                q = match bind {
                    Bind::Int(v) => q.bind(v),
                    Bind::Text(v) => q.bind(v),
                };
            }
            let rows = q
                .fetch_all(&mut *conn)
                .await
                .sql_context("Failed to fetch tickets")?;
            Ok(TenantRecords::Tickets(rows))
        }
    }
}
