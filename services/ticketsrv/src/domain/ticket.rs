//! Ticket entity as seen through the tracker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TicketError};

/// Backend-assigned ticket identifier (opaque, never empty)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketId(String);

impl TicketId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let id = id.trim();
        if id.is_empty() {
            return Err(TicketError::InvalidInput("empty ticket id".to_string()));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value when the backend uses sequential ids
    pub fn as_number(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl TryFrom<String> for TicketId {
    type Error = TicketError;

    fn try_from(id: String) -> Result<Self> {
        TicketId::new(id)
    }
}

impl From<u64> for TicketId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<TicketId> for String {
    fn from(id: TicketId) -> String {
        id.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ticket status (backend-defined; unknown values are kept verbatim)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TicketStatus {
    New,
    Open,
    Stalled,
    Rejected,
    Resolved,
    Deleted,
    Other(String),
}

impl TicketStatus {
    /// Statuses the cache tracks: the ticket still needs attention
    pub const OPEN_LIKE: [TicketStatus; 3] =
        [TicketStatus::New, TicketStatus::Open, TicketStatus::Stalled];

    pub fn as_str(&self) -> &str {
        match self {
            TicketStatus::New => "new",
            TicketStatus::Open => "open",
            TicketStatus::Stalled => "stalled",
            TicketStatus::Rejected => "rejected",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Deleted => "deleted",
            TicketStatus::Other(s) => s,
        }
    }

    pub fn is_open_like(&self) -> bool {
        matches!(
            self,
            TicketStatus::New | TicketStatus::Open | TicketStatus::Stalled
        )
    }
}

impl FromStr for TicketStatus {
    type Err = TicketError;

    fn from_str(s: &str) -> Result<Self> {
        let status = match s.trim().to_lowercase().as_str() {
            "" => return Err(TicketError::InvalidInput("empty ticket status".to_string())),
            "new" => TicketStatus::New,
            "open" => TicketStatus::Open,
            "stalled" => TicketStatus::Stalled,
            "rejected" => TicketStatus::Rejected,
            "resolved" => TicketStatus::Resolved,
            "deleted" => TicketStatus::Deleted,
            other => TicketStatus::Other(other.to_string()),
        };
        Ok(status)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TicketStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TicketStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Ticket fields the service relies on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub subject: String,
    pub status: TicketStatus,
    /// Value of the correlation custom field, if set
    pub alarm_id: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl Ticket {
    pub fn is_for_alarm(&self, alarm_id: &str) -> bool {
        self.alarm_id.as_deref() == Some(alarm_id)
    }
}

/// Search hit: id and subject only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketSummary {
    pub id: TicketId,
    pub subject: String,
}

/// Filter on the correlation custom field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationFilter {
    /// No constraint on the custom field
    Any,
    /// Custom field must be set
    Present,
    /// Custom field must equal the alarm id
    Equals(String),
}

/// Ticket search criteria
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketQuery {
    pub queue: String,
    pub statuses: Vec<TicketStatus>,
    pub custom_field: String,
    pub correlation: CorrelationFilter,
}

impl TicketQuery {
    /// Open-like tickets carrying the correlation field (the cache population)
    pub fn open_correlated(queue: &str, custom_field: &str) -> Self {
        Self {
            queue: queue.to_string(),
            statuses: TicketStatus::OPEN_LIKE.to_vec(),
            custom_field: custom_field.to_string(),
            correlation: CorrelationFilter::Present,
        }
    }

    /// Rejected tickets correlated to `alarm_id`
    pub fn rejected_for(queue: &str, custom_field: &str, alarm_id: &str) -> Self {
        Self {
            queue: queue.to_string(),
            statuses: vec![TicketStatus::Rejected],
            custom_field: custom_field.to_string(),
            correlation: CorrelationFilter::Equals(alarm_id.to_string()),
        }
    }

    /// Whether `ticket` satisfies the status and correlation criteria
    pub fn matches(&self, ticket: &Ticket) -> bool {
        let status_ok = self.statuses.is_empty() || self.statuses.contains(&ticket.status);
        let correlation_ok = match &self.correlation {
            CorrelationFilter::Any => true,
            CorrelationFilter::Present => ticket.alarm_id.is_some(),
            CorrelationFilter::Equals(alarm_id) => ticket.is_for_alarm(alarm_id),
        };
        status_ok && correlation_ok
    }
}

/// Creation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub queue: String,
    pub subject: String,
    pub body: String,
    /// Custom fields as (name, value) pairs
    pub custom_fields: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_id_rejects_empty() {
        assert!(TicketId::new("  ").is_err());
        let id = TicketId::new(" 42 ").unwrap();
        assert_eq!(id.as_str(), "42");
        assert_eq!(id.as_number(), Some(42));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Open".parse::<TicketStatus>().unwrap(), TicketStatus::Open);
        assert_eq!(
            "waiting".parse::<TicketStatus>().unwrap(),
            TicketStatus::Other("waiting".to_string())
        );
        assert!("".parse::<TicketStatus>().is_err());
        assert!(TicketStatus::Stalled.is_open_like());
        assert!(!TicketStatus::Rejected.is_open_like());
    }

    #[test]
    fn test_query_matches() {
        let ticket = Ticket {
            id: TicketId::new("7").unwrap(),
            subject: "s".to_string(),
            status: TicketStatus::Rejected,
            alarm_id: Some("T-1".to_string()),
            last_updated: Utc::now(),
        };

        assert!(TicketQuery::rejected_for("ops", "alarm", "T-1").matches(&ticket));
        assert!(!TicketQuery::rejected_for("ops", "alarm", "T-2").matches(&ticket));
        assert!(!TicketQuery::open_correlated("ops", "alarm").matches(&ticket));
    }
}
