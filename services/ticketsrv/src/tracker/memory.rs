//! In-memory ticket tracker
//!
//! Backs the unit and integration tests. Keeps every ticket, comment and
//! status change so tests can assert on side effects, counts calls per
//! operation, and can be told to fail or stall individual operations.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::TicketBackend;
use crate::domain::{NewTicket, Ticket, TicketId, TicketQuery, TicketStatus, TicketSummary};
use crate::error::{Result, TicketError};

const BACKEND: &str = "memory-tracker";

/// Per-operation call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub search: usize,
    pub get: usize,
    pub create: usize,
    pub update_status: usize,
    pub comment: usize,
}

#[derive(Default)]
struct Counters {
    search: AtomicUsize,
    get: AtomicUsize,
    create: AtomicUsize,
    update_status: AtomicUsize,
    comment: AtomicUsize,
}

#[derive(Default)]
struct Failures {
    search: AtomicBool,
    create: AtomicBool,
    update_status: AtomicBool,
    comment: AtomicBool,
}

/// In-memory tracker with call accounting
pub struct MemoryTracker {
    custom_field: String,
    tickets: RwLock<BTreeMap<u64, Ticket>>,
    comments: RwLock<Vec<(TicketId, String)>>,
    created: RwLock<Vec<NewTicket>>,
    next_id: AtomicU64,
    search_delay: RwLock<Option<Duration>>,
    counters: Counters,
    failures: Failures,
}

impl MemoryTracker {
    /// Create an empty tracker correlating on `custom_field`
    pub fn new(custom_field: &str) -> Self {
        Self {
            custom_field: custom_field.to_string(),
            tickets: RwLock::new(BTreeMap::new()),
            comments: RwLock::new(Vec::new()),
            created: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            search_delay: RwLock::new(None),
            counters: Counters::default(),
            failures: Failures::default(),
        }
    }

    /// Seed a ticket; numeric ids only
    pub fn insert(&self, ticket: Ticket) {
        let Some(number) = ticket.id.as_number() else {
            return;
        };
        self.next_id.fetch_max(number + 1, Ordering::SeqCst);
        self.tickets.write().insert(number, ticket);
    }

    /// Seed a ticket from parts
    pub fn seed(
        &self,
        id: u64,
        status: TicketStatus,
        alarm_id: Option<&str>,
        last_updated: DateTime<Utc>,
    ) -> TicketId {
        let ticket_id = TicketId::from(id);
        self.insert(Ticket {
            id: ticket_id.clone(),
            subject: format!("ticket {}", id),
            status,
            alarm_id: alarm_id.map(str::to_string),
            last_updated,
        });
        ticket_id
    }

    pub fn ticket(&self, id: &TicketId) -> Option<Ticket> {
        let number = id.as_number()?;
        self.tickets.read().get(&number).cloned()
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.tickets.read().values().cloned().collect()
    }

    /// Comments in the order they were posted
    pub fn comments(&self) -> Vec<(TicketId, String)> {
        self.comments.read().clone()
    }

    /// Creation requests in the order they were received
    pub fn created(&self) -> Vec<NewTicket> {
        self.created.read().clone()
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            search: self.counters.search.load(Ordering::SeqCst),
            get: self.counters.get.load(Ordering::SeqCst),
            create: self.counters.create.load(Ordering::SeqCst),
            update_status: self.counters.update_status.load(Ordering::SeqCst),
            comment: self.counters.comment.load(Ordering::SeqCst),
        }
    }

    /// Calls that would have changed tracker state
    pub fn write_calls(&self) -> usize {
        let calls = self.calls();
        calls.create + calls.update_status + calls.comment
    }

    pub fn set_last_updated(&self, id: &TicketId, last_updated: DateTime<Utc>) {
        if let Some(number) = id.as_number() {
            if let Some(ticket) = self.tickets.write().get_mut(&number) {
                ticket.last_updated = last_updated;
            }
        }
    }

    pub fn fail_search(&self, fail: bool) {
        self.failures.search.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create(&self, fail: bool) {
        self.failures.create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_update_status(&self, fail: bool) {
        self.failures.update_status.store(fail, Ordering::SeqCst);
    }

    pub fn fail_comment(&self, fail: bool) {
        self.failures.comment.store(fail, Ordering::SeqCst);
    }

    /// Stall every search for `delay` (tokio time)
    pub fn set_search_delay(&self, delay: Option<Duration>) {
        *self.search_delay.write() = delay;
    }

    fn lookup(&self, id: &TicketId) -> Result<u64> {
        id.as_number()
            .filter(|n| self.tickets.read().contains_key(n))
            .ok_or_else(|| TicketError::Protocol(format!("ticket {} does not exist", id)))
    }
}

#[async_trait]
impl TicketBackend for MemoryTracker {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn search(&self, query: &TicketQuery) -> Result<Vec<TicketSummary>> {
        self.counters.search.fetch_add(1, Ordering::SeqCst);
        let delay = *self.search_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failures.search.load(Ordering::SeqCst) {
            return Err(TicketError::backend_unavailable(BACKEND, "search refused"));
        }

        Ok(self
            .tickets
            .read()
            .values()
            .filter(|t| query.matches(t))
            .map(|t| TicketSummary {
                id: t.id.clone(),
                subject: t.subject.clone(),
            })
            .collect())
    }

    async fn get(&self, id: &TicketId) -> Result<Ticket> {
        self.counters.get.fetch_add(1, Ordering::SeqCst);
        let number = self.lookup(id)?;
        self.tickets
            .read()
            .get(&number)
            .cloned()
            .ok_or_else(|| TicketError::Protocol(format!("ticket {} does not exist", id)))
    }

    async fn create(&self, ticket: &NewTicket) -> Result<TicketId> {
        self.counters.create.fetch_add(1, Ordering::SeqCst);
        if self.failures.create.load(Ordering::SeqCst) {
            return Err(TicketError::CreateTicketFailed {
                status_code: 500,
                message: "create refused".to_string(),
            });
        }

        let number = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = TicketId::from(number);
        let alarm_id = ticket
            .custom_fields
            .iter()
            .find(|(name, _)| *name == self.custom_field)
            .map(|(_, value)| value.clone());

        self.tickets.write().insert(
            number,
            Ticket {
                id: id.clone(),
                subject: ticket.subject.clone(),
                status: TicketStatus::New,
                alarm_id,
                last_updated: Utc::now(),
            },
        );
        self.created.write().push(ticket.clone());
        Ok(id)
    }

    async fn update_status(&self, id: &TicketId, status: &TicketStatus) -> Result<()> {
        self.counters.update_status.fetch_add(1, Ordering::SeqCst);
        if self.failures.update_status.load(Ordering::SeqCst) {
            return Err(TicketError::UpdateTicketFailed {
                ticket_id: id.to_string(),
                status_code: 500,
                message: "status change refused".to_string(),
            });
        }

        let number = self.lookup(id)?;
        if let Some(ticket) = self.tickets.write().get_mut(&number) {
            ticket.status = status.clone();
            ticket.last_updated = Utc::now();
        }
        Ok(())
    }

    async fn comment(&self, id: &TicketId, body: &str) -> Result<()> {
        self.counters.comment.fetch_add(1, Ordering::SeqCst);
        if self.failures.comment.load(Ordering::SeqCst) {
            return Err(TicketError::UpdateTicketFailed {
                ticket_id: id.to_string(),
                status_code: 500,
                message: "comment refused".to_string(),
            });
        }

        let number = self.lookup(id)?;
        if let Some(ticket) = self.tickets.write().get_mut(&number) {
            ticket.last_updated = Utc::now();
        }
        self.comments.write().push((id.clone(), body.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_filters_by_query() {
        let tracker = MemoryTracker::new("alarm");
        let now = Utc::now();
        tracker.seed(1, TicketStatus::Open, Some("A"), now);
        tracker.seed(2, TicketStatus::Rejected, Some("A"), now);
        tracker.seed(3, TicketStatus::New, None, now);

        let open = tracker
            .search(&TicketQuery::open_correlated("ops", "alarm"))
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id.as_str(), "1");

        let rejected = tracker
            .search(&TicketQuery::rejected_for("ops", "alarm", "A"))
            .await
            .unwrap();
        assert_eq!(rejected[0].id.as_str(), "2");
        assert_eq!(tracker.calls().search, 2);
    }

    #[tokio::test]
    async fn test_create_assigns_fresh_ids() {
        let tracker = MemoryTracker::new("alarm");
        tracker.seed(41, TicketStatus::Resolved, None, Utc::now());

        let id = tracker
            .create(&NewTicket {
                queue: "ops".to_string(),
                subject: "s".to_string(),
                body: "b".to_string(),
                custom_fields: vec![("alarm".to_string(), "T-1".to_string())],
            })
            .await
            .unwrap();

        assert_eq!(id.as_str(), "42");
        let ticket = tracker.ticket(&id).unwrap();
        assert_eq!(ticket.status, TicketStatus::New);
        assert_eq!(ticket.alarm_id.as_deref(), Some("T-1"));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let tracker = MemoryTracker::new("alarm");
        let id = tracker.seed(1, TicketStatus::Open, Some("A"), Utc::now());

        tracker.fail_comment(true);
        assert!(tracker.comment(&id, "hello").await.is_err());
        assert!(tracker.comments().is_empty());

        tracker.fail_comment(false);
        tracker.comment(&id, "hello").await.unwrap();
        assert_eq!(tracker.comments().len(), 1);
        assert_eq!(tracker.calls().comment, 2);
    }
}
