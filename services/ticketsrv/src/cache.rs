//! Ticket cache
//!
//! Cache-aside view of the open-like, correlated tickets in the queue. The
//! snapshot lives behind a `parking_lot::RwLock` that is only taken for reads
//! and swaps; backend calls run without it. Refreshes are serialized by an
//! async gate.
//!
//! Tickets the service creates, reopens or comments on are written into the
//! snapshot right away and also kept as pending records tagged with a sequence
//! number. A refresh remembers the sequence it started at and re-applies every
//! pending record newer than that, so a record made while the fetch was in
//! flight is not lost to the swap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::{Ticket, TicketId, TicketQuery, TicketStatus};
use crate::error::Result;
use crate::tracker::{fetch_matching, TicketBackend};

#[derive(Default)]
struct Snapshot {
    tickets: Vec<Ticket>,
    fetched_at: Option<Instant>,
    invalidated: bool,
    /// Local records as (sequence, ticket)
    pending: Vec<(u64, Ticket)>,
}

impl Snapshot {
    fn is_stale(&self, expiration: Duration) -> bool {
        match self.fetched_at {
            None => true,
            Some(at) => self.invalidated || at.elapsed() > expiration,
        }
    }
}

fn upsert(tickets: &mut Vec<Ticket>, ticket: Ticket) {
    match tickets.iter_mut().find(|t| t.id == ticket.id) {
        Some(existing) => *existing = ticket,
        None => tickets.push(ticket),
    }
}

/// Ticket cache shared by the poller, the reconciler and the reminder
pub struct TicketCache {
    backend: Arc<dyn TicketBackend>,
    query: TicketQuery,
    expiration: Duration,
    state: RwLock<Snapshot>,
    refresh_gate: Mutex<()>,
    sequence: AtomicU64,
}

impl TicketCache {
    /// Cache of tickets in `queue` carrying `custom_field`
    pub fn new(
        backend: Arc<dyn TicketBackend>,
        queue: &str,
        custom_field: &str,
        expiration: Duration,
    ) -> Self {
        Self {
            backend,
            query: TicketQuery::open_correlated(queue, custom_field),
            expiration,
            state: RwLock::new(Snapshot::default()),
            refresh_gate: Mutex::new(()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Re-fetch the snapshot from the backend
    ///
    /// On error the current snapshot is kept as is.
    pub async fn refresh(&self) -> Result<Vec<Ticket>> {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<Vec<Ticket>> {
        let started_at = self.sequence.load(Ordering::SeqCst);
        let mut tickets = fetch_matching(self.backend.as_ref(), &self.query).await?;

        let mut state = self.state.write();
        let mut merged = 0;
        for (_, ticket) in state.pending.iter().filter(|(seq, _)| *seq > started_at) {
            upsert(&mut tickets, ticket.clone());
            merged += 1;
        }
        state.pending.retain(|(seq, _)| *seq > started_at);
        state.tickets = tickets;
        state.fetched_at = Some(Instant::now());
        state.invalidated = false;

        debug!(
            "Ticket cache refreshed: {} tickets ({} local records kept)",
            state.tickets.len(),
            merged
        );
        Ok(state.tickets.clone())
    }

    /// Current snapshot, refreshed first when stale
    ///
    /// A failed refresh falls back to the previous snapshot when there is one.
    pub async fn get(&self) -> Result<Vec<Ticket>> {
        if let Some(tickets) = self.fresh_snapshot() {
            return Ok(tickets);
        }

        let _gate = self.refresh_gate.lock().await;
        // Another caller may have refreshed while we waited
        if let Some(tickets) = self.fresh_snapshot() {
            return Ok(tickets);
        }

        match self.refresh_locked().await {
            Ok(tickets) => Ok(tickets),
            Err(e) => {
                let state = self.state.read();
                if state.fetched_at.is_none() {
                    return Err(e);
                }
                warn!(
                    "Ticket cache refresh failed, serving stale snapshot ({} tickets): {}",
                    state.tickets.len(),
                    e
                );
                Ok(state.tickets.clone())
            },
        }
    }

    fn fresh_snapshot(&self) -> Option<Vec<Ticket>> {
        let state = self.state.read();
        if state.is_stale(self.expiration) {
            None
        } else {
            Some(state.tickets.clone())
        }
    }

    /// Snapshot as is, without touching the backend
    pub fn snapshot(&self) -> Vec<Ticket> {
        self.state.read().tickets.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().tickets.is_empty()
    }

    /// Whether the next `get` will hit the backend
    pub fn is_stale(&self) -> bool {
        self.state.read().is_stale(self.expiration)
    }

    /// Move every cached ticket to `new_status`
    ///
    /// Tickets that leave the open-like set are dropped from the snapshot.
    /// Returns how many tickets were moved.
    pub async fn invalidate_all(&self, new_status: TicketStatus) -> Result<usize> {
        let tickets = self.get().await?;
        let mut moved: Vec<TicketId> = Vec::with_capacity(tickets.len());

        for ticket in &tickets {
            match self.backend.update_status(&ticket.id, &new_status).await {
                Ok(()) => moved.push(ticket.id.clone()),
                Err(e) => warn!(ticket_id = %ticket.id, "Could not set status {}: {}", new_status, e),
            }
        }

        let mut state = self.state.write();
        if new_status.is_open_like() {
            for ticket in state.tickets.iter_mut().filter(|t| moved.contains(&t.id)) {
                ticket.status = new_status.clone();
            }
        } else {
            state.tickets.retain(|t| !moved.contains(&t.id));
            state.pending.retain(|(_, t)| !moved.contains(&t.id));
        }

        info!("Moved {} of {} cached tickets to {}", moved.len(), tickets.len(), new_status);
        Ok(moved.len())
    }

    fn record(&self, ticket: Ticket) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write();
        upsert(&mut state.tickets, ticket.clone());
        state.pending.retain(|(_, t)| t.id != ticket.id);
        state.pending.push((seq, ticket));
    }

    /// Add (or replace) a ticket the service created or reopened
    pub fn record_created(&self, ticket: Ticket) {
        debug!(ticket_id = %ticket.id, "Recording ticket in cache");
        self.record(ticket);
    }

    /// Update a cached ticket's last-updated time after a comment
    pub fn touch(&self, id: &TicketId, at: DateTime<Utc>) {
        let ticket = {
            let state = self.state.read();
            state.tickets.iter().find(|t| &t.id == id).cloned()
        };
        if let Some(mut ticket) = ticket {
            ticket.last_updated = at;
            self.record(ticket);
        }
    }

    /// Force the next `get` to refresh
    pub fn invalidate(&self) {
        self.state.write().invalidated = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::MemoryTracker;

    fn cache(tracker: Arc<MemoryTracker>) -> TicketCache {
        TicketCache::new(tracker, "ops", "alarm", Duration::from_secs(600))
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_refreshes_once_within_expiration() {
        let tracker = Arc::new(MemoryTracker::new("alarm"));
        tracker.seed(1, TicketStatus::Open, Some("A"), Utc::now());
        let cache = cache(tracker.clone());

        assert!(cache.is_stale());
        assert_eq!(cache.get().await.unwrap().len(), 1);
        assert_eq!(cache.get().await.unwrap().len(), 1);
        assert_eq!(tracker.calls().search, 1);

        cache.invalidate();
        cache.get().await.unwrap();
        assert_eq!(tracker.calls().search, 2);
    }

    #[tokio::test]
    async fn test_touch_updates_last_updated() {
        let tracker = Arc::new(MemoryTracker::new("alarm"));
        let earlier = Utc::now() - chrono::Duration::days(3);
        let id = tracker.seed(1, TicketStatus::Open, Some("A"), earlier);
        let cache = cache(tracker);
        cache.refresh().await.unwrap();

        let now = Utc::now();
        cache.touch(&id, now);
        assert_eq!(cache.snapshot()[0].last_updated, now);

        // Unknown ids are ignored
        cache.touch(&TicketId::from(99), now);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_all_drops_rejected() {
        let tracker = Arc::new(MemoryTracker::new("alarm"));
        let now = Utc::now();
        let a = tracker.seed(1, TicketStatus::Open, Some("A"), now);
        let b = tracker.seed(2, TicketStatus::New, Some("B"), now);
        let cache = cache(tracker.clone());

        let moved = cache.invalidate_all(TicketStatus::Rejected).await.unwrap();

        assert_eq!(moved, 2);
        assert!(cache.is_empty());
        assert_eq!(tracker.ticket(&a).unwrap().status, TicketStatus::Rejected);
        assert_eq!(tracker.ticket(&b).unwrap().status, TicketStatus::Rejected);
    }

    #[tokio::test]
    async fn test_invalidate_all_skips_failures() {
        let tracker = Arc::new(MemoryTracker::new("alarm"));
        tracker.seed(1, TicketStatus::Open, Some("A"), Utc::now());
        let cache = cache(tracker.clone());

        tracker.fail_update_status(true);
        assert_eq!(cache.invalidate_all(TicketStatus::Rejected).await.unwrap(), 0);
        assert_eq!(cache.len(), 1);
    }
}
