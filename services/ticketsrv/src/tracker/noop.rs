//! Dry-run tracker decorator
//!
//! Reads go to the wrapped backend; writes are logged and skipped. The writes
//! that would have happened are kept as an overlay that later reads see, so a
//! dry-run ticket is found again after a cache refresh and a reminder is not
//! repeated on every sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::TicketBackend;
use crate::domain::{NewTicket, Ticket, TicketId, TicketQuery, TicketStatus, TicketSummary};
use crate::error::Result;

#[derive(Default)]
struct Overlay {
    /// Tickets created in dry-run, with their queue
    created: HashMap<TicketId, (String, Ticket)>,
    /// Status changes skipped on real tickets
    statuses: HashMap<TicketId, TicketStatus>,
    /// Comment times skipped on real tickets
    touched: HashMap<TicketId, DateTime<Utc>>,
}

impl Overlay {
    fn apply(&self, ticket: &mut Ticket) {
        if let Some(status) = self.statuses.get(&ticket.id) {
            ticket.status = status.clone();
        }
        if let Some(at) = self.touched.get(&ticket.id) {
            if *at > ticket.last_updated {
                ticket.last_updated = *at;
            }
        }
    }

    fn is_modified(&self, id: &TicketId) -> bool {
        self.statuses.contains_key(id) || self.touched.contains_key(id)
    }
}

pub struct NoopTracker {
    inner: Arc<dyn TicketBackend>,
    custom_field: String,
    dry_run_ids: AtomicU64,
    overlay: RwLock<Overlay>,
}

impl NoopTracker {
    pub fn new(inner: Arc<dyn TicketBackend>, custom_field: &str) -> Self {
        Self {
            inner,
            custom_field: custom_field.to_string(),
            dry_run_ids: AtomicU64::new(1),
            overlay: RwLock::new(Overlay::default()),
        }
    }

    /// Number of tickets created in dry-run so far
    pub fn dry_run_created(&self) -> usize {
        self.overlay.read().created.len()
    }
}

#[async_trait]
impl TicketBackend for NoopTracker {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn search(&self, query: &TicketQuery) -> Result<Vec<TicketSummary>> {
        let found = self.inner.search(query).await?;
        let (modified, nothing_created): (Vec<TicketId>, bool) = {
            let overlay = self.overlay.read();
            let modified = overlay
                .statuses
                .keys()
                .filter(|id| !overlay.created.contains_key(*id))
                .cloned()
                .collect();
            (modified, overlay.created.is_empty())
        };
        if modified.is_empty() && nothing_created {
            return Ok(found);
        }

        // Real tickets whose skipped status change moves them in or out of the query
        let mut hits: Vec<TicketSummary> = found
            .into_iter()
            .filter(|s| !modified.contains(&s.id))
            .collect();
        for id in modified {
            match self.get(&id).await {
                Ok(ticket) if query.matches(&ticket) => hits.push(TicketSummary {
                    id: ticket.id,
                    subject: ticket.subject,
                }),
                Ok(_) => {},
                Err(e) => warn!(ticket_id = %id, "[noop] could not re-read ticket: {}", e),
            }
        }

        let overlay = self.overlay.read();
        hits.extend(
            overlay
                .created
                .values()
                .filter(|(queue, ticket)| *queue == query.queue && query.matches(ticket))
                .map(|(_, ticket)| TicketSummary {
                    id: ticket.id.clone(),
                    subject: ticket.subject.clone(),
                }),
        );
        Ok(hits)
    }

    async fn get(&self, id: &TicketId) -> Result<Ticket> {
        {
            let overlay = self.overlay.read();
            if let Some((_, ticket)) = overlay.created.get(id) {
                let mut ticket = ticket.clone();
                overlay.apply(&mut ticket);
                return Ok(ticket);
            }
        }

        let mut ticket = self.inner.get(id).await?;
        let overlay = self.overlay.read();
        if overlay.is_modified(id) {
            debug!(ticket_id = %id, "[noop] applying skipped writes to ticket");
            overlay.apply(&mut ticket);
        }
        Ok(ticket)
    }

    async fn create(&self, ticket: &NewTicket) -> Result<TicketId> {
        let n = self.dry_run_ids.fetch_add(1, Ordering::SeqCst);
        let id = TicketId::new(format!("dry-run-{}", n))?;
        info!(
            queue = %ticket.queue,
            dry_run_id = %id,
            "[noop] would create ticket: {}",
            ticket.subject
        );

        let alarm_id = ticket
            .custom_fields
            .iter()
            .find(|(name, _)| *name == self.custom_field)
            .map(|(_, value)| value.clone());
        let created = Ticket {
            id: id.clone(),
            subject: ticket.subject.clone(),
            status: TicketStatus::New,
            alarm_id,
            last_updated: Utc::now(),
        };
        self.overlay
            .write()
            .created
            .insert(id.clone(), (ticket.queue.clone(), created));
        Ok(id)
    }

    async fn update_status(&self, id: &TicketId, status: &TicketStatus) -> Result<()> {
        info!(ticket_id = %id, "[noop] would set status to {}", status);
        self.overlay.write().statuses.insert(id.clone(), status.clone());
        Ok(())
    }

    async fn comment(&self, id: &TicketId, body: &str) -> Result<()> {
        info!(ticket_id = %id, "[noop] would comment ({} chars)", body.chars().count());
        self.overlay.write().touched.insert(id.clone(), Utc::now());
        Ok(())
    }
}
