//! Alarm to ticket reconciliation
//!
//! Decides per due alarm whether to reopen a rejected ticket, create a new
//! one, or leave the existing ticket alone.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::cache::TicketCache;
use crate::config::TicketSrvConfig;
use crate::domain::{NewTicket, Ticket, TicketId, TicketQuery, TicketStatus};
use crate::error::{invalid_input, Result};
use crate::template::{TemplateContext, TicketTemplates};
use crate::tracker::{fetch_matching, TicketBackend};

/// Reconciler settings
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub queue: String,
    pub custom_field: String,
    pub reopen_rejected: bool,
}

impl ReconcilerSettings {
    pub fn from_config(config: &TicketSrvConfig) -> Self {
        Self {
            queue: config.tracker.queue.clone(),
            custom_field: config.tracker.custom_field.clone(),
            reopen_rejected: config.behavior.reopen_rejected,
        }
    }
}

/// What `create_or_reopen` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created(TicketId),
    Reopened(TicketId),
    /// An open-like ticket already tracks the alarm; nothing was sent
    Existing(TicketId),
}

impl ReconcileOutcome {
    pub fn ticket_id(&self) -> &TicketId {
        match self {
            ReconcileOutcome::Created(id)
            | ReconcileOutcome::Reopened(id)
            | ReconcileOutcome::Existing(id) => id,
        }
    }
}

/// Most recently updated ticket; ties go to the higher id
fn most_relevant(tickets: Vec<Ticket>) -> Option<Ticket> {
    tickets.into_iter().max_by(|a, b| {
        a.last_updated.cmp(&b.last_updated).then_with(|| {
            match (a.id.as_number(), b.id.as_number()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => a.id.cmp(&b.id),
            }
        })
    })
}

pub struct TicketReconciler {
    backend: Arc<dyn TicketBackend>,
    cache: Arc<TicketCache>,
    templates: Arc<TicketTemplates>,
    settings: ReconcilerSettings,
}

impl TicketReconciler {
    pub fn new(
        backend: Arc<dyn TicketBackend>,
        cache: Arc<TicketCache>,
        templates: Arc<TicketTemplates>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            backend,
            cache,
            templates,
            settings,
        }
    }

    /// Open-like ticket tracking `alarm_id`, from the live cache
    pub async fn find_by_alarm(&self, alarm_id: &str) -> Result<Option<Ticket>> {
        let tickets = self.cache.get().await?;
        Ok(tickets.into_iter().find(|t| t.is_for_alarm(alarm_id)))
    }

    async fn find_rejected(&self, alarm_id: &str) -> Result<Option<Ticket>> {
        let query = TicketQuery::rejected_for(&self.settings.queue, &self.settings.custom_field, alarm_id);
        let rejected = fetch_matching(self.backend.as_ref(), &query).await?;
        Ok(most_relevant(rejected))
    }

    /// Make sure `alarm_id` is tracked by exactly one open-like ticket
    pub async fn create_or_reopen(&self, alarm_id: &str, context: &TemplateContext) -> Result<ReconcileOutcome> {
        if alarm_id.trim().is_empty() {
            return Err(invalid_input("empty alarm id"));
        }

        if self.settings.reopen_rejected {
            if let Some(ticket) = self.find_rejected(alarm_id).await? {
                self.backend.update_status(&ticket.id, &TicketStatus::Open).await?;
                info!(alarm_id, ticket_id = %ticket.id, "Reopened rejected ticket");

                let id = ticket.id.clone();
                self.cache.record_created(Ticket {
                    status: TicketStatus::Open,
                    last_updated: Utc::now(),
                    ..ticket
                });
                return Ok(ReconcileOutcome::Reopened(id));
            }
        }

        if let Some(ticket) = self.find_by_alarm(alarm_id).await? {
            debug!(alarm_id, ticket_id = %ticket.id, "Alarm already has a ticket");
            return Ok(ReconcileOutcome::Existing(ticket.id));
        }

        let rendered = self.templates.render_new(context)?;
        let request = NewTicket {
            queue: self.settings.queue.clone(),
            subject: rendered.subject,
            body: rendered.body,
            custom_fields: vec![(self.settings.custom_field.clone(), alarm_id.to_string())],
        };
        let id = self.backend.create(&request).await?;
        info!(alarm_id, ticket_id = %id, "Created ticket: {}", request.subject);

        self.cache.record_created(Ticket {
            id: id.clone(),
            subject: request.subject,
            status: TicketStatus::New,
            alarm_id: Some(alarm_id.to_string()),
            last_updated: Utc::now(),
        });
        Ok(ReconcileOutcome::Created(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ticket(id: u64, minutes_ago: i64) -> Ticket {
        Ticket {
            id: TicketId::from(id),
            subject: String::new(),
            status: TicketStatus::Rejected,
            alarm_id: Some("A".to_string()),
            last_updated: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn test_most_relevant_prefers_latest_update() {
        let picked = most_relevant(vec![ticket(9, 30), ticket(3, 5), ticket(7, 60)]).unwrap();
        assert_eq!(picked.id.as_str(), "3");
    }

    #[test]
    fn test_most_relevant_tie_breaks_on_id() {
        let a = ticket(9, 0);
        let mut b = ticket(10, 0);
        b.last_updated = a.last_updated;

        let picked = most_relevant(vec![b, a]).unwrap();
        assert_eq!(picked.id.as_str(), "10");
        assert!(most_relevant(Vec::new()).is_none());
    }
}
