//! Ticket tracker backends

pub mod memory;
pub mod noop;
pub mod rt;
pub mod rt_format;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::domain::{NewTicket, Ticket, TicketId, TicketQuery, TicketStatus, TicketSummary};
use crate::error::Result;

pub use memory::MemoryTracker;
pub use noop::NoopTracker;
pub use rt::RequestTrackerClient;

/// Concurrent `get` calls issued while expanding search hits
pub const FETCH_CONCURRENCY: usize = 4;

/// Ticket tracker abstraction
///
/// Implementations must be cheap to share behind an `Arc`; the cache, the
/// reconciler and the reminder scheduler all hold the same instance.
#[async_trait]
pub trait TicketBackend: Send + Sync + 'static {
    /// Backend name used in logs and errors
    fn name(&self) -> &str;

    /// Tickets matching `query`, id and subject only
    async fn search(&self, query: &TicketQuery) -> Result<Vec<TicketSummary>>;

    /// Full ticket record
    async fn get(&self, id: &TicketId) -> Result<Ticket>;

    /// Create a ticket and return its id
    async fn create(&self, ticket: &NewTicket) -> Result<TicketId>;

    async fn update_status(&self, id: &TicketId, status: &TicketStatus) -> Result<()>;

    async fn comment(&self, id: &TicketId, body: &str) -> Result<()>;
}

/// Search and expand every hit into a full ticket
///
/// Hits whose full record no longer satisfies `query` (edited between the
/// search and the get) are dropped.
pub async fn fetch_matching(backend: &dyn TicketBackend, query: &TicketQuery) -> Result<Vec<Ticket>> {
    let hits = backend.search(query).await?;

    let tickets: Vec<Ticket> = stream::iter(hits)
        .map(|hit| async move { backend.get(&hit.id).await })
        .buffer_unordered(FETCH_CONCURRENCY)
        .try_collect()
        .await?;

    Ok(tickets.into_iter().filter(|t| query.matches(t)).collect())
}
