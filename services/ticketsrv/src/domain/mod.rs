//! Domain types: alarms observed in monitoring and tickets in the tracker

pub mod alarm;
pub mod ticket;

pub use alarm::{format_age, Alarm, Severity, SeverityPolicies, SeverityPolicy};
pub use ticket::{
    CorrelationFilter, NewTicket, Ticket, TicketId, TicketQuery, TicketStatus, TicketSummary,
};
