//! Ticket service (TicketSrv)
//!
//! Opens, reminds on and reopens tracker tickets for monitoring alarms that
//! stay faulty longer than their severity allows.

pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod monitor;
pub mod poller;
pub mod reconciler;
pub mod reminder;
pub mod service;
pub mod template;
pub mod tracker;

pub use cache::TicketCache;
pub use config::TicketSrvConfig;
pub use error::{Result, TicketError};
pub use poller::{AlarmPoller, PollReport};
pub use reconciler::{ReconcileOutcome, ReconcilerSettings, TicketReconciler};
pub use reminder::{ReminderScheduler, ReminderSettings, SweepReport};
pub use service::TicketService;
