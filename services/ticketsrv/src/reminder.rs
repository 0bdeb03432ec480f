//! Periodic reminder comments on idle tickets

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::TicketCache;
use crate::config::TicketSrvConfig;
use crate::error::Result;
use crate::template::TicketTemplates;
use crate::tracker::TicketBackend;

#[derive(Debug, Clone)]
pub struct ReminderSettings {
    /// Inactivity before a reminder; zero disables the scheduler
    pub interval: Duration,
    pub tick: Duration,
    pub startup_delay: Duration,
}

impl ReminderSettings {
    pub fn from_config(config: &TicketSrvConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.reminder.interval_secs),
            tick: Duration::from_secs(config.reminder.tick_secs),
            startup_delay: Duration::from_secs(config.reminder.startup_delay_secs),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub commented: usize,
    pub failed: usize,
}

pub struct ReminderScheduler {
    backend: Arc<dyn TicketBackend>,
    cache: Arc<TicketCache>,
    templates: Arc<TicketTemplates>,
    settings: ReminderSettings,
}

impl ReminderScheduler {
    pub fn new(
        backend: Arc<dyn TicketBackend>,
        cache: Arc<TicketCache>,
        templates: Arc<TicketTemplates>,
        settings: ReminderSettings,
    ) -> Self {
        Self {
            backend,
            cache,
            templates,
            settings,
        }
    }

    /// Sweep until `token` is cancelled; returns at once when disabled
    pub async fn run(&self, token: CancellationToken) {
        if !self.settings.is_enabled() {
            info!("Ticket reminders are disabled");
            return;
        }

        info!(
            "Starting reminder scheduler: interval {}s, tick {}s",
            self.settings.interval.as_secs(),
            self.settings.tick.as_secs()
        );

        tokio::select! {
            _ = sleep(self.settings.startup_delay) => {}
            _ = token.cancelled() => {
                info!("Reminder scheduler cancelled before first sweep");
                return;
            }
        }

        let mut ticker = interval(self.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once(Utc::now()).await {
                        error!("Reminder sweep failed: {}", e);
                    }
                }
                _ = token.cancelled() => {
                    info!("Reminder scheduler received shutdown signal");
                    break;
                }
            }
        }

        info!("Reminder scheduler stopped");
    }

    /// Comment on every cached ticket idle for longer than the interval
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let body = self.templates.render_update()?;
        let tickets = self.cache.get().await?;
        let limit = self.settings.interval.as_secs() as i64;
        let mut report = SweepReport {
            checked: tickets.len(),
            ..SweepReport::default()
        };

        for ticket in tickets {
            if (now - ticket.last_updated).num_seconds() <= limit {
                continue;
            }
            match self.backend.comment(&ticket.id, &body).await {
                Ok(()) => {
                    info!(ticket_id = %ticket.id, "Posted reminder");
                    self.cache.touch(&ticket.id, now);
                    report.commented += 1;
                },
                Err(e) => {
                    warn!(ticket_id = %ticket.id, "Reminder failed: {}", e);
                    report.failed += 1;
                },
            }
        }

        // Idle sweeps rely on the cache's own expiration
        if report.commented > 0 {
            if let Err(e) = self.cache.refresh().await {
                warn!("Ticket cache refresh after reminder sweep failed: {}", e);
            }
        }
        Ok(report)
    }
}
