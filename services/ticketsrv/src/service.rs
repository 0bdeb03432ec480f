//! Service controller
//!
//! Wires the cache, reconciler, poller and reminder from one config and runs
//! the two periodic tasks until cancelled.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache::TicketCache;
use crate::config::TicketSrvConfig;
use crate::error::Result;
use crate::monitor::MonitoringSource;
use crate::poller::AlarmPoller;
use crate::reconciler::{ReconcilerSettings, TicketReconciler};
use crate::reminder::{ReminderScheduler, ReminderSettings};
use crate::tracker::{NoopTracker, TicketBackend};

pub struct TicketService {
    cache: Arc<TicketCache>,
    reconciler: Arc<TicketReconciler>,
    poller: Arc<AlarmPoller>,
    reminder: Arc<ReminderScheduler>,
}

impl TicketService {
    /// Build every component; the backend is wrapped in the dry-run
    /// decorator when `behavior.noop` is set
    pub fn build(
        config: &TicketSrvConfig,
        monitor: Arc<dyn MonitoringSource>,
        backend: Arc<dyn TicketBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let templates = Arc::new(config.templates.compile()?);
        let policies = config.severity_policies()?;

        let backend: Arc<dyn TicketBackend> = if config.behavior.noop {
            info!("Dry-run mode: tracker writes are logged, not sent");
            Arc::new(NoopTracker::new(backend, &config.tracker.custom_field))
        } else {
            backend
        };

        let cache = Arc::new(TicketCache::new(
            backend.clone(),
            &config.tracker.queue,
            &config.tracker.custom_field,
            config.cache_expiration(),
        ));
        let reconciler = Arc::new(TicketReconciler::new(
            backend.clone(),
            cache.clone(),
            templates.clone(),
            ReconcilerSettings::from_config(config),
        ));
        let poller = Arc::new(
            AlarmPoller::new(
                monitor,
                cache.clone(),
                reconciler.clone(),
                policies,
                config.poll_interval(),
            )
            .with_invalidate_on_start(config.behavior.invalidate_on_start),
        );
        let reminder = Arc::new(ReminderScheduler::new(
            backend,
            cache.clone(),
            templates,
            ReminderSettings::from_config(config),
        ));

        Ok(Self {
            cache,
            reconciler,
            poller,
            reminder,
        })
    }

    pub fn cache(&self) -> &Arc<TicketCache> {
        &self.cache
    }

    pub fn reconciler(&self) -> &Arc<TicketReconciler> {
        &self.reconciler
    }

    pub fn poller(&self) -> &Arc<AlarmPoller> {
        &self.poller
    }

    pub fn reminder(&self) -> &Arc<ReminderScheduler> {
        &self.reminder
    }

    /// Run poller and reminder until `token` is cancelled, then join both
    pub async fn run(&self, token: CancellationToken) {
        let poller = self.poller.clone();
        let poller_token = token.child_token();
        let poller_task = tokio::spawn(async move { poller.run(poller_token).await });

        let reminder = self.reminder.clone();
        let reminder_token = token.child_token();
        let reminder_task = tokio::spawn(async move { reminder.run(reminder_token).await });

        info!("Ticket service running");
        let (poller_result, reminder_result) = tokio::join!(poller_task, reminder_task);
        if let Err(e) = poller_result {
            error!("Alarm poller task failed: {}", e);
        }
        if let Err(e) = reminder_result {
            error!("Reminder task failed: {}", e);
        }
        info!("Ticket service stopped");
    }
}
