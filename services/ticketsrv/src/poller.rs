//! Alarm poller
//!
//! Reads the faulty alarms every tick, keeps the ones that outlived their
//! severity expiration and hands them to the reconciler.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::TicketCache;
use crate::domain::{Alarm, SeverityPolicies, SeverityPolicy, TicketStatus};
use crate::error::Result;
use crate::monitor::MonitoringSource;
use crate::reconciler::{ReconcileOutcome, TicketReconciler};

/// Outcome of one poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Faulty alarms reported by the monitoring source
    pub seen: usize,
    /// Alarms past their expiration
    pub due: usize,
    pub created: usize,
    pub reopened: usize,
    /// Due alarms that already had an open-like ticket
    pub existing: usize,
    pub failed: usize,
}

impl PollReport {
    fn record(&mut self, outcome: &ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Created(_) => self.created += 1,
            ReconcileOutcome::Reopened(_) => self.reopened += 1,
            ReconcileOutcome::Existing(_) => self.existing += 1,
        }
    }
}

pub struct AlarmPoller {
    monitor: Arc<dyn MonitoringSource>,
    cache: Arc<TicketCache>,
    reconciler: Arc<TicketReconciler>,
    policies: SeverityPolicies,
    tick: Duration,
    invalidate_on_start: bool,
}

impl AlarmPoller {
    pub fn new(
        monitor: Arc<dyn MonitoringSource>,
        cache: Arc<TicketCache>,
        reconciler: Arc<TicketReconciler>,
        policies: SeverityPolicies,
        tick: Duration,
    ) -> Self {
        Self {
            monitor,
            cache,
            reconciler,
            policies,
            tick,
            invalidate_on_start: false,
        }
    }

    /// Reject every cached ticket before the first poll
    pub fn with_invalidate_on_start(mut self, enabled: bool) -> Self {
        self.invalidate_on_start = enabled;
        self
    }

    /// Poll until `token` is cancelled
    pub async fn run(&self, token: CancellationToken) {
        info!(
            "Starting alarm poller: {} every {}s, {} severities enabled",
            self.monitor.name(),
            self.tick.as_secs(),
            self.policies.enabled_count()
        );

        if self.invalidate_on_start {
            match self.cache.invalidate_all(TicketStatus::Rejected).await {
                Ok(n) => info!("Rejected {} open tickets on startup", n),
                Err(e) => warn!("Startup invalidation failed: {}", e),
            }
        }

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll_once(Utc::now()).await {
                        Ok(report) if report.created + report.reopened + report.failed > 0 => {
                            info!("Poll: {:?}", report);
                        }
                        Ok(report) => debug!("Poll: {:?}", report),
                        Err(e) => error!("Alarm poll failed: {}", e),
                    }
                }
                _ = token.cancelled() => {
                    info!("Alarm poller received shutdown signal");
                    break;
                }
            }
        }

        info!("Alarm poller stopped");
    }

    fn due_policy(&self, alarm: &Alarm, now: DateTime<Utc>) -> Option<&SeverityPolicy> {
        self.policies
            .enabled(alarm.severity)
            .filter(|policy| alarm.is_due(policy.expiration_secs, now))
    }

    /// Run one reconciliation pass
    ///
    /// Only a monitoring failure fails the pass; per-alarm errors are logged
    /// and counted.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> Result<PollReport> {
        let alarms = self.monitor.list_faulty_alarms().await?;
        let mut report = PollReport {
            seen: alarms.len(),
            ..PollReport::default()
        };

        let due: Vec<(&Alarm, &SeverityPolicy)> = alarms
            .iter()
            .filter_map(|alarm| self.due_policy(alarm, now).map(|policy| (alarm, policy)))
            .collect();
        report.due = due.len();
        if due.is_empty() {
            return Ok(report);
        }

        let known = match self.cache.get().await {
            Ok(tickets) => tickets,
            Err(e) => {
                warn!("Ticket cache unavailable, reconciling without fast path: {}", e);
                Vec::new()
            },
        };

        for (alarm, policy) in due {
            if known.iter().any(|t| t.is_for_alarm(&alarm.id)) {
                report.existing += 1;
                continue;
            }

            debug!(
                alarm_id = %alarm.id,
                "Alarm past its {}s expiration ({})",
                policy.expiration_secs,
                policy.label
            );
            let context = alarm.template_context(policy, now);
            match self.reconciler.create_or_reopen(&alarm.id, &context).await {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    error!(alarm_id = %alarm.id, "Reconciliation failed: {}", e);
                    report.failed += 1;
                },
            }
        }

        Ok(report)
    }
}
