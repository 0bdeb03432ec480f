//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use ticketsrv::domain::{Alarm, Severity};
use ticketsrv::monitor::StaticMonitor;
use ticketsrv::tracker::MemoryTracker;
use ticketsrv::{TicketService, TicketSrvConfig};

pub const QUEUE: &str = "ops";
pub const CUSTOM_FIELD: &str = "zabbix_trigger";

pub fn config() -> TicketSrvConfig {
    let mut config = TicketSrvConfig::default();
    config.tracker.queue = QUEUE.to_string();
    config.tracker.custom_field = CUSTOM_FIELD.to_string();
    config
}

/// Alarm that went faulty `age_secs` before `now`
pub fn alarm(id: &str, severity: u8, age_secs: i64, now: DateTime<Utc>) -> Alarm {
    Alarm {
        id: id.to_string(),
        description: format!("Problem {}", id),
        host: "db01".to_string(),
        severity: Severity::new(severity).unwrap(),
        last_change: now - Duration::seconds(age_secs),
    }
}

pub struct Harness {
    pub tracker: Arc<MemoryTracker>,
    pub monitor: Arc<StaticMonitor>,
    pub service: TicketService,
}

pub fn harness(config: &TicketSrvConfig) -> Harness {
    let tracker = Arc::new(MemoryTracker::new(&config.tracker.custom_field));
    let monitor = Arc::new(StaticMonitor::default());
    let service = TicketService::build(config, monitor.clone(), tracker.clone()).unwrap();
    Harness {
        tracker,
        monitor,
        service,
    }
}
