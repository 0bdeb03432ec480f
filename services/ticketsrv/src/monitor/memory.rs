//! Fixed alarm feed for tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::MonitoringSource;
use crate::domain::Alarm;
use crate::error::{Result, TicketError};

const SOURCE: &str = "static-monitor";

/// Monitoring source returning whatever alarms were last set
#[derive(Default)]
pub struct StaticMonitor {
    alarms: RwLock<Vec<Alarm>>,
    fail: AtomicBool,
    polls: AtomicUsize,
}

impl StaticMonitor {
    pub fn new(alarms: Vec<Alarm>) -> Self {
        Self {
            alarms: RwLock::new(alarms),
            ..Self::default()
        }
    }

    pub fn set_alarms(&self, alarms: Vec<Alarm>) {
        *self.alarms.write() = alarms;
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MonitoringSource for StaticMonitor {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn list_faulty_alarms(&self) -> Result<Vec<Alarm>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(TicketError::backend_unavailable(SOURCE, "feed offline"));
        }
        Ok(self.alarms.read().clone())
    }
}
