//! Monitoring sources

pub mod memory;
pub mod zabbix;

use async_trait::async_trait;

use crate::domain::Alarm;
use crate::error::Result;

pub use memory::StaticMonitor;
pub use zabbix::ZabbixClient;

/// Alarm feed
#[async_trait]
pub trait MonitoringSource: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Alarms currently in the faulty state; the caller decides dueness
    async fn list_faulty_alarms(&self) -> Result<Vec<Alarm>>;
}
