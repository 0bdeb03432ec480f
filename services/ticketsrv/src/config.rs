//! Ticket service configuration
//!
//! Built once at startup and passed by reference into every constructor.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{SeverityPolicies, SeverityPolicy};
use crate::error::{Result, TicketError};
use crate::template::{TicketTemplates, DEFAULT_NEW_BODY, DEFAULT_NEW_SUBJECT, DEFAULT_UPDATE_BODY};

/// Environment prefix, e.g. `TICKETSRV_TRACKER__QUEUE=ops`
pub const ENV_PREFIX: &str = "TICKETSRV";

const REDACTED: &str = "********";

/// Files probed when no `--config` is given
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["/etc/ticketsrv.yaml", "config/ticketsrv.yaml"];

/// Ticket service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketSrvConfig {
    pub monitoring: MonitoringConfig,
    pub tracker: TrackerConfig,
    pub severities: Vec<SeverityPolicy>,
    pub cache: CacheConfig,
    pub reminder: ReminderConfig,
    pub poller: PollerConfig,
    pub templates: TemplatesConfig,
    pub behavior: BehaviorConfig,
    pub logging: LoggingConfig,
}

impl Default for TicketSrvConfig {
    fn default() -> Self {
        Self {
            monitoring: MonitoringConfig::default(),
            tracker: TrackerConfig::default(),
            severities: default_severities(),
            cache: CacheConfig::default(),
            reminder: ReminderConfig::default(),
            poller: PollerConfig::default(),
            templates: TemplatesConfig::default(),
            behavior: BehaviorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Zabbix connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Frontend base URL; `api_jsonrpc.php` is appended
    pub url: String,
    pub username: String,
    pub password: String,
    pub timeout_secs: u64,
    /// Only report triggers with unacknowledged events
    pub only_unacknowledged: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost/zabbix".to_string(),
            username: "Admin".to_string(),
            password: String::new(),
            timeout_secs: default_timeout_secs(),
            only_unacknowledged: true,
        }
    }
}

/// Request Tracker connection and ticket placement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// RT base URL; `REST/1.0` is appended
    pub url: String,
    pub username: String,
    pub password: String,
    /// Queue new tickets go to
    pub queue: String,
    /// Custom field holding the alarm id
    pub custom_field: String,
    pub timeout_secs: u64,
    /// UTC offset of the RT server clock (`+02:00`); RT 1.0 prints
    /// `LastUpdated` in server-local time
    pub utc_offset: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost/rt".to_string(),
            username: "root".to_string(),
            password: String::new(),
            queue: "General".to_string(),
            custom_field: "zabbix_trigger".to_string(),
            timeout_secs: default_timeout_secs(),
            utc_offset: "+00:00".to_string(),
        }
    }
}

impl TrackerConfig {
    pub fn server_offset(&self) -> Result<FixedOffset> {
        self.utc_offset.trim().parse::<FixedOffset>().map_err(|e| {
            TicketError::Config(format!("tracker.utc_offset '{}': {}", self.utc_offset, e))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Snapshot age after which `get` refreshes
    pub expiration_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiration_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Inactivity before a ticket gets a reminder comment; 0 disables reminders
    pub interval_secs: u64,
    pub tick_secs: u64,
    /// Delay before the first sweep
    pub startup_delay_secs: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            interval_secs: 86_400,
            tick_secs: 10,
            startup_delay_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub tick_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { tick_secs: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    pub new_subject: String,
    pub new_body: String,
    pub update_body: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            new_subject: DEFAULT_NEW_SUBJECT.to_string(),
            new_body: DEFAULT_NEW_BODY.to_string(),
            update_body: DEFAULT_UPDATE_BODY.to_string(),
        }
    }
}

impl TemplatesConfig {
    pub fn compile(&self) -> Result<TicketTemplates> {
        TicketTemplates::new(&self.new_subject, &self.new_body, &self.update_body)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Reopen a rejected ticket instead of creating a new one
    pub reopen_rejected: bool,
    /// Move every open ticket to rejected on startup
    pub invalidate_on_start: bool,
    /// Log tracker writes instead of sending them
    pub noop: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            reopen_rejected: true,
            invalidate_on_start: false,
            noop: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level used when neither `RUST_LOG` nor a CLI flag is set
    pub level: String,
    pub log_file: Option<PathBuf>,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            log_file: None,
            json: false,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Zabbix severity labels with the stock expirations
pub fn default_severities() -> Vec<SeverityPolicy> {
    vec![
        SeverityPolicy::new(0, "Not classified", 0),
        SeverityPolicy::new(1, "Information", 0),
        SeverityPolicy::new(2, "Warning", 14_400),
        SeverityPolicy::new(3, "Average", 3_600),
        SeverityPolicy::new(4, "High", 1_800),
        SeverityPolicy::new(5, "Disaster", 900),
    ]
}

impl TicketSrvConfig {
    /// Load from defaults, the given (or first found) file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => common::config_loader::find_config_file(&DEFAULT_CONFIG_PATHS[..]),
        };
        Ok(common::load_layered(ENV_PREFIX, path.as_deref())?)
    }

    /// Check everything that would otherwise fail at the first tick
    pub fn validate(&self) -> Result<()> {
        if self.tracker.queue.trim().is_empty() {
            return Err(TicketError::Config("tracker.queue must not be empty".to_string()));
        }
        if self.tracker.custom_field.trim().is_empty() {
            return Err(TicketError::Config(
                "tracker.custom_field must not be empty".to_string(),
            ));
        }
        self.tracker.server_offset()?;
        if self.poller.tick_secs == 0 {
            return Err(TicketError::Config("poller.tick_secs must be positive".to_string()));
        }
        if self.reminder.tick_secs == 0 {
            return Err(TicketError::Config("reminder.tick_secs must be positive".to_string()));
        }
        self.severity_policies()?;
        self.templates.compile()?;
        Ok(())
    }

    /// Copy with credentials masked, for printing
    pub fn redacted(&self) -> Self {
        let mask = |secret: &str| {
            if secret.is_empty() {
                String::new()
            } else {
                REDACTED.to_string()
            }
        };
        let mut config = self.clone();
        config.monitoring.password = mask(&self.monitoring.password);
        config.tracker.password = mask(&self.tracker.password);
        config
    }

    pub fn severity_policies(&self) -> Result<SeverityPolicies> {
        if self.severities.is_empty() {
            return Err(TicketError::Config("at least one severity must be configured".to_string()));
        }
        SeverityPolicies::from_policies(&self.severities)
    }

    pub fn cache_expiration(&self) -> Duration {
        Duration::from_secs(self.cache.expiration_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poller.tick_secs)
    }
}
