//! Alarm entity and per-severity expiration policy

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TicketError};
use crate::template::{placeholders, TemplateContext};

/// Monitoring severity, ordinal 0 (not classified) to 5 (disaster)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Severity(u8);

impl Severity {
    pub const MAX: u8 = 5;

    pub fn new(level: u8) -> Result<Self> {
        if level > Self::MAX {
            return Err(TicketError::InvalidInput(format!(
                "severity {} out of range 0..={}",
                level,
                Self::MAX
            )));
        }
        Ok(Self(level))
    }

    pub fn level(self) -> u8 {
        self.0
    }

    /// All severities, lowest first
    pub fn all() -> impl Iterator<Item = Severity> {
        (0..=Self::MAX).map(Severity)
    }
}

impl TryFrom<u8> for Severity {
    type Error = TicketError;

    fn try_from(level: u8) -> Result<Self> {
        Severity::new(level)
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> u8 {
        severity.0
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Alarm as reported by the monitoring source
///
/// Produced fresh on every poll; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    /// Trigger identifier, unique per trigger
    pub id: String,
    pub description: String,
    pub host: String,
    pub severity: Severity,
    /// Last state change of the trigger
    pub last_change: DateTime<Utc>,
}

impl Alarm {
    /// Time spent in the faulty state at `now`
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_change
    }

    /// Whether the alarm outlived its severity expiration
    ///
    /// The age must strictly exceed the expiration (whole seconds); reaching it is
    /// not enough. A disabled severity (expiration 0) is never due.
    pub fn is_due(&self, expiration_secs: u64, now: DateTime<Utc>) -> bool {
        if expiration_secs == 0 {
            return false;
        }
        self.age(now).num_seconds() > expiration_secs as i64
    }

    /// Values for the new-ticket templates
    pub fn template_context(&self, policy: &SeverityPolicy, now: DateTime<Utc>) -> TemplateContext {
        let mut ctx = TemplateContext::new();
        ctx.insert(placeholders::ALARM_ID, &self.id);
        ctx.insert(placeholders::DESCRIPTION, &self.description);
        ctx.insert(placeholders::HOST, &self.host);
        ctx.insert(placeholders::AGE, format_age(self.age(now)));
        ctx.insert(placeholders::SEVERITY, &policy.label);
        ctx.insert(placeholders::EXPIRATION, policy.expiration_secs.to_string());
        ctx
    }
}

/// Human readable age, e.g. `1h 0m 1s` or `2d 3h 0m 0s`
pub fn format_age(age: Duration) -> String {
    let total = age.num_seconds().max(0);
    let (days, rem) = (total / 86_400, total % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);

    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Expiration and label for one severity level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityPolicy {
    pub level: u8,
    pub label: String,
    /// Maximum tolerated faulty duration; 0 disables ticketing for the level
    #[serde(default)]
    pub expiration_secs: u64,
}

impl SeverityPolicy {
    pub fn new(level: u8, label: &str, expiration_secs: u64) -> Self {
        Self {
            level,
            label: label.to_string(),
            expiration_secs,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.expiration_secs > 0
    }
}

/// Lookup table of severity policies, indexed by level
#[derive(Debug, Clone, Default)]
pub struct SeverityPolicies {
    by_level: [Option<SeverityPolicy>; 6],
}

impl SeverityPolicies {
    /// Build the table, rejecting out-of-range or duplicated levels
    pub fn from_policies(policies: &[SeverityPolicy]) -> Result<Self> {
        let mut table = Self::default();
        for policy in policies {
            let severity = Severity::new(policy.level)?;
            let slot = &mut table.by_level[severity.level() as usize];
            if slot.is_some() {
                return Err(TicketError::Config(format!(
                    "severity {} configured twice",
                    policy.level
                )));
            }
            *slot = Some(policy.clone());
        }
        Ok(table)
    }

    pub fn get(&self, severity: Severity) -> Option<&SeverityPolicy> {
        self.by_level[severity.level() as usize].as_ref()
    }

    /// Policy for `severity` if ticketing is enabled for it
    pub fn enabled(&self, severity: Severity) -> Option<&SeverityPolicy> {
        self.get(severity).filter(|p| p.is_enabled())
    }

    pub fn enabled_count(&self) -> usize {
        self.by_level.iter().flatten().filter(|p| p.is_enabled()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alarm(last_change: DateTime<Utc>) -> Alarm {
        Alarm {
            id: "T-42".to_string(),
            description: "Disk full".to_string(),
            host: "db01".to_string(),
            severity: Severity::new(3).unwrap(),
            last_change,
        }
    }

    #[test]
    fn test_severity_range() {
        assert!(Severity::new(5).is_ok());
        assert!(matches!(Severity::new(6), Err(TicketError::InvalidInput(_))));
        assert_eq!(Severity::all().count(), 6);
    }

    #[test]
    fn test_due_boundary() {
        let now = Utc::now();
        assert!(!alarm(now - Duration::seconds(3600)).is_due(3600, now));
        assert!(alarm(now - Duration::seconds(3601)).is_due(3600, now));
        assert!(!alarm(now - Duration::days(30)).is_due(0, now));
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(Duration::seconds(3601)), "1h 0m 1s");
        assert_eq!(format_age(Duration::seconds(59)), "59s");
        assert_eq!(format_age(Duration::seconds(61)), "1m 1s");
        assert_eq!(format_age(Duration::seconds(2 * 86_400 + 3 * 3_600)), "2d 3h 0m 0s");
        assert_eq!(format_age(Duration::seconds(-5)), "0s");
    }

    #[test]
    fn test_template_context_has_all_placeholders() {
        let now = Utc::now();
        let policy = SeverityPolicy::new(3, "Average", 3600);
        let ctx = alarm(now - Duration::seconds(3601)).template_context(&policy, now);

        for name in placeholders::NEW_TICKET {
            assert!(ctx.get(name).is_some(), "missing {}", name);
        }
        assert_eq!(ctx.get(placeholders::SEVERITY), Some("Average"));
        assert_eq!(ctx.get(placeholders::EXPIRATION), Some("3600"));
        assert_eq!(ctx.get(placeholders::AGE), Some("1h 0m 1s"));
    }

    #[test]
    fn test_policies_table() {
        let policies = SeverityPolicies::from_policies(&[
            SeverityPolicy::new(3, "Average", 3600),
            SeverityPolicy::new(1, "Information", 0),
        ])
        .unwrap();

        let average = Severity::new(3).unwrap();
        let info = Severity::new(1).unwrap();
        assert_eq!(policies.enabled(average).map(|p| p.expiration_secs), Some(3600));
        assert!(policies.get(info).is_some());
        assert!(policies.enabled(info).is_none());
        assert_eq!(policies.enabled_count(), 1);

        let duplicated = SeverityPolicies::from_policies(&[
            SeverityPolicy::new(3, "Average", 3600),
            SeverityPolicy::new(3, "Again", 60),
        ]);
        assert!(matches!(duplicated, Err(TicketError::Config(_))));

        let out_of_range = SeverityPolicies::from_policies(&[SeverityPolicy::new(9, "X", 1)]);
        assert!(out_of_range.is_err());
    }
}
