//! Zabbix JSON-RPC monitoring source

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::MonitoringSource;
use crate::config::MonitoringConfig;
use crate::domain::{Alarm, Severity};
use crate::error::{Result, TicketError};

const SOURCE: &str = "zabbix";

type RpcReply = std::result::Result<Value, RpcError>;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: String,
}

impl RpcError {
    fn is_auth_failure(&self) -> bool {
        let text = format!("{} {}", self.message, self.data).to_lowercase();
        ["re-login", "not authorised", "not authorized", "session terminated"]
            .iter()
            .any(|needle| text.contains(needle))
    }
}

#[derive(Debug, Deserialize)]
struct RawTrigger {
    triggerid: String,
    description: String,
    priority: String,
    lastchange: String,
    #[serde(default)]
    hosts: Vec<RawHost>,
}

#[derive(Debug, Deserialize)]
struct RawHost {
    host: String,
}

impl RawTrigger {
    fn into_alarm(self) -> Result<Alarm> {
        let bad = |what: &str, value: &str| {
            TicketError::Protocol(format!("trigger {}: bad {} '{}'", self.triggerid, what, value))
        };
        let level = self
            .priority
            .parse::<u8>()
            .map_err(|_| bad("priority", &self.priority))?;
        let last_change = self
            .lastchange
            .parse::<i64>()
            .ok()
            .and_then(|epoch| DateTime::<Utc>::from_timestamp(epoch, 0))
            .ok_or_else(|| bad("lastchange", &self.lastchange))?;
        let host = self
            .hosts
            .into_iter()
            .next()
            .map(|h| h.host)
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Alarm {
            id: self.triggerid,
            description: self.description,
            host,
            severity: Severity::new(level)?,
            last_change,
        })
    }
}

/// Zabbix API client (`api_jsonrpc.php`)
pub struct ZabbixClient {
    client: Client,
    endpoint: String,
    username: String,
    password: String,
    only_unacknowledged: bool,
    token: RwLock<Option<String>>,
    request_id: AtomicU64,
}

impl ZabbixClient {
    pub fn new(config: &MonitoringConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TicketError::Config(format!("failed to build monitoring client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api_jsonrpc.php", config.url.trim_end_matches('/')),
            username: config.username.clone(),
            password: config.password.clone(),
            only_unacknowledged: config.only_unacknowledged,
            token: RwLock::new(None),
            request_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value, auth: Option<&str>) -> Result<RpcReply> {
        let mut body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        });
        if let Some(token) = auth {
            body["auth"] = Value::String(token.to_string());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| TicketError::backend_unavailable(SOURCE, e))?;

        if !response.status().is_success() {
            return Err(TicketError::backend_unavailable(
                SOURCE,
                format!("HTTP {}", response.status()),
            ));
        }

        let reply: RpcResponse = response
            .json()
            .await
            .map_err(|e| TicketError::Protocol(format!("zabbix reply: {}", e)))?;

        match (reply.result, reply.error) {
            (_, Some(error)) => Ok(Err(error)),
            (Some(result), None) => Ok(Ok(result)),
            (None, None) => Err(TicketError::Protocol(format!("{}: empty reply", method))),
        }
    }

    async fn login(&self) -> Result<String> {
        let params = json!({ "username": self.username, "password": self.password });
        match self.call("user.login", params, None).await? {
            Ok(Value::String(token)) => {
                info!("Logged in to Zabbix as {}", self.username);
                *self.token.write() = Some(token.clone());
                Ok(token)
            },
            Ok(other) => Err(TicketError::Protocol(format!("user.login returned {}", other))),
            Err(error) => Err(TicketError::backend_unavailable(
                SOURCE,
                format!("login failed: {} {}", error.message, error.data),
            )),
        }
    }

    async fn token(&self) -> Result<String> {
        let cached = self.token.read().clone();
        match cached {
            Some(token) => Ok(token),
            None => self.login().await,
        }
    }

    fn trigger_params(&self) -> Value {
        let mut params = json!({
            "output": ["triggerid", "description", "priority", "value", "lastchange"],
            "selectHosts": ["host"],
            "expandDescription": 1,
            "monitored": 1,
            "filter": { "value": 1 },
        });
        if self.only_unacknowledged {
            params["withUnacknowledgedEvents"] = json!(1);
        }
        params
    }

    /// Authenticated call, logging in again once if the session expired
    async fn authed_call(&self, method: &str, params: Value) -> Result<Value> {
        let token = self.token().await?;
        match self.call(method, params.clone(), Some(&token)).await? {
            Ok(result) => return Ok(result),
            Err(error) if error.is_auth_failure() => {
                warn!("Zabbix session rejected ({}), logging in again", error.data);
                *self.token.write() = None;
            },
            Err(error) => {
                return Err(TicketError::Protocol(format!(
                    "{} failed ({}): {} {}",
                    method, error.code, error.message, error.data
                )))
            },
        }

        let token = self.login().await?;
        match self.call(method, params, Some(&token)).await? {
            Ok(result) => Ok(result),
            Err(error) => Err(TicketError::backend_unavailable(
                SOURCE,
                format!("{} failed after re-login: {} {}", method, error.message, error.data),
            )),
        }
    }
}

/// Map a `trigger.get` result to alarms
///
/// A trigger that cannot be mapped is logged and skipped; only a result that
/// is not a list fails the call.
fn parse_triggers(result: Value) -> Result<Vec<Alarm>> {
    let raw: Vec<Value> = serde_json::from_value(result)?;
    let alarms = raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| {
            match serde_json::from_value::<RawTrigger>(value)
                .map_err(TicketError::from)
                .and_then(RawTrigger::into_alarm)
            {
                Ok(alarm) => Some(alarm),
                Err(e) => {
                    warn!("Skipping Zabbix trigger #{}: {}", index + 1, e);
                    None
                },
            }
        })
        .collect();
    Ok(alarms)
}

#[async_trait]
impl MonitoringSource for ZabbixClient {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn list_faulty_alarms(&self) -> Result<Vec<Alarm>> {
        let result = self.authed_call("trigger.get", self.trigger_params()).await?;
        let alarms = parse_triggers(result)?;
        debug!("Zabbix reported {} faulty triggers", alarms.len());
        Ok(alarms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_parse_triggers() {
        let result = json!([
            {
                "triggerid": "13502",
                "description": "Free disk space is less than 5% on /",
                "priority": "4",
                "value": "1",
                "lastchange": "1760000000",
                "hosts": [{ "hostid": "10084", "host": "web01" }]
            },
            {
                "triggerid": "13600",
                "description": "Agent unreachable",
                "priority": "2",
                "value": "1",
                "lastchange": "1760000100",
                "hosts": []
            }
        ]);

        let alarms = parse_triggers(result).unwrap();
        assert_eq!(alarms.len(), 2);
        assert_eq!(alarms[0].id, "13502");
        assert_eq!(alarms[0].host, "web01");
        assert_eq!(alarms[0].severity.level(), 4);
        assert_eq!(alarms[0].last_change.timestamp(), 1_760_000_000);
        assert_eq!(alarms[1].host, "unknown");
    }

    #[test]
    #[traced_test]
    fn test_bad_triggers_are_skipped() {
        let result = json!([
            {
                "triggerid": "1",
                "description": "Disk full",
                "priority": "4",
                "value": "1",
                "lastchange": "1760000000",
                "hosts": [{ "host": "db01" }]
            },
            { "triggerid": "2", "description": "x", "priority": "x", "value": "1", "lastchange": "0" },
            { "triggerid": "3", "description": "x", "priority": "9", "value": "1", "lastchange": "0" },
            { "triggerid": "4", "description": "x", "priority": "2", "value": "1", "lastchange": "soon" },
            { "triggerid": "5", "value": "1" }
        ]);

        let alarms = parse_triggers(result).unwrap();

        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].id, "1");
        assert_eq!(alarms[0].host, "db01");
        assert!(logs_contain("Skipping Zabbix trigger #2"));
        assert!(logs_contain("Skipping Zabbix trigger #5"));
    }

    #[test]
    fn test_non_list_result_fails() {
        assert!(parse_triggers(json!({ "error": "nope" })).is_err());
    }

    #[test]
    fn test_trigger_params() {
        let config = MonitoringConfig {
            only_unacknowledged: true,
            ..MonitoringConfig::default()
        };
        let client = ZabbixClient::new(&config).unwrap();
        let params = client.trigger_params();
        assert_eq!(params["filter"]["value"], 1);
        assert_eq!(params["selectHosts"], json!(["host"]));
        assert_eq!(params["withUnacknowledgedEvents"], 1);
    }

    #[test]
    fn test_auth_failure_detection() {
        let error = RpcError {
            code: -32602,
            message: "Invalid params.".to_string(),
            data: "Session terminated, re-login, please.".to_string(),
        };
        assert!(error.is_auth_failure());

        let other = RpcError {
            code: -32500,
            message: "Application error.".to_string(),
            data: "No permissions".to_string(),
        };
        assert!(!other.is_auth_failure());
    }
}
