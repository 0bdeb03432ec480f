//! Request Tracker REST 1.0 text format
//!
//! Every RT 1.0 answer starts with a status line such as `RT/4.4.3 200 Ok`,
//! followed by a blank line and a `Key: value` body. Multi-line values continue
//! on lines starting with whitespace. Custom fields read back as `CF.{name}`
//! and are written as `CF-name`.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

use crate::domain::{CorrelationFilter, Ticket, TicketId, TicketQuery, TicketStatus, TicketSummary};
use crate::error::{Result, TicketError};

const RT_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %Y";
const ISO_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parsed RT answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtResponse {
    pub code: u16,
    pub message: String,
    pub body: String,
}

impl RtResponse {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim_start();
        let (status_line, body) = match text.split_once('\n') {
            Some((line, rest)) => (line.trim(), rest),
            None => (text.trim(), ""),
        };

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("RT/") {
            return Err(TicketError::Protocol(format!(
                "unexpected RT status line: '{}'",
                status_line
            )));
        }
        let code = parts
            .next()
            .and_then(|c| c.parse::<u16>().ok())
            .ok_or_else(|| {
                TicketError::Protocol(format!("missing RT status code: '{}'", status_line))
            })?;
        let message = parts.next().unwrap_or_default().trim().to_string();

        Ok(Self {
            code,
            message,
            body: body.trim().to_string(),
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Short description for error reports
    pub fn describe(&self) -> String {
        if self.body.is_empty() {
            self.message.clone()
        } else {
            format!("{}: {}", self.message, first_line(&self.body))
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default().trim()
}

/// Parse a `Key: value` body, joining continuation lines with newlines
pub fn parse_fields(body: &str) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();

    for line in body.lines() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        if line.starts_with(char::is_whitespace) {
            if let Some((_, value)) = fields.last_mut() {
                value.push('\n');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            fields.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    fields
}

fn field<'a>(fields: &'a [(String, String)], key: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Encode request content; continuation lines are indented with one space
pub fn encode_content(fields: &[(String, String)]) -> String {
    let mut out = String::new();
    for (key, value) in fields {
        out.push_str(key);
        out.push_str(": ");
        let mut lines = value.lines();
        out.push_str(lines.next().unwrap_or_default());
        out.push('\n');
        for line in lines {
            out.push(' ');
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Read-side custom field key
pub fn cf_read_key(custom_field: &str) -> String {
    format!("CF.{{{}}}", custom_field)
}

/// Write-side custom field key
pub fn cf_write_key(custom_field: &str) -> String {
    format!("CF-{}", custom_field)
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Build the TicketSQL expression for `query`
pub fn build_query(query: &TicketQuery) -> String {
    let mut clauses = vec![format!("Queue = {}", quote(&query.queue))];

    if !query.statuses.is_empty() {
        let statuses: Vec<String> = query
            .statuses
            .iter()
            .map(|s| format!("Status = {}", quote(s.as_str())))
            .collect();
        clauses.push(format!("({})", statuses.join(" OR ")));
    }

    let cf = quote(&cf_read_key(&query.custom_field));
    match &query.correlation {
        CorrelationFilter::Any => {},
        CorrelationFilter::Present => clauses.push(format!("{} IS NOT NULL", cf)),
        CorrelationFilter::Equals(alarm_id) => {
            clauses.push(format!("{} = {}", cf, quote(alarm_id)))
        },
    }

    clauses.join(" AND ")
}

/// Parse `format=s` search output: one `id: subject` per line
pub fn parse_search(body: &str) -> Result<Vec<TicketSummary>> {
    if body.trim().is_empty() || body.contains("No matching results") {
        return Ok(Vec::new());
    }

    parse_fields(body)
        .into_iter()
        .map(|(id, subject)| {
            Ok(TicketSummary {
                id: TicketId::new(id)?,
                subject,
            })
        })
        .collect()
}

/// Parse RT timestamps (`Thu Oct 15 10:00:00 2026`) printed in the server's
/// local time at `offset`
pub fn parse_rt_datetime(value: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, RT_DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(&normalized, ISO_DATE_FORMAT))
        .ok()?
        .and_local_timezone(offset)
        .single()
        .map(|local| local.with_timezone(&Utc))
}

/// Build a ticket from `ticket/<id>/show` output
pub fn ticket_from_fields(
    fields: &[(String, String)],
    custom_field: &str,
    offset: FixedOffset,
) -> Result<Ticket> {
    let raw_id = field(fields, "id")
        .ok_or_else(|| TicketError::Protocol("ticket without id field".to_string()))?;
    let id = TicketId::new(raw_id.trim_start_matches("ticket/"))?;

    let status = field(fields, "Status")
        .ok_or_else(|| TicketError::Protocol(format!("ticket {} without status", id)))?
        .parse::<TicketStatus>()?;

    let last_updated = field(fields, "LastUpdated")
        .and_then(|value| parse_rt_datetime(value, offset))
        .ok_or_else(|| {
            TicketError::Protocol(format!("ticket {} has no readable LastUpdated", id))
        })?;

    let alarm_id = field(fields, &cf_read_key(custom_field))
        .or_else(|| field(fields, &cf_write_key(custom_field)))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    Ok(Ticket {
        id,
        subject: field(fields, "Subject").unwrap_or_default().to_string(),
        status,
        alarm_id,
        last_updated,
    })
}

/// Extract the id from `# Ticket 123 created.`
pub fn parse_created_id(body: &str) -> Option<TicketId> {
    body.lines().find_map(|line| {
        let rest = line.trim().trim_start_matches('#').trim();
        let rest = rest.strip_prefix("Ticket ")?;
        let (id, tail) = rest.split_once(' ')?;
        if tail.trim_end_matches('.') == "created" {
            TicketId::new(id).ok()
        } else {
            None
        }
    })
}

/// Whether an edit or comment body reports success
pub fn is_update_acknowledged(body: &str) -> bool {
    body.lines().any(|line| {
        let line = line.trim().trim_start_matches('#').trim().to_lowercase();
        line.ends_with("updated.")
            || line.contains("comments added")
            || line.contains("message recorded")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    const SHOW: &str = "RT/4.4.3 200 Ok

id: ticket/123
Queue: ops
Subject: [ticketsrv] Issue 'Disk full'
Status: open
LastUpdated: Thu Oct  1 10:00:00 2026
CF.{zabbix_trigger}: 13502
";

    #[test]
    fn test_parse_status_line() {
        let response = RtResponse::parse(SHOW).unwrap();
        assert_eq!(response.code, 200);
        assert_eq!(response.message, "Ok");
        assert!(response.is_success());

        let denied = RtResponse::parse("RT/4.4.3 401 Credentials required\n").unwrap();
        assert_eq!(denied.code, 401);
        assert!(!denied.is_success());

        assert!(RtResponse::parse("<html>proxy error</html>").is_err());
    }

    #[test]
    fn test_ticket_from_show() {
        let response = RtResponse::parse(SHOW).unwrap();
        let ticket = ticket_from_fields(&parse_fields(&response.body), "zabbix_trigger", utc()).unwrap();

        assert_eq!(ticket.id.as_str(), "123");
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.alarm_id.as_deref(), Some("13502"));
        assert_eq!(
            ticket.last_updated.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2026-10-01 10:00:00"
        );
    }

    #[test]
    fn test_rt_dates_use_server_offset() {
        let expected = "2026-10-15 08:00:00";
        let paris = FixedOffset::east_opt(2 * 3600).unwrap();

        for value in ["Thu Oct 15 10:00:00 2026", "2026-10-15 10:00:00"] {
            let parsed = parse_rt_datetime(value, paris).unwrap();
            assert_eq!(parsed.format("%Y-%m-%d %H:%M:%S").to_string(), expected);
        }
        assert!(parse_rt_datetime("Not set", paris).is_none());
    }

    #[test]
    fn test_empty_custom_field_is_absent() {
        let body = "id: ticket/9\nStatus: new\nLastUpdated: 2026-10-01 10:00:00\nCF.{alarm}:\n";
        let ticket = ticket_from_fields(&parse_fields(body), "alarm", utc()).unwrap();
        assert!(ticket.alarm_id.is_none());
    }

    #[test]
    fn test_parse_search() {
        let hits = parse_search("123: Disk full\n124: Load high").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].id.as_str(), "124");
        assert_eq!(hits[1].subject, "Load high");

        assert!(parse_search("No matching results.").unwrap().is_empty());
    }

    #[test]
    fn test_build_query() {
        let query = TicketQuery::open_correlated("ops", "zabbix_trigger");
        assert_eq!(
            build_query(&query),
            "Queue = 'ops' AND (Status = 'new' OR Status = 'open' OR Status = 'stalled') \
             AND 'CF.{zabbix_trigger}' IS NOT NULL"
        );

        let query = TicketQuery::rejected_for("ops", "zabbix_trigger", "it's");
        assert!(build_query(&query).ends_with("'CF.{zabbix_trigger}' = 'it\\'s'"));
    }

    #[test]
    fn test_encode_multiline_content() {
        let content = encode_content(&[
            ("Queue".to_string(), "ops".to_string()),
            ("Text".to_string(), "line one\nline two".to_string()),
            (cf_write_key("alarm"), "T-42".to_string()),
        ]);
        assert_eq!(
            content,
            "Queue: ops\nText: line one\n line two\nCF-alarm: T-42\n"
        );

        let fields = parse_fields(&content);
        assert_eq!(fields[1].1, "line one\nline two");
    }

    #[test]
    fn test_created_and_updated_markers() {
        assert_eq!(
            parse_created_id("# Ticket 4711 created.").map(|id| id.to_string()),
            Some("4711".to_string())
        );
        assert!(parse_created_id("# Could not create ticket.").is_none());

        assert!(is_update_acknowledged("# Ticket 12 updated."));
        assert!(is_update_acknowledged("# Comments added"));
        assert!(!is_update_acknowledged("# Ticket 12: Status 'bogus' is not valid"));
    }
}
