//! Request Tracker REST 1.0 client

use std::time::Duration;

use async_trait::async_trait;
use chrono::FixedOffset;
use reqwest::Client;
use tracing::{debug, info};

use super::rt_format::{self, RtResponse};
use super::TicketBackend;
use crate::config::TrackerConfig;
use crate::domain::{NewTicket, Ticket, TicketId, TicketQuery, TicketStatus, TicketSummary};
use crate::error::{Result, TicketError};

const BACKEND: &str = "request-tracker";

/// RT envelope, or the HTTP status and body of a non-RT answer
type Reply = std::result::Result<RtResponse, (u16, String)>;

/// Request Tracker client (`/REST/1.0/`)
#[derive(Clone)]
pub struct RequestTrackerClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    custom_field: String,
    server_offset: FixedOffset,
}

impl RequestTrackerClient {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let server_offset = config.server_offset()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TicketError::Config(format!("failed to build tracker client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("{}/REST/1.0", config.url.trim_end_matches('/')),
            username: config.username.clone(),
            password: config.password.clone(),
            custom_field: config.custom_field.clone(),
            server_offset,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send a request and parse the RT envelope
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Reply> {
        let response = request
            .send()
            .await
            .map_err(|e| TicketError::backend_unavailable(BACKEND, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TicketError::backend_unavailable(BACKEND, e))?;

        if !status.is_success() {
            return Ok(Err((status.as_u16(), text.trim().to_string())));
        }
        Ok(Ok(RtResponse::parse(&text)?))
    }

    async fn read(&self, path: &str, params: &[(&str, &str)]) -> Result<RtResponse> {
        let request = self
            .client
            .get(self.url(path))
            .query(&[("user", self.username.as_str()), ("pass", self.password.as_str())])
            .query(params);

        match self.send(request).await? {
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => Err(TicketError::backend_unavailable(BACKEND, response.describe())),
            Err((code, text)) => Err(TicketError::backend_unavailable(
                BACKEND,
                format!("HTTP {}: {}", code, text),
            )),
        }
    }

    async fn write(&self, path: &str, content: String) -> Result<Reply> {
        debug!("RT POST {} ({} bytes)", path, content.len());
        let request = self.client.post(self.url(path)).form(&[
            ("user", self.username.as_str()),
            ("pass", self.password.as_str()),
            ("content", content.as_str()),
        ]);
        self.send(request).await
    }
}

#[async_trait]
impl TicketBackend for RequestTrackerClient {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn search(&self, query: &TicketQuery) -> Result<Vec<TicketSummary>> {
        let sql = rt_format::build_query(query);
        debug!("RT search: {}", sql);
        let response = self
            .read("search/ticket", &[("query", sql.as_str()), ("format", "s")])
            .await?;
        rt_format::parse_search(&response.body)
    }

    async fn get(&self, id: &TicketId) -> Result<Ticket> {
        let response = self.read(&format!("ticket/{}/show", id), &[]).await?;
        let fields = rt_format::parse_fields(&response.body);
        if fields.is_empty() {
            return Err(TicketError::Protocol(format!(
                "ticket {}: {}",
                id,
                response.describe()
            )));
        }
        rt_format::ticket_from_fields(&fields, &self.custom_field, self.server_offset)
    }

    async fn create(&self, ticket: &NewTicket) -> Result<TicketId> {
        let mut fields = vec![
            ("id".to_string(), "ticket/new".to_string()),
            ("Queue".to_string(), ticket.queue.clone()),
            ("Subject".to_string(), ticket.subject.clone()),
            ("Text".to_string(), ticket.body.clone()),
        ];
        for (name, value) in &ticket.custom_fields {
            fields.push((rt_format::cf_write_key(name), value.clone()));
        }

        let response = match self.write("ticket/new", rt_format::encode_content(&fields)).await? {
            Ok(response) => response,
            Err((status_code, message)) => {
                return Err(TicketError::CreateTicketFailed { status_code, message })
            },
        };

        match rt_format::parse_created_id(&response.body) {
            Some(id) if response.is_success() => {
                info!("Created ticket {} in queue {}", id, ticket.queue);
                Ok(id)
            },
            _ => Err(TicketError::CreateTicketFailed {
                status_code: response.code,
                message: response.describe(),
            }),
        }
    }

    async fn update_status(&self, id: &TicketId, status: &TicketStatus) -> Result<()> {
        let content = rt_format::encode_content(&[("Status".to_string(), status.to_string())]);
        let result = self.write(&format!("ticket/{}/edit", id), content).await?;
        ensure_updated(id, result)
    }

    async fn comment(&self, id: &TicketId, body: &str) -> Result<()> {
        let content = rt_format::encode_content(&[
            ("id".to_string(), id.to_string()),
            ("Action".to_string(), "comment".to_string()),
            ("Text".to_string(), body.to_string()),
        ]);
        let result = self.write(&format!("ticket/{}/comment", id), content).await?;
        ensure_updated(id, result)
    }
}

fn ensure_updated(id: &TicketId, result: Reply) -> Result<()> {
    match result {
        Ok(response) if response.is_success() && rt_format::is_update_acknowledged(&response.body) => Ok(()),
        Ok(response) => Err(TicketError::UpdateTicketFailed {
            ticket_id: id.to_string(),
            status_code: response.code,
            message: response.describe(),
        }),
        Err((status_code, message)) => Err(TicketError::UpdateTicketFailed {
            ticket_id: id.to_string(),
            status_code,
            message,
        }),
    }
}
