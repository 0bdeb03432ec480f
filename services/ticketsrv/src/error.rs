//! Ticket service error types

use thiserror::Error;

/// Result type for ticket service operations
pub type Result<T> = std::result::Result<T, TicketError>;

/// Ticket service errors
#[derive(Debug, Error)]
pub enum TicketError {
    /// Network or authentication failure talking to a collaborator
    #[error("{backend} unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// Ticket creation rejected by the tracker
    #[error("Ticket creation failed ({status_code}): {message}")]
    CreateTicketFailed { status_code: u16, message: String },

    /// Status change or comment rejected by the tracker
    #[error("Ticket {ticket_id} update failed ({status_code}): {message}")]
    UpdateTicketFailed {
        ticket_id: String,
        status_code: u16,
        message: String,
    },

    /// Template context lacks placeholders the template uses
    #[error("Template '{template}' is missing arguments: {}", missing.join(", "))]
    MissingTemplateArgument {
        template: String,
        missing: Vec<String>,
    },

    /// Template references a placeholder outside its declared set
    #[error("Template '{template}' uses unknown placeholder '{placeholder}'")]
    UnknownPlaceholder {
        template: String,
        placeholder: String,
    },

    /// Caller passed something the operation cannot accept
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Collaborator answered with something we cannot parse
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TicketError {
    pub fn backend_unavailable(backend: &str, reason: impl ToString) -> Self {
        TicketError::BackendUnavailable {
            backend: backend.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the next tick may succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TicketError::BackendUnavailable { .. }
                | TicketError::CreateTicketFailed { .. }
                | TicketError::UpdateTicketFailed { .. }
        )
    }
}

impl From<serde_json::Error> for TicketError {
    fn from(err: serde_json::Error) -> Self {
        TicketError::Protocol(err.to_string())
    }
}

impl From<common::ConfigError> for TicketError {
    fn from(err: common::ConfigError) -> Self {
        TicketError::Config(err.to_string())
    }
}

/// Helper function to create an invalid input error
pub fn invalid_input(msg: &str) -> TicketError {
    TicketError::InvalidInput(msg.to_string())
}
