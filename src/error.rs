//! Error types for the invoice mailer.

use std::time::Duration;

/// Top-level error type for a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session-level mailbox failures. Always fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("IMAP command {command} failed: {status} {text}")]
    CommandFailed {
        command: String,
        status: String,
        text: String,
    },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("IMAP connection closed by server")]
    Closed,

    #[error("Mailbox worker failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Content extraction failures for a single message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("No text/html part found")]
    NotFound,

    #[error("Malformed message structure: {0}")]
    Parse(String),
}

/// HTML transformation failures for a single document.
#[derive(Debug, thiserror::Error)]
pub enum HtmlError {
    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("Failed to serialize HTML: {0}")]
    Serialize(String),
}

/// Remote image fetch failures. The image is left unembedded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} timed out")]
    Timeout { url: String },
}

/// Rendering failures for a single document.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Browser session failed: {0}")]
    Session(String),

    #[error("Rendering timed out after {0:?}")]
    Timeout(Duration),
}

/// Outbound delivery failures. Fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid {field} address: {reason}")]
    InvalidAddress { field: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),

    #[error("Delivery worker failed: {0}")]
    Worker(String),
}

/// Result type alias for pipeline runs.
pub type Result<T> = std::result::Result<T, Error>;
