//! Error types for Tibber client operations

use thiserror::Error;

use crate::types::GraphqlError;

/// Result type alias for Tibber client operations
pub type Result<T> = std::result::Result<T, TibberClientError>;

/// Errors that can occur during Tibber client operations
#[derive(Error, Debug)]
pub enum TibberClientError {
    /// HTTP transport failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Login endpoint rejected the credentials or returned no token
    #[error("Authentication failed: {status} - {body}")]
    AuthenticationFailed { status: u16, body: String },

    /// GraphQL endpoint returned a non-success status
    #[error("Query failed: {status} - {body}")]
    QueryFailed { status: u16, body: String },

    /// HTTP-level success carrying GraphQL-level errors
    #[error("Query returned errors: {}", format_messages(.0))]
    GraphqlErrors(Vec<GraphqlError>),

    /// Response decoded but carried no `data` payload
    #[error("No data in GraphQL response")]
    MissingData,

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Request exceeded its time bound
    #[error("Request timed out")]
    Timeout,

    /// Account has no homes to resolve a home id from
    #[error("No homes associated with this account")]
    NoHomesFound,

    /// Requested vehicle index exceeds the returned vehicle list
    #[error("Vehicle index {index} out of range ({count} vehicles)")]
    VehicleIndexOutOfRange { index: usize, count: usize },

    /// Battery level outside 0-100, rejected before any network call
    #[error("Battery level {0} out of range 0-100")]
    InvalidBatteryLevel(u8),
}

impl TibberClientError {
    /// Create an authentication error from status code and body
    pub fn authentication_failed(status: u16, body: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            status,
            body: body.into(),
        }
    }

    /// Create a query error from status code and body
    pub fn query_failed(status: u16, body: impl Into<String>) -> Self {
        Self::QueryFailed {
            status,
            body: body.into(),
        }
    }
}

fn format_messages(errors: &[GraphqlError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
