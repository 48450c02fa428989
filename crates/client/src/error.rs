use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Backend at {base_url} is not reachable: {source}")]
    Unreachable {
        base_url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Request to {url} failed with status {status}: {body}")]
    Status { status: reqwest::StatusCode, url: String, body: String },
    #[error("Query not found: {0}")]
    NotFound(String),
    #[error("Failed to decode response: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("No user queries found")]
    NoUserQueries,
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl ClientError {
    /// True when the failure is about reaching the service rather than
    /// about what it returned.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ClientError::Unreachable { .. })
    }
}
