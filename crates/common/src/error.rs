use thiserror::Error;

/// Unified error type for Planscope crates.
#[derive(Debug, Error)]
pub enum Error {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// No plan, fragment list, operator tree or event timeline to draw.
    #[error("No visualization data available")]
    NoVisualizationData,
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),
    #[error("An internal error occurred: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(msg: &str) -> Self {
        Error::Internal(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_data_message_is_user_facing() {
        assert_eq!(Error::NoVisualizationData.to_string(), "No visualization data available");
    }

    #[test]
    fn test_json_error_converts() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
    }
}
