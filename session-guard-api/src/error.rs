use serde::{Deserialize, Serialize};

/// Error body returned by every failing endpoint.
///
/// `error` is a stable machine-readable code; `message` is safe to show users.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
