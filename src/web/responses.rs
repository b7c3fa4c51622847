use serde::Serialize;

/// Canonical JSON payload for responses that only carry a message, which is
/// also the body shape every error response uses.
#[derive(Debug, Serialize, Clone)]
pub struct ApiMessage {
    pub message: String,
}

impl ApiMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
